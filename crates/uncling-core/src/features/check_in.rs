//! Daily check-in: name a feeling, rate it, get a validating reply.

use anyhow::{Result, bail};
use minijinja::context;
use serde::Deserialize;

use super::attachment::AttachmentStyle;
use crate::prompts::{self, CHECK_IN_PROMPT_TEMPLATE};
use crate::providers::persistence::{CheckInRecord, Persistence, best_effort};
use crate::providers::{TextGenerator, Turn};

pub const MIN_INTENSITY: u8 = 1;
pub const MAX_INTENSITY: u8 = 7;

const INTENSITY_LABELS: [&str; 7] = [
    "barely there",
    "just a whisper",
    "noticeable",
    "taking up space",
    "pretty strong",
    "hard to ignore",
    "all I can feel",
];

/// Reply used when the model is unavailable or returns no usable JSON.
pub const FALLBACK_MESSAGE: &str = "I'm here with you.";
/// Message used when the reply parses but has no message.
pub const DEFAULT_MESSAGE: &str = "I'm here with you. You're doing great.";

/// Human label for an intensity on the 1-7 scale.
pub fn intensity_label(intensity: u8) -> &'static str {
    match intensity {
        0 => "just a little",
        n => INTENSITY_LABELS[usize::from(n.min(MAX_INTENSITY)) - 1],
    }
}

/// A validated check-in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckIn {
    pub mood: String,
    pub intensity: u8,
}

impl CheckIn {
    /// # Errors
    /// Returns an error if `mood` is blank or `intensity` is outside 1-7.
    pub fn new(mood: &str, intensity: u8) -> Result<Self> {
        let mood = mood.trim();
        if mood.is_empty() {
            bail!("Mood cannot be empty");
        }
        if !(MIN_INTENSITY..=MAX_INTENSITY).contains(&intensity) {
            bail!("Intensity must be between {MIN_INTENSITY} and {MAX_INTENSITY}, got {intensity}");
        }
        Ok(Self {
            mood: mood.to_string(),
            intensity,
        })
    }
}

/// Validating message plus suggested self-care actions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckInReply {
    pub message: String,
    pub actions: Vec<String>,
}

impl CheckInReply {
    pub fn fallback() -> Self {
        Self {
            message: FALLBACK_MESSAGE.to_string(),
            actions: Vec::new(),
        }
    }
}

#[derive(Deserialize)]
struct RawReply {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    actions: Vec<String>,
}

/// Parses the model reply, tolerating code fences and surrounding prose.
pub fn parse_reply(raw: &str) -> CheckInReply {
    let json = match (raw.find('{'), raw.rfind('}')) {
        (Some(start), Some(end)) if start < end => &raw[start..=end],
        _ => {
            tracing::warn!("Check-in reply contained no JSON object");
            return CheckInReply::fallback();
        }
    };

    match serde_json::from_str::<RawReply>(json) {
        Ok(reply) => CheckInReply {
            message: reply
                .message
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_MESSAGE.to_string()),
            actions: reply
                .actions
                .into_iter()
                .filter(|a| !a.trim().is_empty())
                .collect(),
        },
        Err(e) => {
            tracing::warn!(error = %e, "Check-in reply was not valid JSON");
            CheckInReply::fallback()
        }
    }
}

/// Asks the model to validate the check-in. Never fails.
pub async fn reflect(
    generator: &impl TextGenerator,
    check_in: &CheckIn,
    style: AttachmentStyle,
) -> CheckInReply {
    let prompt = match prompts::render(
        "check_in",
        CHECK_IN_PROMPT_TEMPLATE,
        context! {
            mood => check_in.mood,
            intensity => check_in.intensity,
            intensity_label => intensity_label(check_in.intensity),
            attachment_style => style.as_str(),
        },
    ) {
        Ok(prompt) => prompt,
        Err(e) => {
            tracing::error!(error = %e, "Check-in prompt failed to render");
            return CheckInReply::fallback();
        }
    };

    match generator.generate(&[Turn::user(prompt)]).await {
        Ok(raw) => parse_reply(&raw),
        Err(e) => {
            tracing::warn!(kind = %e.kind, error = %e, "Check-in reply unavailable");
            CheckInReply::fallback()
        }
    }
}

/// Stores the check-in. Returns whether the write succeeded.
pub async fn save(
    db: &impl Persistence,
    user_id: &str,
    check_in: &CheckIn,
    style: AttachmentStyle,
) -> bool {
    let record = CheckInRecord {
        user_id: user_id.to_string(),
        mood: check_in.intensity,
        notes: check_in.mood.clone(),
        attachment_style: style,
        created_at: None,
    };
    best_effort("insert_check_in", db.insert_check_in(&record))
        .await
        .is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::TurnRole;
    use crate::testing::{FakeGenerator, FakePersistence};

    #[test]
    fn test_intensity_labels() {
        assert_eq!(intensity_label(1), "barely there");
        assert_eq!(intensity_label(5), "pretty strong");
        assert_eq!(intensity_label(7), "all I can feel");
        assert_eq!(intensity_label(9), "all I can feel");
        assert_eq!(intensity_label(0), "just a little");
    }

    #[test]
    fn test_check_in_validation() {
        assert!(CheckIn::new("  ", 3).is_err());
        assert!(CheckIn::new("lonely", 0).is_err());
        assert!(CheckIn::new("lonely", 8).is_err());
        assert_eq!(CheckIn::new(" lonely ", 3).unwrap().mood, "lonely");
    }

    #[test]
    fn test_parse_reply_strips_code_fences() {
        let raw = "```json\n{\"message\": \"You matter.\", \"actions\": [\"Breathe\", \"Walk\"]}\n```";
        let reply = parse_reply(raw);
        assert_eq!(reply.message, "You matter.");
        assert_eq!(reply.actions, vec!["Breathe", "Walk"]);
    }

    #[test]
    fn test_parse_reply_defaults_missing_message() {
        let reply = parse_reply(r#"{"actions": ["Rest"]}"#);
        assert_eq!(reply.message, DEFAULT_MESSAGE);
        assert_eq!(reply.actions, vec!["Rest"]);
    }

    #[test]
    fn test_parse_reply_falls_back_on_prose() {
        assert_eq!(parse_reply("I hear you."), CheckInReply::fallback());
        assert_eq!(parse_reply("{not json}"), CheckInReply::fallback());
    }

    #[tokio::test]
    async fn test_reflect_sends_rendered_prompt() {
        let generator =
            FakeGenerator::replying(&[r#"{"message":"That sounds heavy.","actions":["Stretch"]}"#]);
        let check_in = CheckIn::new("lonely", 5).unwrap();

        let reply = reflect(&generator, &check_in, AttachmentStyle::Anxious).await;

        assert_eq!(reply.message, "That sounds heavy.");
        let calls = generator.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0][0].role, TurnRole::User);
        assert!(calls[0][0].text.contains("\"lonely\""));
        assert!(calls[0][0].text.contains("pretty strong"));
        assert!(calls[0][0].text.contains("anxious"));
    }

    #[tokio::test]
    async fn test_reflect_falls_back_when_model_unavailable() {
        let generator = FakeGenerator::unavailable();
        let check_in = CheckIn::new("numb", 2).unwrap();
        let reply = reflect(&generator, &check_in, AttachmentStyle::Avoidant).await;
        assert_eq!(reply, CheckInReply::fallback());
    }

    #[tokio::test]
    async fn test_save_records_intensity_and_mood() {
        let db = FakePersistence::default();
        let check_in = CheckIn::new("hopeful", 4).unwrap();
        assert!(save(&db, "u1", &check_in, AttachmentStyle::Secure).await);

        let rows = db.check_ins.lock().unwrap();
        assert_eq!(rows[0].mood, 4);
        assert_eq!(rows[0].notes, "hopeful");
        assert_eq!(rows[0].user_id, "u1");
    }

    #[tokio::test]
    async fn test_save_failure_is_reported_not_raised() {
        let db = FakePersistence::failing();
        let check_in = CheckIn::new("hopeful", 4).unwrap();
        assert!(!save(&db, "u1", &check_in, AttachmentStyle::Secure).await);
    }
}
