//! Progress view: past entries and a one-line insight.

use minijinja::context;

use crate::prompts::{self, PROGRESS_PROMPT_TEMPLATE};
use crate::providers::persistence::{
    CheckInRecord, Persistence, RescueSessionRecord, RestNoteRecord, best_effort,
};
use crate::providers::{ProviderErrorKind, TextGenerator, Turn};

pub const NOT_ENOUGH_DATA: &str = "Not enough data yet to generate an insight.";
pub const NO_INSIGHT: &str = "Not enough insight generated yet.";
pub const INSIGHT_FAILED: &str = "Sorry, I couldn't generate insight at this time.";

/// Everything the user has recorded, newest first.
#[derive(Debug, Clone, Default)]
pub struct ProgressReport {
    pub check_ins: Vec<CheckInRecord>,
    pub rescue_sessions: Vec<RescueSessionRecord>,
    pub rest_notes: Vec<RestNoteRecord>,
}

impl ProgressReport {
    /// Loads each listing independently; a failed listing is left empty.
    pub async fn load(db: &impl Persistence, user_id: &str) -> Self {
        Self {
            check_ins: best_effort("list_check_ins", db.list_check_ins(user_id))
                .await
                .unwrap_or_default(),
            rescue_sessions: best_effort("list_rescue_sessions", db.list_rescue_sessions(user_id))
                .await
                .unwrap_or_default(),
            rest_notes: best_effort("list_rest_notes", db.list_rest_notes(user_id))
                .await
                .unwrap_or_default(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.check_ins.is_empty() && self.rescue_sessions.is_empty() && self.rest_notes.is_empty()
    }

    /// Check-in notes joined for the insight prompt.
    pub fn check_in_notes(&self) -> String {
        self.check_ins
            .iter()
            .map(|c| c.notes.trim())
            .filter(|n| !n.is_empty())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Collapses every whitespace run to a single space.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// One encouraging sentence summarizing `notes`. Never fails.
pub async fn insight(generator: &impl TextGenerator, notes: &str) -> String {
    let notes = collapse_whitespace(notes);
    if notes.is_empty() {
        return NOT_ENOUGH_DATA.to_string();
    }

    let prompt = match prompts::render("progress", PROGRESS_PROMPT_TEMPLATE, context! { notes }) {
        Ok(prompt) => prompt,
        Err(e) => {
            tracing::error!(error = %e, "Progress prompt failed to render");
            return INSIGHT_FAILED.to_string();
        }
    };

    match generator.generate(&[Turn::user(prompt)]).await {
        Ok(text) => text,
        Err(e) if e.kind == ProviderErrorKind::Parse => NO_INSIGHT.to_string(),
        Err(e) => {
            tracing::warn!(kind = %e.kind, error = %e, "Progress insight unavailable");
            INSIGHT_FAILED.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::attachment::AttachmentStyle;
    use crate::testing::{FakeGenerator, FakePersistence};

    fn check_in(notes: &str) -> CheckInRecord {
        CheckInRecord {
            user_id: "u1".into(),
            mood: 3,
            notes: notes.into(),
            attachment_style: AttachmentStyle::Secure,
            created_at: None,
        }
    }

    #[tokio::test]
    async fn test_blank_notes_skip_the_model() {
        let generator = FakeGenerator::unavailable();
        assert_eq!(insight(&generator, " \n\t ").await, NOT_ENOUGH_DATA);
        assert!(generator.calls().is_empty());
    }

    #[tokio::test]
    async fn test_notes_are_collapsed_before_prompting() {
        let generator = FakeGenerator::replying(&["You've been steady."]);
        let text = insight(&generator, "  calm,\n\n  tired   today ").await;
        assert_eq!(text, "You've been steady.");
        assert!(generator.calls()[0][0].text.contains("notes: calm, tired today."));
    }

    #[tokio::test]
    async fn test_failure_uses_apology() {
        let generator = FakeGenerator::unavailable();
        assert_eq!(insight(&generator, "calm").await, INSIGHT_FAILED);
    }

    #[tokio::test]
    async fn test_report_is_newest_first_and_tolerates_failures() {
        let db = FakePersistence::default();
        db.check_ins.lock().unwrap().extend([check_in("first"), check_in("second")]);

        let report = ProgressReport::load(&db, "u1").await;
        assert_eq!(report.check_ins[0].notes, "second");
        assert_eq!(report.check_in_notes(), "second, first");
        assert!(!report.is_empty());

        let report = ProgressReport::load(&FakePersistence::failing(), "u1").await;
        assert!(report.is_empty());
    }
}
