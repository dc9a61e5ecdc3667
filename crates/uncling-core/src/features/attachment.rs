//! Attachment styles and the copy that depends on them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Attachment style derived from the onboarding questionnaire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentStyle {
    Anxious,
    Avoidant,
    Disorganized,
    /// Fallback for anyone who has not finished onboarding.
    #[default]
    Secure,
}

impl AttachmentStyle {
    pub fn all() -> &'static [AttachmentStyle] {
        &[
            AttachmentStyle::Anxious,
            AttachmentStyle::Avoidant,
            AttachmentStyle::Disorganized,
            AttachmentStyle::Secure,
        ]
    }

    /// Storage/wire form (`"anxious"`, ...).
    pub fn as_str(self) -> &'static str {
        match self {
            AttachmentStyle::Anxious => "anxious",
            AttachmentStyle::Avoidant => "avoidant",
            AttachmentStyle::Disorganized => "disorganized",
            AttachmentStyle::Secure => "secure",
        }
    }

    /// Settings-screen description.
    pub fn description(self) -> &'static str {
        match self {
            AttachmentStyle::Anxious => {
                "You tend to seek reassurance and worry about relationships. You're working on building self-soothing skills."
            }
            AttachmentStyle::Avoidant => {
                "You value independence and often handle emotions internally. You're exploring emotional connection."
            }
            AttachmentStyle::Disorganized => {
                "You experience mixed feelings about closeness. You're building trust and emotional regulation skills."
            }
            AttachmentStyle::Secure => {
                "You're comfortable with intimacy and independence. You're continuing to grow in self-awareness."
            }
        }
    }

    /// Dashboard encouragement line.
    pub fn encouragement(self) -> &'static str {
        match self {
            AttachmentStyle::Anxious => {
                "Remember: Your worth isn't determined by others' responses to you."
            }
            AttachmentStyle::Avoidant => {
                "Today, consider one small way to connect authentically with someone."
            }
            AttachmentStyle::Disorganized => "You're learning to trust yourself. That's brave work.",
            AttachmentStyle::Secure => {
                "You're building on a foundation of self-awareness and growth."
            }
        }
    }

    /// Mood chips offered on the check-in screen.
    pub fn suggested_moods(self) -> &'static [&'static str] {
        match self {
            AttachmentStyle::Anxious => &["anxious", "overwhelmed", "restless", "worried", "hopeful"],
            AttachmentStyle::Avoidant => &["numb", "distant", "independent", "guarded", "calm"],
            AttachmentStyle::Disorganized => {
                &["confused", "mixed up", "conflicted", "scattered", "seeking"]
            }
            AttachmentStyle::Secure => &["peaceful", "grateful", "reflective", "content", "growing"],
        }
    }

    /// Parses a stored value, falling back to `Secure` for anything unrecognized.
    pub fn parse_or_default(value: Option<&str>) -> Self {
        value.and_then(|v| v.parse().ok()).unwrap_or_default()
    }
}

impl fmt::Display for AttachmentStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttachmentStyle {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "anxious" => Ok(AttachmentStyle::Anxious),
            "avoidant" => Ok(AttachmentStyle::Avoidant),
            "disorganized" => Ok(AttachmentStyle::Disorganized),
            "secure" => Ok(AttachmentStyle::Secure),
            other => anyhow::bail!("Unknown attachment style: {other}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!(
            " Anxious ".parse::<AttachmentStyle>().unwrap(),
            AttachmentStyle::Anxious
        );
        assert!("clingy".parse::<AttachmentStyle>().is_err());
    }

    #[test]
    fn test_parse_or_default_falls_back_to_secure() {
        assert_eq!(AttachmentStyle::parse_or_default(None), AttachmentStyle::Secure);
        assert_eq!(
            AttachmentStyle::parse_or_default(Some("")),
            AttachmentStyle::Secure
        );
        assert_eq!(
            AttachmentStyle::parse_or_default(Some("avoidant")),
            AttachmentStyle::Avoidant
        );
    }

    #[test]
    fn test_every_style_suggests_five_moods() {
        for style in AttachmentStyle::all() {
            assert_eq!(style.suggested_moods().len(), 5, "{style}");
        }
    }

    #[test]
    fn test_serde_uses_lowercase() {
        let json = serde_json::to_string(&AttachmentStyle::Disorganized).unwrap();
        assert_eq!(json, "\"disorganized\"");
    }
}
