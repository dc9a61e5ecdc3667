//! Persistence service boundary (table-style reads and inserts keyed by user id).
//!
//! Writes are best-effort: a failure is logged and the user-facing flow
//! continues. See [`best_effort`].

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ProviderError;
use super::gemini::Turn;
use crate::features::attachment::AttachmentStyle;

/// Profile columns written at the end of onboarding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProfileUpdate {
    pub attachment_style: AttachmentStyle,
    pub tone_preference: String,
    pub summary_notes: String,
}

impl ProfileUpdate {
    pub fn for_style(attachment_style: AttachmentStyle) -> Self {
        Self {
            attachment_style,
            tone_preference: "kind".to_string(),
            summary_notes: String::new(),
        }
    }
}

/// Dashboard header data.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct DashboardProfile {
    #[serde(default)]
    pub attachment_style: Option<AttachmentStyle>,
    #[serde(default)]
    pub streak: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckInRecord {
    pub user_id: String,
    /// Intensity 1-7.
    pub mood: u8,
    pub notes: String,
    pub attachment_style: AttachmentStyle,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurnRecord {
    pub user_id: String,
    pub feature: String,
    pub user_message: String,
    pub ai_response: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RescueSessionRecord {
    pub user_id: String,
    #[serde(default)]
    pub conversation: Vec<Turn>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feeling: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestNoteRecord {
    pub user_id: String,
    pub notes: String,
    pub attachment_style: AttachmentStyle,
    #[serde(default)]
    pub ai_reflection: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Hosted relational backend used by the feature screens.
pub trait Persistence: Send + Sync {
    fn update_profile(
        &self,
        user_id: &str,
        update: &ProfileUpdate,
    ) -> impl Future<Output = Result<(), ProviderError>> + Send;

    fn fetch_dashboard(
        &self,
        user_id: &str,
    ) -> impl Future<Output = Result<DashboardProfile, ProviderError>> + Send;

    fn insert_check_in(
        &self,
        record: &CheckInRecord,
    ) -> impl Future<Output = Result<(), ProviderError>> + Send;

    fn insert_chat_turn(
        &self,
        record: &ChatTurnRecord,
    ) -> impl Future<Output = Result<(), ProviderError>> + Send;

    /// Chat turns of one feature, oldest first.
    fn chat_history(
        &self,
        user_id: &str,
        feature: &str,
    ) -> impl Future<Output = Result<Vec<ChatTurnRecord>, ProviderError>> + Send;

    fn insert_rescue_session(
        &self,
        record: &RescueSessionRecord,
    ) -> impl Future<Output = Result<(), ProviderError>> + Send;

    fn insert_rest_note(
        &self,
        record: &RestNoteRecord,
    ) -> impl Future<Output = Result<(), ProviderError>> + Send;

    /// Newest first.
    fn list_check_ins(
        &self,
        user_id: &str,
    ) -> impl Future<Output = Result<Vec<CheckInRecord>, ProviderError>> + Send;

    /// Newest first.
    fn list_rescue_sessions(
        &self,
        user_id: &str,
    ) -> impl Future<Output = Result<Vec<RescueSessionRecord>, ProviderError>> + Send;

    /// Newest first.
    fn list_rest_notes(
        &self,
        user_id: &str,
    ) -> impl Future<Output = Result<Vec<RestNoteRecord>, ProviderError>> + Send;
}

/// Awaits a persistence call, logging and discarding any failure.
pub async fn best_effort<T>(
    operation: &'static str,
    call: impl Future<Output = Result<T, ProviderError>>,
) -> Option<T> {
    match call.await {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(operation, kind = %e.kind, error = %e, "Persistence call failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_best_effort_swallows_errors() {
        let failed: Option<()> =
            best_effort("insert", async { Err(ProviderError::timeout("slow")) }).await;
        assert_eq!(failed, None);

        let ok = best_effort("fetch", async { Ok::<_, ProviderError>(3) }).await;
        assert_eq!(ok, Some(3));
    }

    #[test]
    fn test_check_in_serializes_without_timestamp() {
        let record = CheckInRecord {
            user_id: "u1".into(),
            mood: 4,
            notes: "tired".into(),
            attachment_style: AttachmentStyle::Anxious,
            created_at: None,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["attachment_style"], "anxious");
        assert!(json.get("created_at").is_none());
    }

    #[test]
    fn test_dashboard_tolerates_nulls() {
        let profile: DashboardProfile =
            serde_json::from_str(r#"{"attachment_style":null,"streak":null}"#).unwrap();
        assert_eq!(profile, DashboardProfile::default());
    }
}
