//! PostgREST tables used by the feature screens.

use reqwest::Method;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::auth::SessionCache;
use super::{SINGLE_OBJECT, SupabaseClient, send, send_json};
use crate::providers::ProviderError;
use crate::providers::persistence::{
    ChatTurnRecord, CheckInRecord, DashboardProfile, Persistence, ProfileUpdate,
    RescueSessionRecord, RestNoteRecord,
};

/// Persistence over PostgREST, authenticated as the cached user.
pub struct SupabaseRest {
    client: SupabaseClient,
    cache: SessionCache,
}

impl SupabaseRest {
    pub fn new(client: SupabaseClient, cache: SessionCache) -> Self {
        Self { client, cache }
    }

    /// Access token of the signed-in user; falls back to the anon key.
    fn bearer(&self) -> Option<String> {
        match self.cache.session() {
            Ok(session) => session.map(|s| s.access_token),
            Err(e) => {
                tracing::warn!(error = %e, "Session cache unreadable, using anon key");
                None
            }
        }
    }

    fn request(
        &self,
        method: Method,
        table: &str,
        params: &[(&str, &str)],
    ) -> Result<reqwest::RequestBuilder, ProviderError> {
        let url = self.client.endpoint(&format!("rest/v1/{table}"), params)?;
        let bearer = self.bearer();
        Ok(self
            .client
            .http()
            .request(method, url)
            .headers(self.client.headers(bearer.as_deref())))
    }

    async fn insert<T: Serialize + Sync>(&self, table: &str, record: &T) -> Result<(), ProviderError> {
        let request = self
            .request(Method::POST, table, &[])?
            .header("prefer", "return=minimal")
            .json(record);
        send(request).await?;
        tracing::debug!(table, "Row inserted");
        Ok(())
    }

    async fn list_newest_first<T: DeserializeOwned>(
        &self,
        table: &str,
        user_id: &str,
    ) -> Result<Vec<T>, ProviderError> {
        let user_filter = format!("eq.{user_id}");
        let request = self.request(
            Method::GET,
            table,
            &[
                ("user_id", user_filter.as_str()),
                ("select", "*"),
                ("order", "created_at.desc"),
            ],
        )?;
        send_json(request).await
    }
}

impl Persistence for SupabaseRest {
    async fn update_profile(&self, user_id: &str, update: &ProfileUpdate) -> Result<(), ProviderError> {
        let id_filter = format!("eq.{user_id}");
        let request = self
            .request(Method::PATCH, "users", &[("id", id_filter.as_str())])?
            .header("prefer", "return=minimal")
            .json(update);
        send(request).await?;
        Ok(())
    }

    async fn fetch_dashboard(&self, user_id: &str) -> Result<DashboardProfile, ProviderError> {
        let id_filter = format!("eq.{user_id}");
        let mut accept = HeaderMap::new();
        accept.insert(ACCEPT, HeaderValue::from_static(SINGLE_OBJECT));
        let request = self
            .request(
                Method::GET,
                "users",
                &[("id", id_filter.as_str()), ("select", "attachment_style,streak")],
            )?
            .headers(accept);
        send_json(request).await
    }

    async fn insert_check_in(&self, record: &CheckInRecord) -> Result<(), ProviderError> {
        self.insert("check_ins", record).await
    }

    async fn insert_chat_turn(&self, record: &ChatTurnRecord) -> Result<(), ProviderError> {
        self.insert("chat_history", record).await
    }

    async fn chat_history(
        &self,
        user_id: &str,
        feature: &str,
    ) -> Result<Vec<ChatTurnRecord>, ProviderError> {
        let user_filter = format!("eq.{user_id}");
        let feature_filter = format!("eq.{feature}");
        let request = self.request(
            Method::GET,
            "chat_history",
            &[
                ("user_id", user_filter.as_str()),
                ("feature", feature_filter.as_str()),
                ("select", "user_id,feature,user_message,ai_response,created_at"),
                ("order", "created_at.asc"),
            ],
        )?;
        send_json(request).await
    }

    async fn insert_rescue_session(&self, record: &RescueSessionRecord) -> Result<(), ProviderError> {
        self.insert("rescue_sessions", record).await
    }

    async fn insert_rest_note(&self, record: &RestNoteRecord) -> Result<(), ProviderError> {
        self.insert("rest_notes", record).await
    }

    async fn list_check_ins(&self, user_id: &str) -> Result<Vec<CheckInRecord>, ProviderError> {
        self.list_newest_first("check_ins", user_id).await
    }

    async fn list_rescue_sessions(
        &self,
        user_id: &str,
    ) -> Result<Vec<RescueSessionRecord>, ProviderError> {
        self.list_newest_first("rescue_sessions", user_id).await
    }

    async fn list_rest_notes(&self, user_id: &str) -> Result<Vec<RestNoteRecord>, ProviderError> {
        self.list_newest_first("rest_notes", user_id).await
    }
}
