//! Scripted collaborators for unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::broadcast;

use crate::features::attachment::AttachmentStyle;
use crate::providers::persistence::{
    ChatTurnRecord, CheckInRecord, DashboardProfile, Persistence, ProfileUpdate,
    RescueSessionRecord, RestNoteRecord,
};
use crate::providers::{
    AuthSession, IdentityProvider, ProviderError, ProviderErrorKind, SessionEvent, SessionUser,
    TextGenerator, Turn,
};
use crate::session::callback::OAuthCallback;
use crate::session::state::Identity;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn session_for(user_id: &str) -> AuthSession {
    AuthSession {
        access_token: format!("access-{user_id}"),
        refresh_token: Some(format!("refresh-{user_id}")),
        expires_at: None,
        user: SessionUser {
            id: user_id.to_string(),
            email: Some(format!("{user_id}@example.com")),
        },
    }
}

#[derive(Default)]
struct IdentityScript {
    session: Option<AuthSession>,
    accepted_code: Option<(String, AuthSession)>,
    get_session_error: Option<String>,
    profile_fails: bool,
    sign_out_fails: bool,
    attachment_style: Option<AttachmentStyle>,
    delay: Option<Duration>,
    exchange_count: usize,
    get_session_count: usize,
}

/// Identity provider driven by test setup.
pub(crate) struct FakeIdentity {
    script: Mutex<IdentityScript>,
    events: broadcast::Sender<SessionEvent>,
}

impl FakeIdentity {
    pub(crate) fn new() -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            script: Mutex::new(IdentityScript::default()),
            events,
        }
    }

    pub(crate) fn signed_in(user_id: &str) -> Self {
        let fake = Self::new();
        lock(&fake.script).session = Some(session_for(user_id));
        fake
    }

    pub(crate) fn accept_code(&self, code: &str, user_id: &str) {
        lock(&self.script).accepted_code = Some((code.to_string(), session_for(user_id)));
    }

    pub(crate) fn fail_get_session(&self, message: &str) {
        lock(&self.script).get_session_error = Some(message.to_string());
    }

    pub(crate) fn fail_profile(&self) {
        lock(&self.script).profile_fails = true;
    }

    pub(crate) fn fail_sign_out(&self) {
        lock(&self.script).sign_out_fails = true;
    }

    pub(crate) fn set_delay(&self, delay: Duration) {
        lock(&self.script).delay = Some(delay);
    }

    pub(crate) fn set_attachment_style(&self, style: AttachmentStyle) {
        lock(&self.script).attachment_style = Some(style);
    }

    pub(crate) fn exchange_count(&self) -> usize {
        lock(&self.script).exchange_count
    }

    pub(crate) fn get_session_count(&self) -> usize {
        lock(&self.script).get_session_count
    }

    pub(crate) fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    pub(crate) fn receiver_count(&self) -> usize {
        self.events.receiver_count()
    }

    async fn pause(&self) {
        let delay = lock(&self.script).delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

impl IdentityProvider for FakeIdentity {
    async fn get_session(&self) -> Result<Option<AuthSession>, ProviderError> {
        self.pause().await;
        let mut script = lock(&self.script);
        script.get_session_count += 1;
        if let Some(message) = &script.get_session_error {
            return Err(ProviderError::timeout(message.clone()));
        }
        Ok(script.session.clone())
    }

    async fn exchange_callback(&self, callback: &OAuthCallback) -> Result<AuthSession, ProviderError> {
        self.pause().await;
        let mut script = lock(&self.script);
        script.exchange_count += 1;
        match callback {
            OAuthCallback::Code { code } => match &script.accepted_code {
                Some((accepted, session)) if accepted == code => {
                    let session = session.clone();
                    script.session = Some(session.clone());
                    Ok(session)
                }
                _ => Err(ProviderError::http_status(
                    400,
                    r#"{"error_description":"invalid flow state"}"#,
                )),
            },
            OAuthCallback::Tokens { .. } => {
                let session = session_for("implicit-user");
                script.session = Some(session.clone());
                Ok(session)
            }
            OAuthCallback::Error { error, description } => Err(ProviderError::api_error(
                error,
                description.as_deref().unwrap_or_default(),
            )),
        }
    }

    async fn fetch_identity(&self, session: &AuthSession) -> Result<Identity, ProviderError> {
        self.pause().await;
        let script = lock(&self.script);
        if script.profile_fails {
            return Err(ProviderError::http_status(500, ""));
        }
        Ok(Identity {
            id: session.user.id.clone(),
            email: session.user.email.clone(),
            attachment_style: script.attachment_style,
        })
    }

    async fn sign_out(&self) -> Result<(), ProviderError> {
        let mut script = lock(&self.script);
        script.session = None;
        if script.sign_out_fails {
            return Err(ProviderError::new(
                ProviderErrorKind::Timeout,
                "logout timed out",
            ));
        }
        Ok(())
    }

    fn sign_in_url(&self, provider: &str, redirect_to: &str) -> Result<String, ProviderError> {
        Ok(format!(
            "https://auth.example.com/authorize?provider={provider}&redirect_to={redirect_to}"
        ))
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }
}

/// In-memory persistence with an optional global failure switch.
#[derive(Default)]
pub(crate) struct FakePersistence {
    failing: AtomicBool,
    pub(crate) profiles: Mutex<Vec<(String, ProfileUpdate)>>,
    pub(crate) dashboard: Mutex<DashboardProfile>,
    pub(crate) check_ins: Mutex<Vec<CheckInRecord>>,
    pub(crate) chat_turns: Mutex<Vec<ChatTurnRecord>>,
    pub(crate) rescue_sessions: Mutex<Vec<RescueSessionRecord>>,
    pub(crate) rest_notes: Mutex<Vec<RestNoteRecord>>,
}

impl FakePersistence {
    pub(crate) fn failing() -> Self {
        let fake = Self::default();
        fake.failing.store(true, Ordering::SeqCst);
        fake
    }

    fn check(&self) -> Result<(), ProviderError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ProviderError::http_status(503, "unavailable"));
        }
        Ok(())
    }
}

fn newest_first<T: Clone>(rows: &Mutex<Vec<T>>) -> Vec<T> {
    lock(rows).iter().rev().cloned().collect()
}

impl Persistence for FakePersistence {
    async fn update_profile(&self, user_id: &str, update: &ProfileUpdate) -> Result<(), ProviderError> {
        self.check()?;
        lock(&self.profiles).push((user_id.to_string(), update.clone()));
        Ok(())
    }

    async fn fetch_dashboard(&self, _user_id: &str) -> Result<DashboardProfile, ProviderError> {
        self.check()?;
        Ok(lock(&self.dashboard).clone())
    }

    async fn insert_check_in(&self, record: &CheckInRecord) -> Result<(), ProviderError> {
        self.check()?;
        lock(&self.check_ins).push(record.clone());
        Ok(())
    }

    async fn insert_chat_turn(&self, record: &ChatTurnRecord) -> Result<(), ProviderError> {
        self.check()?;
        lock(&self.chat_turns).push(record.clone());
        Ok(())
    }

    async fn chat_history(
        &self,
        user_id: &str,
        feature: &str,
    ) -> Result<Vec<ChatTurnRecord>, ProviderError> {
        self.check()?;
        Ok(lock(&self.chat_turns)
            .iter()
            .filter(|t| t.user_id == user_id && t.feature == feature)
            .cloned()
            .collect())
    }

    async fn insert_rescue_session(&self, record: &RescueSessionRecord) -> Result<(), ProviderError> {
        self.check()?;
        lock(&self.rescue_sessions).push(record.clone());
        Ok(())
    }

    async fn insert_rest_note(&self, record: &RestNoteRecord) -> Result<(), ProviderError> {
        self.check()?;
        lock(&self.rest_notes).push(record.clone());
        Ok(())
    }

    async fn list_check_ins(&self, _user_id: &str) -> Result<Vec<CheckInRecord>, ProviderError> {
        self.check()?;
        Ok(newest_first(&self.check_ins))
    }

    async fn list_rescue_sessions(
        &self,
        _user_id: &str,
    ) -> Result<Vec<RescueSessionRecord>, ProviderError> {
        self.check()?;
        Ok(newest_first(&self.rescue_sessions))
    }

    async fn list_rest_notes(&self, _user_id: &str) -> Result<Vec<RestNoteRecord>, ProviderError> {
        self.check()?;
        Ok(newest_first(&self.rest_notes))
    }
}

/// Text generator that replays queued replies and records every request.
#[derive(Default)]
pub(crate) struct FakeGenerator {
    replies: Mutex<VecDeque<Result<String, ProviderError>>>,
    calls: Mutex<Vec<Vec<Turn>>>,
}

impl FakeGenerator {
    pub(crate) fn replying(replies: &[&str]) -> Self {
        let fake = Self::default();
        lock(&fake.replies).extend(replies.iter().map(|r| Ok((*r).to_string())));
        fake
    }

    /// Every call fails (e.g. no API key).
    pub(crate) fn unavailable() -> Self {
        Self::default()
    }

    pub(crate) fn calls(&self) -> Vec<Vec<Turn>> {
        lock(&self.calls).clone()
    }
}

impl TextGenerator for FakeGenerator {
    async fn generate(&self, turns: &[Turn]) -> Result<String, ProviderError> {
        lock(&self.calls).push(turns.to_vec());
        lock(&self.replies).pop_front().unwrap_or_else(|| {
            Err(ProviderError::api_error(
                "missing_api_key",
                "Gemini API key is not configured",
            ))
        })
    }
}
