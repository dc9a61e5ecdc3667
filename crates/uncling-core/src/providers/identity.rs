//! Identity provider boundary.

use std::fmt;
use std::future::Future;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use super::ProviderError;
use crate::session::callback::OAuthCallback;
use crate::session::state::Identity;

/// Seconds before expiry at which a session is treated as expired.
const EXPIRY_LEEWAY_SECS: i64 = 60;

/// User attached to a provider session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Provider session. Tokens are never printed.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Unix timestamp (seconds).
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub user: SessionUser,
}

impl AuthSession {
    /// Whether the access token is expired (or about to be) at `now`.
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.expires_at
            .is_some_and(|expires_at| now + EXPIRY_LEEWAY_SECS >= expires_at)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(chrono::Utc::now().timestamp())
    }
}

impl fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthSession")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("expires_at", &self.expires_at)
            .field("user", &self.user)
            .finish()
    }
}

/// Session change pushed by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    SignedIn(AuthSession),
    SignedOut,
    TokenRefreshed(AuthSession),
    UserUpdated(AuthSession),
}

impl SessionEvent {
    pub fn name(&self) -> &'static str {
        match self {
            SessionEvent::SignedIn(_) => "signed_in",
            SessionEvent::SignedOut => "signed_out",
            SessionEvent::TokenRefreshed(_) => "token_refreshed",
            SessionEvent::UserUpdated(_) => "user_updated",
        }
    }
}

/// External session/identity provider.
pub trait IdentityProvider: Send + Sync + 'static {
    /// Current session, refreshed if needed. `None` when signed out.
    fn get_session(
        &self,
    ) -> impl Future<Output = Result<Option<AuthSession>, ProviderError>> + Send;

    /// Exchanges redirect credentials for a session.
    fn exchange_callback(
        &self,
        callback: &OAuthCallback,
    ) -> impl Future<Output = Result<AuthSession, ProviderError>> + Send;

    /// Reads the profile backing `session`.
    fn fetch_identity(
        &self,
        session: &AuthSession,
    ) -> impl Future<Output = Result<Identity, ProviderError>> + Send;

    fn sign_out(&self) -> impl Future<Output = Result<(), ProviderError>> + Send;

    /// Authorize URL for an external sign-in provider (e.g. `google`).
    ///
    /// # Errors
    /// Returns an error if the sign-in flow cannot be prepared.
    fn sign_in_url(&self, provider: &str, redirect_to: &str) -> Result<String, ProviderError>;

    /// Push notifications of session changes.
    fn subscribe(&self) -> broadcast::Receiver<SessionEvent>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(expires_at: Option<i64>) -> AuthSession {
        AuthSession {
            access_token: "secret-access".into(),
            refresh_token: Some("secret-refresh".into()),
            expires_at,
            user: SessionUser {
                id: "u1".into(),
                email: None,
            },
        }
    }

    #[test]
    fn test_expiry_uses_leeway() {
        assert!(!session(None).is_expired_at(1_000));
        assert!(!session(Some(2_000)).is_expired_at(1_000));
        assert!(session(Some(1_030)).is_expired_at(1_000));
        assert!(session(Some(900)).is_expired_at(1_000));
    }

    #[test]
    fn test_debug_redacts_tokens() {
        let printed = format!("{:?}", session(None));
        assert!(!printed.contains("secret"));
        assert!(printed.contains("u1"));
    }
}
