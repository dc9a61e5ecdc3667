//! GoTrue sign-in flows and the local session cache.
//!
//! The session lives in `<base>/session.json` with restricted permissions
//! (0600), next to the PKCE verifier of a sign-in that is still in flight.
//! Tokens are never logged.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use tokio::sync::broadcast;

use super::{SINGLE_OBJECT, SupabaseClient, send, send_json};
use crate::features::attachment::AttachmentStyle;
use crate::providers::identity::{AuthSession, IdentityProvider, SessionEvent, SessionUser};
use crate::providers::{ProviderError, ProviderErrorKind};
use crate::session::callback::OAuthCallback;
use crate::session::flags::write_private;
use crate::session::state::Identity;

const EVENT_CAPACITY: usize = 16;

#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheData {
    #[serde(default)]
    session: Option<AuthSession>,
    #[serde(default)]
    pkce_verifier: Option<String>,
}

/// File-backed session cache.
#[derive(Debug, Clone)]
pub struct SessionCache {
    path: PathBuf,
}

impl SessionCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Cached session, if any.
    ///
    /// # Errors
    /// Returns an error if the cache file cannot be read or parsed.
    pub fn session(&self) -> Result<Option<AuthSession>> {
        Ok(self.load()?.session)
    }

    fn load(&self) -> Result<CacheData> {
        if !self.path.exists() {
            return Ok(CacheData::default());
        }
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read session cache from {}", self.path.display()))?;
        if contents.trim().is_empty() {
            return Ok(CacheData::default());
        }
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse session cache from {}", self.path.display()))
    }

    fn update(&self, f: impl FnOnce(&mut CacheData)) -> Result<()> {
        let mut data = self.load()?;
        f(&mut data);

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
        let contents =
            serde_json::to_string_pretty(&data).context("Failed to serialize session cache")?;
        write_private(&self.path, &contents)
    }
}

fn cache_error(e: &anyhow::Error) -> ProviderError {
    ProviderError::new(ProviderErrorKind::ApiError, format!("Session cache: {e:#}"))
}

struct Pkce {
    verifier: String,
    challenge: String,
}

fn generate_pkce() -> Pkce {
    let first = uuid::Uuid::new_v4();
    let second = uuid::Uuid::new_v4();
    let mut verifier_bytes = [0u8; 32];
    verifier_bytes[..16].copy_from_slice(first.as_bytes());
    verifier_bytes[16..].copy_from_slice(second.as_bytes());
    let verifier = URL_SAFE_NO_PAD.encode(verifier_bytes);

    let mut hasher = Sha256::new();
    hasher.update(verifier.as_bytes());
    let challenge = URL_SAFE_NO_PAD.encode(hasher.finalize());

    Pkce {
        verifier,
        challenge,
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: SessionUser,
}

impl TokenResponse {
    fn into_session(self) -> AuthSession {
        let now = chrono::Utc::now().timestamp();
        AuthSession {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at: self.expires_at.or(self.expires_in.map(|secs| now + secs)),
            user: self.user,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ProfileRow {
    id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    attachment_style: Option<String>,
}

/// GoTrue-backed identity provider.
pub struct SupabaseAuth {
    client: SupabaseClient,
    cache: SessionCache,
    events: broadcast::Sender<SessionEvent>,
}

impl SupabaseAuth {
    pub fn new(client: SupabaseClient, cache: SessionCache) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            client,
            cache,
            events,
        }
    }

    pub fn cache(&self) -> &SessionCache {
        &self.cache
    }

    /// Emails a sign-in link that redirects back to `redirect_to`.
    ///
    /// # Errors
    /// Returns an error if the request fails or the backend rejects it.
    pub async fn send_magic_link(&self, email: &str, redirect_to: &str) -> Result<(), ProviderError> {
        let pkce = self.begin_pkce()?;
        let url = self
            .client
            .endpoint("auth/v1/otp", &[("redirect_to", redirect_to)])?;
        let request = self
            .client
            .http()
            .post(url)
            .headers(self.client.headers(None))
            .json(&json!({
                "email": email,
                "create_user": true,
                "code_challenge": pkce.challenge,
                "code_challenge_method": "s256",
            }));
        send(request).await?;
        tracing::info!("Magic link requested");
        Ok(())
    }

    /// Persists a fresh PKCE verifier for the next code exchange.
    fn begin_pkce(&self) -> Result<Pkce, ProviderError> {
        let pkce = generate_pkce();
        let verifier = pkce.verifier.clone();
        self.cache
            .update(|data| data.pkce_verifier = Some(verifier))
            .map_err(|e| cache_error(&e))?;
        Ok(pkce)
    }

    async fn exchange_code(&self, code: &str) -> Result<AuthSession, ProviderError> {
        let verifier = self
            .cache
            .load()
            .map_err(|e| cache_error(&e))?
            .pkce_verifier
            .ok_or_else(|| {
                ProviderError::api_error("missing_verifier", "No sign-in is in progress")
            })?;

        let url = self
            .client
            .endpoint("auth/v1/token", &[("grant_type", "pkce")])?;
        let request = self
            .client
            .http()
            .post(url)
            .headers(self.client.headers(None))
            .json(&json!({ "auth_code": code, "code_verifier": verifier }));
        let token: TokenResponse = send_json(request).await?;
        Ok(token.into_session())
    }

    async fn validate_tokens(
        &self,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_in: Option<i64>,
    ) -> Result<AuthSession, ProviderError> {
        let url = self.client.endpoint("auth/v1/user", &[])?;
        let request = self
            .client
            .http()
            .get(url)
            .headers(self.client.headers(Some(access_token)));
        let user: SessionUser = send_json(request).await?;

        Ok(AuthSession {
            access_token: access_token.to_string(),
            refresh_token: refresh_token.map(str::to_string),
            expires_at: expires_in.map(|secs| chrono::Utc::now().timestamp() + secs),
            user,
        })
    }

    async fn refresh(&self, refresh_token: &str) -> Result<AuthSession, ProviderError> {
        let url = self
            .client
            .endpoint("auth/v1/token", &[("grant_type", "refresh_token")])?;
        let request = self
            .client
            .http()
            .post(url)
            .headers(self.client.headers(None))
            .json(&json!({ "refresh_token": refresh_token }));
        let token: TokenResponse = send_json(request).await?;
        Ok(token.into_session())
    }

    fn store_session(&self, session: &AuthSession) -> Result<(), ProviderError> {
        let session = session.clone();
        self.cache
            .update(|data| {
                data.session = Some(session);
                data.pkce_verifier = None;
            })
            .map_err(|e| cache_error(&e))
    }

    fn clear_session(&self) -> Result<(), ProviderError> {
        self.cache
            .update(|data| data.session = None)
            .map_err(|e| cache_error(&e))
    }

    fn emit(&self, event: SessionEvent) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }
}

impl IdentityProvider for SupabaseAuth {
    async fn get_session(&self) -> Result<Option<AuthSession>, ProviderError> {
        let Some(session) = self.cache.session().map_err(|e| cache_error(&e))? else {
            return Ok(None);
        };
        if !session.is_expired() {
            return Ok(Some(session));
        }

        let Some(refresh_token) = session.refresh_token.as_deref() else {
            tracing::info!("Session expired without a refresh token");
            self.clear_session()?;
            return Ok(None);
        };

        match self.refresh(refresh_token).await {
            Ok(refreshed) => {
                self.store_session(&refreshed)?;
                tracing::debug!("Session refreshed");
                self.emit(SessionEvent::TokenRefreshed(refreshed.clone()));
                Ok(Some(refreshed))
            }
            Err(e) if e.kind == ProviderErrorKind::HttpStatus && e.message.starts_with("HTTP 4") => {
                tracing::info!(error = %e, "Refresh token rejected, signing out locally");
                self.clear_session()?;
                self.emit(SessionEvent::SignedOut);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn exchange_callback(&self, callback: &OAuthCallback) -> Result<AuthSession, ProviderError> {
        let session = match callback {
            OAuthCallback::Code { code } => self.exchange_code(code).await?,
            OAuthCallback::Tokens {
                access_token,
                refresh_token,
                expires_in,
                ..
            } => {
                self.validate_tokens(access_token, refresh_token.as_deref(), *expires_in)
                    .await?
            }
            OAuthCallback::Error { error, description } => {
                return Err(ProviderError::api_error(
                    error,
                    description.as_deref().unwrap_or("sign-in was not completed"),
                ));
            }
        };

        self.store_session(&session)?;
        self.emit(SessionEvent::SignedIn(session.clone()));
        Ok(session)
    }

    async fn fetch_identity(&self, session: &AuthSession) -> Result<Identity, ProviderError> {
        let id_filter = format!("eq.{}", session.user.id);
        let url = self.client.endpoint(
            "rest/v1/users",
            &[("id", id_filter.as_str()), ("select", "id,email,attachment_style")],
        )?;
        let mut headers = self.client.headers(Some(&session.access_token));
        headers.insert("accept", reqwest::header::HeaderValue::from_static(SINGLE_OBJECT));
        let request = self.client.http().get(url).headers(headers);
        let row: ProfileRow = send_json(request).await?;

        Ok(Identity {
            id: row.id,
            email: row.email.or_else(|| session.user.email.clone()),
            attachment_style: row
                .attachment_style
                .as_deref()
                .and_then(|s| s.parse::<AttachmentStyle>().ok()),
        })
    }

    async fn sign_out(&self) -> Result<(), ProviderError> {
        let session = self.cache.session().map_err(|e| cache_error(&e))?;
        self.clear_session()?;
        self.emit(SessionEvent::SignedOut);

        let Some(session) = session else {
            return Ok(());
        };
        let url = self.client.endpoint("auth/v1/logout", &[])?;
        let request = self
            .client
            .http()
            .post(url)
            .headers(self.client.headers(Some(&session.access_token)));
        send(request).await?;
        Ok(())
    }

    fn sign_in_url(&self, provider: &str, redirect_to: &str) -> Result<String, ProviderError> {
        let pkce = self.begin_pkce()?;
        let url = self.client.endpoint(
            "auth/v1/authorize",
            &[
                ("provider", provider),
                ("redirect_to", redirect_to),
                ("code_challenge", pkce.challenge.as_str()),
                ("code_challenge_method", "s256"),
            ],
        )?;
        Ok(url.into())
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }
}
