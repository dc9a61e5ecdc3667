//! External collaborators: identity provider, persistence service, text generation.
//!
//! Everything here is a thin HTTP boundary. Errors are normalized into
//! [`ProviderError`] so callers can log them and degrade without ever
//! showing provider text to the end user.

use std::fmt;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod gemini;
pub mod identity;
pub mod persistence;
pub mod supabase;

pub use gemini::{GeminiClient, GeminiConfig, TextGenerator, Turn, TurnRole};
pub use identity::{AuthSession, IdentityProvider, SessionEvent, SessionUser};
pub use persistence::{Persistence, best_effort};

/// Standard User-Agent header for Uncling API requests.
pub const USER_AGENT: &str = concat!("uncling/", env!("CARGO_PKG_VERSION"));

/// Error category for provider failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorKind {
    /// HTTP status error (4xx, 5xx)
    HttpStatus,
    /// Connection timeout or request timeout
    Timeout,
    /// Failed to parse response
    Parse,
    /// API-level error returned by the provider (invalid callback, rejected grant)
    ApiError,
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderErrorKind::HttpStatus => write!(f, "http_status"),
            ProviderErrorKind::Timeout => write!(f, "timeout"),
            ProviderErrorKind::Parse => write!(f, "parse"),
            ProviderErrorKind::ApiError => write!(f, "api_error"),
        }
    }
}

/// Structured error from a provider with kind and details.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderError {
    /// Error category
    pub kind: ProviderErrorKind,
    /// One-line summary suitable for logs
    pub message: String,
    /// Optional additional details (e.g., raw error body)
    pub details: Option<String>,
}

impl ProviderError {
    /// Creates a new provider error.
    pub fn new(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: None,
        }
    }

    /// Creates an HTTP status error.
    ///
    /// GoTrue reports `error_description`/`msg`, PostgREST and Gemini report
    /// `message` (Gemini nests it under `error`); the first one found is used.
    pub fn http_status(status: u16, body: &str) -> Self {
        let details = (!body.is_empty()).then(|| body.to_string());
        let message = serde_json::from_str::<Value>(body)
            .ok()
            .and_then(|json| extract_error_message(&json))
            .map_or_else(
                || format!("HTTP {status}"),
                |msg| format!("HTTP {status}: {msg}"),
            );
        Self {
            kind: ProviderErrorKind::HttpStatus,
            message,
            details,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Timeout, message)
    }

    /// Creates a parse error.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Parse, message)
    }

    /// Creates an API error (e.g. an OAuth `error=` callback).
    pub fn api_error(error_type: &str, message: &str) -> Self {
        Self::new(
            ProviderErrorKind::ApiError,
            format!("{error_type}: {message}"),
        )
    }
}

fn extract_error_message(json: &Value) -> Option<String> {
    ["error_description", "msg", "message"]
        .iter()
        .find_map(|key| json.get(key).and_then(Value::as_str))
        .or_else(|| {
            json.get("error")
                .and_then(|e| e.get("message").or(Some(e)))
                .and_then(Value::as_str)
        })
        .map(str::to_string)
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ProviderError {}

/// Maps a transport error onto a provider error kind.
pub fn classify_reqwest_error(e: &reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::timeout(format!("Request timed out: {e}"))
    } else if e.is_connect() {
        ProviderError::timeout(format!("Connection failed: {e}"))
    } else if e.is_decode() {
        ProviderError::parse(format!("Invalid response body: {e}"))
    } else {
        ProviderError::new(
            ProviderErrorKind::HttpStatus,
            format!("Network error: {e}"),
        )
    }
}

/// Resolves an API key with precedence: config > env.
///
/// # Errors
/// Returns an error if neither the config value nor the env var is set.
pub fn resolve_api_key(
    config_api_key: Option<&str>,
    env_var: &str,
    config_section: &str,
) -> Result<String> {
    if let Some(key) = config_api_key {
        let trimmed = key.trim();
        if !trimmed.is_empty() {
            return Ok(trimmed.to_string());
        }
    }

    let from_env = std::env::var(env_var).context(format!(
        "No API key available. Set {env_var} or api_key in [providers.{config_section}]."
    ))?;
    let trimmed = from_env.trim();
    if trimmed.is_empty() || trimmed == "undefined" || trimmed == "null" {
        anyhow::bail!(
            "No API key available. Set {env_var} or api_key in [providers.{config_section}]."
        );
    }
    Ok(trimmed.to_string())
}

/// Resolves a base URL with precedence: env > config > default.
///
/// # Errors
/// Returns an error if the chosen URL is malformed.
pub fn resolve_base_url(
    config_base_url: Option<&str>,
    env_var: &str,
    default_url: &str,
    provider_name: &str,
) -> Result<String> {
    if let Ok(env_url) = std::env::var(env_var) {
        let trimmed = env_url.trim();
        if !trimmed.is_empty() {
            validate_url(trimmed, provider_name)?;
            return Ok(trimmed.to_string());
        }
    }

    if let Some(config_url) = config_base_url {
        let trimmed = config_url.trim();
        if !trimmed.is_empty() {
            validate_url(trimmed, provider_name)?;
            return Ok(trimmed.to_string());
        }
    }

    Ok(default_url.to_string())
}

fn validate_url(url: &str, provider_name: &str) -> Result<()> {
    url::Url::parse(url).with_context(|| format!("Invalid {provider_name} base URL: {url}"))?;
    Ok(())
}
