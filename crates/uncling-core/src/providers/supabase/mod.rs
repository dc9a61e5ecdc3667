//! Hosted backend: GoTrue auth (`/auth/v1`) and PostgREST tables (`/rest/v1`).

use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;
use url::Url;

use super::{ProviderError, USER_AGENT, classify_reqwest_error};
use crate::config::BackendConfig;

pub mod auth;
pub mod rest;

pub use auth::{SessionCache, SupabaseAuth};
pub use rest::SupabaseRest;

/// PostgREST media type for "exactly one row".
pub(crate) const SINGLE_OBJECT: &str = "application/vnd.pgrst.object+json";

/// Shared HTTP plumbing for both APIs.
#[derive(Debug, Clone)]
pub struct SupabaseClient {
    base: Url,
    anon_key: String,
    http: reqwest::Client,
}

impl SupabaseClient {
    /// # Errors
    /// Returns an error if `base_url` is not a valid URL.
    pub fn new(base_url: &str, anon_key: impl Into<String>) -> Result<Self> {
        let base = Url::parse(&format!("{}/", base_url.trim_end_matches('/')))
            .with_context(|| format!("Invalid backend URL: {base_url}"))?;
        Ok(Self {
            base,
            anon_key: anon_key.into(),
            http: reqwest::Client::new(),
        })
    }

    /// # Errors
    /// Returns an error if the backend URL or anon key is missing.
    pub fn from_config(config: &BackendConfig) -> Result<Self> {
        Self::new(&config.effective_url()?, config.effective_anon_key()?)
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Absolute URL for `path` (relative to the backend root) with `params`.
    pub(crate) fn endpoint(&self, path: &str, params: &[(&str, &str)]) -> Result<Url, ProviderError> {
        let mut url = self
            .base
            .join(path)
            .map_err(|e| ProviderError::parse(format!("Invalid endpoint {path}: {e}")))?;
        if !params.is_empty() {
            url.query_pairs_mut().extend_pairs(params);
        }
        Ok(url)
    }

    /// `apikey` plus a bearer token (the anon key when signed out).
    pub(crate) fn headers(&self, bearer: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            "apikey",
            HeaderValue::from_str(&self.anon_key).unwrap_or_else(|_| HeaderValue::from_static("")),
        );
        let token = bearer.unwrap_or(&self.anon_key);
        headers.insert(
            "authorization",
            HeaderValue::from_str(&format!("Bearer {token}"))
                .unwrap_or_else(|_| HeaderValue::from_static("")),
        );
        headers.insert("accept", HeaderValue::from_static("application/json"));
        headers.insert("user-agent", HeaderValue::from_static(USER_AGENT));
        headers
    }
}

/// Sends a request and fails on non-2xx statuses.
pub(crate) async fn send(request: reqwest::RequestBuilder) -> Result<reqwest::Response, ProviderError> {
    let response = request
        .send()
        .await
        .map_err(|e| classify_reqwest_error(&e))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ProviderError::http_status(status.as_u16(), &body));
    }
    Ok(response)
}

/// Sends a request and decodes a JSON body.
pub(crate) async fn send_json<T: DeserializeOwned>(
    request: reqwest::RequestBuilder,
) -> Result<T, ProviderError> {
    let response = send(request).await?;
    let body = response
        .text()
        .await
        .map_err(|e| classify_reqwest_error(&e))?;
    serde_json::from_str(&body).map_err(|e| ProviderError::parse(format!("Invalid response JSON: {e}")))
}
