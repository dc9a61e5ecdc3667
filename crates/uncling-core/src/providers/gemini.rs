//! Gemini text generation (Generative Language API, `generateContent`).

use std::future::Future;

use anyhow::Result;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::{
    ProviderError, USER_AGENT, classify_reqwest_error, resolve_api_key, resolve_base_url,
};
use crate::config::GeminiSettings;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Speaker of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Model,
}

/// One conversation turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: TurnRole,
    pub text: String,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            text: text.into(),
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Model,
            text: text.into(),
        }
    }
}

/// Text-generation service.
pub trait TextGenerator: Send + Sync {
    /// Generates the next model reply for an ordered conversation.
    fn generate(&self, turns: &[Turn])
    -> impl Future<Output = Result<String, ProviderError>> + Send;
}

/// Gemini API configuration.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    /// `None` disables generation; features fall back to fixed replies.
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub max_output_tokens: Option<u32>,
}

impl GeminiConfig {
    /// Builds the client config from settings.
    ///
    /// Key resolution: config `api_key`, then `GEMINI_API_KEY`. A missing key
    /// is not an error here.
    ///
    /// # Errors
    /// Returns an error if the base URL is malformed.
    pub fn from_settings(settings: &GeminiSettings) -> Result<Self> {
        let api_key = match resolve_api_key(settings.api_key.as_deref(), "GEMINI_API_KEY", "gemini")
        {
            Ok(key) => Some(key),
            Err(e) => {
                tracing::warn!("{e}");
                None
            }
        };
        let base_url = resolve_base_url(
            settings.base_url.as_deref(),
            "GEMINI_BASE_URL",
            DEFAULT_BASE_URL,
            "Gemini",
        )?;

        Ok(Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            max_output_tokens: settings.max_output_tokens,
        })
    }
}

/// Gemini client.
pub struct GeminiClient {
    config: GeminiConfig,
    http: reqwest::Client,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.config.api_key.is_some()
    }
}

impl TextGenerator for GeminiClient {
    async fn generate(&self, turns: &[Turn]) -> Result<String, ProviderError> {
        let Some(api_key) = self.config.api_key.as_deref() else {
            return Err(ProviderError::api_error(
                "missing_api_key",
                "Gemini API key is not configured",
            ));
        };

        let request = build_request(turns, self.config.max_output_tokens);
        let url = format!(
            "{}/models/{}:generateContent",
            self.config.base_url, self.config.model
        );

        let response = self
            .http
            .post(url)
            .headers(build_headers(api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(ProviderError::http_status(status.as_u16(), &body));
        }

        let value: Value = serde_json::from_str(&body)
            .map_err(|e| ProviderError::parse(format!("Invalid Gemini response JSON: {e}")))?;
        extract_text(&value)
            .ok_or_else(|| ProviderError::parse("Gemini response has no candidate text"))
    }
}

fn build_request(turns: &[Turn], max_output_tokens: Option<u32>) -> Value {
    let contents: Vec<Value> = turns
        .iter()
        .map(|turn| {
            json!({
                "role": turn.role,
                "parts": [{ "text": turn.text }],
            })
        })
        .collect();

    let mut request = json!({ "contents": contents });
    if let Some(max) = max_output_tokens {
        request["generationConfig"] = json!({ "maxOutputTokens": max });
    }
    request
}

/// Joins the text parts of the first candidate.
fn extract_text(value: &Value) -> Option<String> {
    let parts = value
        .get("candidates")?
        .as_array()?
        .first()?
        .get("content")?
        .get("parts")?
        .as_array()?;

    let text: String = parts
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect();
    (!text.trim().is_empty()).then_some(text)
}

fn build_headers(api_key: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        "x-goog-api-key",
        HeaderValue::from_str(api_key).unwrap_or_else(|_| HeaderValue::from_static("")),
    );
    headers.insert("accept", HeaderValue::from_static("application/json"));
    headers.insert("content-type", HeaderValue::from_static("application/json"));
    headers.insert("user-agent", HeaderValue::from_static(USER_AGENT));
    headers
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::providers::ProviderErrorKind;

    fn client(server: &MockServer, api_key: Option<&str>) -> GeminiClient {
        GeminiClient::new(GeminiConfig {
            api_key: api_key.map(str::to_string),
            base_url: server.uri(),
            model: "gemini-1.5-flash".into(),
            max_output_tokens: Some(250),
        })
    }

    #[test]
    fn test_build_request_keeps_turn_order_and_roles() {
        let request = build_request(&[Turn::model("hi"), Turn::user("help")], None);
        assert_eq!(request["contents"][0]["role"], "model");
        assert_eq!(request["contents"][1]["parts"][0]["text"], "help");
        assert!(request.get("generationConfig").is_none());
    }

    #[test]
    fn test_extract_text_joins_parts() {
        let value = json!({
            "candidates": [{ "content": { "parts": [{ "text": "Hello " }, { "text": "there" }] } }]
        });
        assert_eq!(extract_text(&value).as_deref(), Some("Hello there"));
        assert_eq!(extract_text(&json!({ "candidates": [] })), None);
    }

    #[tokio::test]
    async fn test_generate_posts_contents_with_api_key_header() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-1.5-flash:generateContent"))
            .and(header("x-goog-api-key", "test-key"))
            .and(body_partial_json(json!({
                "contents": [{ "role": "user", "parts": [{ "text": "I feel low" }] }],
                "generationConfig": { "maxOutputTokens": 250 }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{ "content": { "parts": [{ "text": "I'm with you." }] } }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let text = client(&server, Some("test-key"))
            .generate(&[Turn::user("I feel low")])
            .await
            .unwrap();
        assert_eq!(text, "I'm with you.");
    }

    #[tokio::test]
    async fn test_generate_maps_http_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(403)
                    .set_body_json(json!({ "error": { "message": "API key not valid" } })),
            )
            .mount(&server)
            .await;

        let err = client(&server, Some("bad"))
            .generate(&[Turn::user("hi")])
            .await
            .unwrap_err();
        assert_eq!(err.kind, ProviderErrorKind::HttpStatus);
        assert_eq!(err.message, "HTTP 403: API key not valid");
    }

    #[tokio::test]
    async fn test_missing_key_never_calls_the_api() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let err = client(&server, None)
            .generate(&[Turn::user("hi")])
            .await
            .unwrap_err();
        assert_eq!(err.kind, ProviderErrorKind::ApiError);
    }
}
