//! OAuth callback detection and address cleanup.
//!
//! After a provider redirect the address carries either an authorization
//! code (`?code=...`, PKCE flow), implicit-grant tokens (`#access_token=...`),
//! or an error (`?error=...` / `#error=...`).

use url::Url;
use url::form_urlencoded;

/// Parameters that belong to an OAuth redirect and must not stay visible.
const CALLBACK_PARAMS: &[&str] = &[
    "access_token",
    "refresh_token",
    "expires_in",
    "expires_at",
    "token_type",
    "provider_token",
    "provider_refresh_token",
    "type",
    "code",
    "error",
    "error_code",
    "error_description",
    "state",
];

/// Credentials found in the address after a provider redirect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OAuthCallback {
    /// Authorization code to exchange (PKCE).
    Code { code: String },
    /// Implicit-grant tokens delivered in the fragment.
    Tokens {
        access_token: String,
        refresh_token: Option<String>,
        expires_in: Option<i64>,
        token_type: Option<String>,
    },
    /// The provider reported a failure.
    Error {
        error: String,
        description: Option<String>,
    },
}

impl OAuthCallback {
    /// Detects callback credentials in `url`.
    ///
    /// An error wins over tokens, and tokens win over a code. A `code` is
    /// only honored in the query string.
    pub fn detect(url: &Url) -> Option<Self> {
        let query: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        let fragment: Vec<(String, String)> = url
            .fragment()
            .map(|f| form_urlencoded::parse(f.as_bytes()).into_owned().collect())
            .unwrap_or_default();

        let lookup = |key: &str| {
            fragment
                .iter()
                .chain(query.iter())
                .find(|(k, v)| k == key && !v.is_empty())
                .map(|(_, v)| v.clone())
        };

        if let Some(error) = lookup("error") {
            return Some(OAuthCallback::Error {
                error,
                description: lookup("error_description"),
            });
        }

        if let Some(access_token) = lookup("access_token") {
            return Some(OAuthCallback::Tokens {
                access_token,
                refresh_token: lookup("refresh_token"),
                expires_in: lookup("expires_in").and_then(|v| v.parse().ok()),
                token_type: lookup("token_type"),
            });
        }

        query
            .iter()
            .find(|(k, v)| k == "code" && !v.is_empty())
            .map(|(_, code)| OAuthCallback::Code { code: code.clone() })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            OAuthCallback::Code { .. } => "code",
            OAuthCallback::Tokens { .. } => "tokens",
            OAuthCallback::Error { .. } => "error",
        }
    }
}

/// Returns `url` without OAuth callback parameters.
///
/// Unrelated query and fragment parameters are kept; a query or fragment
/// left empty is removed entirely.
pub fn strip_callback_params(url: &Url) -> Url {
    let mut stripped = url.clone();

    if let Some(query) = url.query() {
        stripped.set_query(filtered(query).as_deref());
    }
    if let Some(fragment) = url.fragment() {
        stripped.set_fragment(filtered(fragment).as_deref());
    }

    stripped
}

/// Filters callback keys out of a `k=v&...` string.
///
/// Returns the input unchanged when it has no callback keys (so plain
/// `#section` fragments survive) and `None` when nothing is left.
fn filtered(raw: &str) -> Option<String> {
    let pairs: Vec<(String, String)> = form_urlencoded::parse(raw.as_bytes())
        .into_owned()
        .collect();
    if !pairs
        .iter()
        .any(|(k, _)| CALLBACK_PARAMS.contains(&k.as_str()))
    {
        return (!raw.is_empty()).then(|| raw.to_string());
    }

    let kept: Vec<&(String, String)> = pairs
        .iter()
        .filter(|(k, _)| !CALLBACK_PARAMS.contains(&k.as_str()))
        .collect();
    if kept.is_empty() {
        return None;
    }

    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (k, v) in kept {
        serializer.append_pair(k, v);
    }
    Some(serializer.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_detects_authorization_code() {
        let cb = OAuthCallback::detect(&url("http://localhost:5173/dashboard?code=abc123"));
        assert_eq!(
            cb,
            Some(OAuthCallback::Code {
                code: "abc123".into()
            })
        );
    }

    #[test]
    fn test_detects_implicit_tokens_in_fragment() {
        let cb = OAuthCallback::detect(&url(
            "http://localhost:5173/#access_token=at&refresh_token=rt&expires_in=3600&token_type=bearer",
        ))
        .unwrap();
        assert_eq!(
            cb,
            OAuthCallback::Tokens {
                access_token: "at".into(),
                refresh_token: Some("rt".into()),
                expires_in: Some(3600),
                token_type: Some("bearer".into()),
            }
        );
    }

    #[test]
    fn test_error_takes_precedence() {
        let cb = OAuthCallback::detect(&url(
            "http://localhost:5173/?code=abc&error=access_denied&error_description=Nope",
        ))
        .unwrap();
        assert_eq!(
            cb,
            OAuthCallback::Error {
                error: "access_denied".into(),
                description: Some("Nope".into()),
            }
        );
    }

    #[test]
    fn test_code_in_fragment_is_ignored() {
        assert_eq!(
            OAuthCallback::detect(&url("http://localhost:5173/#code=abc")),
            None
        );
    }

    #[test]
    fn test_plain_address_has_no_callback() {
        assert_eq!(
            OAuthCallback::detect(&url("http://localhost:5173/dashboard?tab=week#top")),
            None
        );
        assert_eq!(
            OAuthCallback::detect(&url("http://localhost:5173/?code=")),
            None
        );
    }

    #[test]
    fn test_strip_removes_credentials_only() {
        let stripped = strip_callback_params(&url(
            "http://localhost:5173/dashboard?code=abc&state=xyz&tab=week",
        ));
        assert_eq!(stripped.as_str(), "http://localhost:5173/dashboard?tab=week");
    }

    #[test]
    fn test_strip_drops_emptied_fragment() {
        let stripped = strip_callback_params(&url(
            "http://localhost:5173/#access_token=at&refresh_token=rt&type=magiclink",
        ));
        assert_eq!(stripped.as_str(), "http://localhost:5173/");
        assert_eq!(OAuthCallback::detect(&stripped), None);
    }

    #[test]
    fn test_strip_keeps_unrelated_fragment() {
        let stripped = strip_callback_params(&url("http://localhost:5173/settings?code=x#danger-zone"));
        assert_eq!(stripped.as_str(), "http://localhost:5173/settings#danger-zone");
    }
}
