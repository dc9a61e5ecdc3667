//! Configuration management for Uncling.
//!
//! Loads configuration from ${UNCLING_HOME}/config.toml with sensible defaults.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::providers::{resolve_api_key, resolve_base_url};

/// Commented template written by `config init`; its values match
/// [`Config::default`].
fn default_config_template() -> &'static str {
    include_str!("../default_config.toml")
}

pub mod paths {
    //! Path resolution for Uncling configuration and data files.
    //!
    //! UNCLING_HOME resolution order:
    //! 1. UNCLING_HOME environment variable (if set)
    //! 2. ~/.config/uncling (default)

    use std::path::PathBuf;

    /// Returns the Uncling home directory.
    pub fn uncling_home() -> PathBuf {
        if let Ok(home) = std::env::var("UNCLING_HOME") {
            return PathBuf::from(home);
        }

        dirs::home_dir().map_or_else(
            || PathBuf::from(".uncling"),
            |h| h.join(".config").join("uncling"),
        )
    }

    /// Returns the path to the config.toml file.
    pub fn config_path() -> PathBuf {
        uncling_home().join("config.toml")
    }

    /// Returns the path to the durable client flags file.
    pub fn flags_path() -> PathBuf {
        uncling_home().join("flags.json")
    }

    /// Returns the path to the cached provider session.
    pub fn session_path() -> PathBuf {
        uncling_home().join("session.json")
    }

    /// Returns the log directory.
    pub fn logs_dir() -> PathBuf {
        uncling_home().join("logs")
    }
}

/// Session gating configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Upper bound for a single identity-provider call, in seconds.
    pub session_timeout_secs: u64,
    /// Origin that OAuth and magic-link redirects return to.
    pub redirect_origin: String,
    /// External sign-in provider (e.g. "google").
    pub oauth_provider: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_timeout_secs: 10,
            redirect_origin: "http://localhost:5173".to_string(),
            oauth_provider: "google".to_string(),
        }
    }
}

/// Hosted identity/persistence backend settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub url: Option<String>,
    pub anon_key: Option<String>,
}

impl BackendConfig {
    /// Resolves the backend URL (env > config).
    ///
    /// # Errors
    /// Returns an error if no URL is configured or the URL is malformed.
    pub fn effective_url(&self) -> Result<String> {
        let url = resolve_base_url(self.url.as_deref(), "UNCLING_BACKEND_URL", "", "backend")?;
        if url.is_empty() {
            anyhow::bail!(
                "No backend configured. Set UNCLING_BACKEND_URL or url in [providers.backend]."
            );
        }
        Ok(url.trim_end_matches('/').to_string())
    }

    /// Resolves the anon key (config > env).
    ///
    /// # Errors
    /// Returns an error if no key is available.
    pub fn effective_anon_key(&self) -> Result<String> {
        resolve_api_key(
            self.anon_key.as_deref(),
            "UNCLING_BACKEND_ANON_KEY",
            "backend",
        )
    }
}

/// Generative text service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeminiSettings {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub model: String,
    pub max_output_tokens: Option<u32>,
}

impl Default for GeminiSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: None,
            model: "gemini-1.5-flash".to_string(),
            max_output_tokens: None,
        }
    }
}

/// External collaborator settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub backend: BackendConfig,
    pub gemini: GeminiSettings,
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub auth: AuthConfig,
    pub providers: ProvidersConfig,
}

impl Config {
    /// Loads configuration from the default config path.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        Self::load_from(&paths::config_path())
    }

    /// Loads configuration from a specific path.
    /// Returns defaults if file doesn't exist.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config from {}", path.display()))
        } else {
            Ok(Config::default())
        }
    }

    /// Creates a default config file at the given path.
    ///
    /// # Errors
    /// Returns an error if the file already exists or cannot be written.
    pub fn init(path: &Path) -> Result<()> {
        if path.exists() {
            anyhow::bail!("Config file already exists at {}", path.display());
        }

        Self::write_config(path, default_config_template())
    }

    /// Sets a single dotted key (e.g. `providers.backend.url`) in the config file.
    ///
    /// Starts from the template when the file doesn't exist yet. Integers and
    /// booleans are written as such; anything else is written as a string.
    ///
    /// # Errors
    /// Returns an error if the key is empty, the result no longer parses as a
    /// valid config, or the file cannot be written.
    pub fn set_value_to(path: &Path, key: &str, raw: &str) -> Result<()> {
        use toml_edit::{DocumentMut, Item, Table, Value};

        let segments: Vec<&str> = key.split('.').map(str::trim).collect();
        let Some((last, parents)) = segments.split_last() else {
            anyhow::bail!("Empty config key");
        };
        if last.is_empty() || parents.iter().any(|s| s.is_empty()) {
            anyhow::bail!("Invalid config key: {key}");
        }

        // Edit the user's own document so their comments and layout survive.
        let contents = if path.exists() {
            fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?
        } else {
            default_config_template().to_string()
        };

        let mut doc: DocumentMut = contents
            .parse()
            .with_context(|| format!("Failed to parse config from {}", path.display()))?;

        let mut table = doc.as_table_mut();
        for segment in parents {
            let item = table
                .entry(segment)
                .or_insert_with(|| Item::Table(Table::new()));
            table = item
                .as_table_mut()
                .with_context(|| format!("Config key {segment} is not a table"))?;
        }

        let value = match raw.parse::<Value>() {
            Ok(v @ (Value::Integer(_) | Value::Boolean(_))) => v,
            _ => Value::from(raw),
        };
        table[*last] = Item::Value(value);

        let updated = doc.to_string();
        toml::from_str::<Config>(&updated)
            .with_context(|| format!("Invalid value for {key}: {raw}"))?;

        Self::write_config(path, &updated)
    }

    /// Returns the identity-provider call timeout. Zero falls back to one second.
    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.auth.session_timeout_secs.max(1))
    }

    /// Stages `content` next to `path` and renames it into place.
    fn write_config(path: &Path, content: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let staged = path.with_extension("toml.tmp");
        fs::write(&staged, content)
            .and_then(|()| fs::rename(&staged, path))
            .with_context(|| format!("Failed to write config to {}", path.display()))
    }
}
