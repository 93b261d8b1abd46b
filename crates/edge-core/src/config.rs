//! Fragment delivery configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the config file.
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse TOML.
    #[error("failed to parse TOML config: {0}")]
    Toml(#[from] toml::de::Error),

    /// Failed to parse JSON.
    #[error("failed to parse JSON config: {0}")]
    Json(#[from] serde_json::Error),

    /// A value is out of range or inconsistent.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level fragment delivery configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EsiConfig {
    /// Global render mode key (`esi`, `ssi`, `ssi_remote`, or an extension).
    #[serde(default = "default_render_mode")]
    pub render_mode: String,

    /// Default fragment TTL in seconds. 0 disables caching.
    #[serde(default = "default_ttl")]
    pub default_ttl: u64,

    /// Wrap inclusion tags so a client-side interpreter can fetch them.
    #[serde(default)]
    pub ajax_fallback: bool,

    /// Add the originating page to AJAX fallback URLs.
    #[serde(default)]
    pub ajax_fallback_contextualize: bool,

    /// Emit absolute fragment URLs (requires `base_url`).
    #[serde(default)]
    pub absolute_urls: bool,

    /// Base URL used when `absolute_urls` is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// First path segment of fragment URLs.
    #[serde(default = "default_url_prefix")]
    pub url_prefix: String,

    /// Seed rotation interval in seconds.
    #[serde(default = "default_rotation_interval")]
    pub seed_rotation_interval: u64,

    /// Context cookie settings.
    #[serde(default)]
    pub cookie: CookieSettings,
}

fn default_render_mode() -> String {
    "esi".to_string()
}

fn default_ttl() -> u64 {
    300
}

fn default_url_prefix() -> String {
    "esi".to_string()
}

fn default_rotation_interval() -> u64 {
    24 * 60 * 60
}

impl Default for EsiConfig {
    fn default() -> Self {
        Self {
            render_mode: default_render_mode(),
            default_ttl: default_ttl(),
            ajax_fallback: false,
            ajax_fallback_contextualize: false,
            absolute_urls: false,
            base_url: None,
            url_prefix: default_url_prefix(),
            seed_rotation_interval: default_rotation_interval(),
            cookie: CookieSettings::default(),
        }
    }
}

impl EsiConfig {
    /// Load config from a file. Files ending in `.json` are parsed as JSON,
    /// everything else as TOML.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;

        let config: Self = if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_str(&content)?
        } else {
            toml::from_str(&content)?
        };

        config.validate()?;
        Ok(config)
    }

    /// Parse config from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the config for inconsistent values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.render_mode.trim().is_empty() {
            return Err(ConfigError::Invalid("render_mode must not be empty".into()));
        }
        if self.url_prefix.is_empty() || self.url_prefix.contains('/') {
            return Err(ConfigError::Invalid(
                "url_prefix must be a single non-empty path segment".into(),
            ));
        }
        if self.seed_rotation_interval == 0 {
            return Err(ConfigError::Invalid(
                "seed_rotation_interval must be greater than zero".into(),
            ));
        }
        if self.absolute_urls && self.base_url.as_deref().map_or(true, str::is_empty) {
            return Err(ConfigError::Invalid(
                "absolute_urls requires base_url".into(),
            ));
        }
        self.cookie.validate()
    }
}

/// Session-cookie baseline and naming for context cookies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CookieSettings {
    /// Prefix for every context cookie name.
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// Append a session-scoped suffix to cookie names.
    #[serde(default)]
    pub hardening: bool,

    /// Cookie path.
    #[serde(default = "default_path")]
    pub path: String,

    /// Cookie domain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,

    /// Send only over HTTPS.
    #[serde(default)]
    pub secure: bool,

    /// Hide from client-side scripts.
    #[serde(default = "default_true")]
    pub http_only: bool,

    /// Cookie lifetime in seconds. 0 issues session cookies.
    #[serde(default)]
    pub lifetime: u64,
}

fn default_prefix() -> String {
    "ESI_".to_string()
}

fn default_path() -> String {
    "/".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for CookieSettings {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            hardening: false,
            path: default_path(),
            domain: None,
            secure: false,
            http_only: true,
            lifetime: 0,
        }
    }
}

/// Longest cookie lifetime browsers honour (400 days).
pub const MAX_COOKIE_LIFETIME: u64 = 400 * 24 * 60 * 60;

impl CookieSettings {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.prefix.is_empty() {
            return Err(ConfigError::Invalid("cookie prefix must not be empty".into()));
        }
        let bad = |c: char| c.is_whitespace() || matches!(c, ';' | ',' | '=' | '"');
        if self.prefix.chars().any(bad) {
            return Err(ConfigError::Invalid(format!(
                "cookie prefix contains reserved characters: {:?}",
                self.prefix
            )));
        }
        if self.lifetime > MAX_COOKIE_LIFETIME {
            return Err(ConfigError::Invalid(format!(
                "cookie lifetime must be at most {} seconds",
                MAX_COOKIE_LIFETIME
            )));
        }
        Ok(())
    }
}
