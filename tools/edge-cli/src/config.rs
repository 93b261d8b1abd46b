//! CLI configuration.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use edge_core::EsiConfig;
use serde::{Deserialize, Serialize};

/// CLI configuration file: the runtime settings plus local state paths.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CliConfig {
    /// Fragment delivery settings.
    #[serde(flatten)]
    pub esi: EsiConfig,

    /// Local state.
    #[serde(default)]
    pub state: StateConfig,
}

impl CliConfig {
    /// Load config from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display()))?
        } else {
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse TOML config: {}", path.display()))?
        };

        config
            .esi
            .validate()
            .with_context(|| format!("Invalid config: {}", path.display()))?;
        Ok(config)
    }
}

/// Paths of locally persisted state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateConfig {
    /// Seed file, relative to the working directory.
    #[serde(default = "default_seed_file")]
    pub seed_file: PathBuf,
}

fn default_seed_file() -> PathBuf {
    PathBuf::from(".edge").join("seed.json")
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            seed_file: default_seed_file(),
        }
    }
}

/// Generate a default config file.
pub fn generate_default_config() -> String {
    r#"# Edge fragment delivery configuration

# Inclusion tag syntax: esi, ssi or ssi_remote
render_mode = "esi"

# Fragment TTL in seconds (0 disables caching)
default_ttl = 300

# First path segment of fragment URLs
url_prefix = "esi"

# Client-side fallback for pages not processed by an edge
ajax_fallback = false
ajax_fallback_contextualize = false

# absolute_urls = true
# base_url = "https://www.example.com"

# Seed rotation interval in seconds
seed_rotation_interval = 86400

[cookie]
prefix = "ESI_"
hardening = false
path = "/"
# domain = ".example.com"
secure = false
http_only = true
# Lifetime in seconds (0 = session cookie)
lifetime = 0

[state]
seed_file = ".edge/seed.json"
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_parses() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("edge.toml");
        std::fs::write(&path, generate_default_config()).unwrap();

        let config = CliConfig::load(&path).unwrap();
        assert_eq!(config.esi.render_mode, "esi");
        assert_eq!(config.esi.cookie.prefix, "ESI_");
        assert_eq!(config.state.seed_file, PathBuf::from(".edge/seed.json"));
    }

    #[test]
    fn test_json_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("edge.json");
        std::fs::write(
            &path,
            r#"{"render_mode": "ssi", "cookie": {"hardening": true}}"#,
        )
        .unwrap();

        let config = CliConfig::load(&path).unwrap();
        assert_eq!(config.esi.render_mode, "ssi");
        assert!(config.esi.cookie.hardening);
        assert_eq!(config.esi.default_ttl, 300);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("edge.toml");
        std::fs::write(&path, "absolute_urls = true\n").unwrap();
        assert!(CliConfig::load(&path).is_err());
    }
}
