//! CLI execution context.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context as _, Result};
use edge_cache::UrlCodec;
use edge_components::{ComponentRegistry, EmbedOptions, TagRenderer};
use edge_security::{ContextProviders, CookieManager, JsonFileSeedBackend, SeedStore};

use crate::config::CliConfig;
use crate::output::Output;

const CONFIG_NAMES: [&str; 3] = ["edge.toml", ".edge.toml", "edge.json"];

/// Execution context for CLI commands.
pub struct Context {
    /// CLI configuration.
    pub config: CliConfig,
    /// File the config was loaded from, if any.
    pub config_path: Option<PathBuf>,
    /// Output handler.
    pub output: Output,
    /// Working directory.
    pub cwd: PathBuf,
}

impl Context {
    /// Load context from config file.
    pub fn load(config_path: Option<&str>, output: Output) -> Result<Self> {
        let cwd = std::env::current_dir().context("Failed to get current directory")?;

        let config_path = match config_path {
            Some(path) => Some(PathBuf::from(path)),
            None => find_config(&cwd),
        };
        let config = match &config_path {
            Some(path) => {
                output.debug(&format!("Using config {}", path.display()));
                CliConfig::load(path)?
            }
            None => CliConfig::default(),
        };

        Ok(Self {
            config,
            config_path,
            output,
            cwd,
        })
    }

    /// Codec for the configured URL prefix.
    pub fn codec(&self) -> UrlCodec {
        UrlCodec::new(self.config.esi.url_prefix.clone())
    }

    /// Tag renderer with the built-in render modes.
    pub fn tag_renderer(&self) -> TagRenderer {
        TagRenderer::new(
            Arc::new(ComponentRegistry::new()),
            self.codec(),
            EmbedOptions::from_config(&self.config.esi),
        )
    }

    /// Seed store over the configured seed file.
    pub fn seed_store(&self) -> Result<Arc<SeedStore>> {
        let path = self.resolve_path(&self.config.state.seed_file);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        Ok(Arc::new(SeedStore::new(
            Arc::new(JsonFileSeedBackend::new(path)),
            self.config.esi.seed_rotation_interval,
        )))
    }

    /// Cookie manager with the default context providers.
    pub fn cookie_manager(&self) -> Result<CookieManager> {
        Ok(CookieManager::new(
            self.seed_store()?,
            Arc::new(ContextProviders::with_defaults()),
            self.config.esi.cookie.clone(),
        ))
    }

    /// Resolve a path relative to the working directory.
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.cwd.join(path)
        }
    }
}

/// Find a config file in the directory tree.
fn find_config(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();
    loop {
        for name in CONFIG_NAMES {
            let candidate = current.join(name);
            if candidate.is_file() {
                return Some(candidate);
            }
        }

        if !current.pop() {
            return None;
        }
    }
}
