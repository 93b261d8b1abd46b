//! The `block` component.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use edge_cache::{BlockLocation, FragmentRequest, VaryFlags};
use edge_core::Principal;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{ProviderError, SettingsError};
use crate::registry::{ComponentProvider, RenderedFragment};

/// Component key served by [`BlockProvider`].
pub const BLOCK_COMPONENT: &str = "block";

/// Renders blocks. Implemented by the host application.
pub trait BlockSource: Send + Sync {
    /// Render the block at `location`, or `None` if it has no content.
    fn render_block(
        &self,
        location: &BlockLocation,
        page_path: Option<&str>,
        principal: &Principal,
    ) -> Result<Option<String>, ProviderError>;

    /// Drop any cached block output.
    fn flush(&self) {}
}

/// Per-block delivery settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockSettings {
    /// Deliver this block as a fragment.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Lifetime in seconds; `None` uses the global default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u64>,
    /// Render mode override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub render_mode: Option<String>,
    /// Cache granularity of the block's content, independent of the URL.
    #[serde(default)]
    pub vary: VaryFlags,
}

fn default_enabled() -> bool {
    true
}

impl Default for BlockSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl: None,
            render_mode: None,
            vary: VaryFlags::global(),
        }
    }
}

/// Storage for block settings, keyed by `module:delta`.
pub trait BlockSettingsStore: Send + Sync {
    fn load(&self, block_id: &str) -> Result<Option<BlockSettings>, SettingsError>;

    /// Save settings. On failure nothing changes.
    fn save(&self, block_id: &str, settings: BlockSettings) -> Result<(), SettingsError>;
}

/// Durable write step behind [`InMemoryBlockSettings`].
pub trait SettingsSink: Send + Sync {
    fn persist(&self, all: &BTreeMap<String, BlockSettings>) -> Result<(), SettingsError>;
}

/// Writes every block's settings to one JSON file.
#[derive(Debug, Clone)]
pub struct JsonFileSettingsSink {
    path: PathBuf,
}

impl JsonFileSettingsSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read settings previously written to the file.
    pub fn read(&self) -> Result<BTreeMap<String, BlockSettings>, SettingsError> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => serde_json::from_str(&content)
                .map_err(|e| SettingsError::Corrupt(e.to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(SettingsError::PersistenceFailure(e.to_string())),
        }
    }
}

impl SettingsSink for JsonFileSettingsSink {
    fn persist(&self, all: &BTreeMap<String, BlockSettings>) -> Result<(), SettingsError> {
        let content = serde_json::to_string_pretty(all)
            .map_err(|e| SettingsError::PersistenceFailure(e.to_string()))?;
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, content)
            .and_then(|()| std::fs::rename(&tmp, &self.path))
            .map_err(|e| SettingsError::PersistenceFailure(e.to_string()))
    }
}

/// Block settings held in memory, optionally written through a sink.
#[derive(Default)]
pub struct InMemoryBlockSettings {
    settings: RwLock<BTreeMap<String, BlockSettings>>,
    sink: Option<Arc<dyn SettingsSink>>,
}

impl InMemoryBlockSettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write every change through `sink`.
    pub fn with_sink(sink: Arc<dyn SettingsSink>) -> Self {
        Self {
            settings: RwLock::default(),
            sink: Some(sink),
        }
    }

    /// Start from settings loaded elsewhere.
    pub fn with_settings(mut self, settings: BTreeMap<String, BlockSettings>) -> Self {
        self.settings = RwLock::new(settings);
        self
    }

    pub fn snapshot(&self) -> BTreeMap<String, BlockSettings> {
        self.settings.read().clone()
    }
}

impl BlockSettingsStore for InMemoryBlockSettings {
    fn load(&self, block_id: &str) -> Result<Option<BlockSettings>, SettingsError> {
        Ok(self.settings.read().get(block_id).cloned())
    }

    fn save(&self, block_id: &str, settings: BlockSettings) -> Result<(), SettingsError> {
        let mut all = self.settings.write();
        let previous = all.insert(block_id.to_string(), settings);

        let Some(sink) = &self.sink else {
            return Ok(());
        };
        if let Err(err) = sink.persist(&all) {
            match previous {
                Some(previous) => all.insert(block_id.to_string(), previous),
                None => all.remove(block_id),
            };
            tracing::error!(block = %block_id, error = %err, "block settings rolled back");
            return Err(err);
        }
        Ok(())
    }
}

impl std::fmt::Debug for InMemoryBlockSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryBlockSettings")
            .field("blocks", &self.settings.read().len())
            .field("sink", &self.sink.is_some())
            .finish()
    }
}

/// Serves blocks as fragments.
pub struct BlockProvider {
    source: Arc<dyn BlockSource>,
    settings: Arc<dyn BlockSettingsStore>,
}

impl BlockProvider {
    pub fn new(source: Arc<dyn BlockSource>, settings: Arc<dyn BlockSettingsStore>) -> Self {
        Self { source, settings }
    }

    /// Settings for the block at `location`; defaults when none are stored.
    pub fn settings_for(&self, location: &BlockLocation) -> Result<BlockSettings, SettingsError> {
        Ok(self
            .settings
            .load(&location.block_id())?
            .unwrap_or_default())
    }
}

impl ComponentProvider for BlockProvider {
    fn render(
        &self,
        request: &FragmentRequest,
        principal: &Principal,
    ) -> Result<RenderedFragment, ProviderError> {
        let block_id = request.location.block_id();
        let settings = self
            .settings_for(&request.location)
            .map_err(|e| ProviderError::Render(e.to_string()))?;
        if !settings.enabled {
            return Err(ProviderError::Disabled(block_id));
        }

        let page_path = request
            .page_path()
            .map_err(|e| ProviderError::Render(e.to_string()))?;
        let body = self
            .source
            .render_block(&request.location, page_path.as_deref(), principal)?
            .ok_or(ProviderError::NotFound(block_id))?;

        Ok(RenderedFragment {
            body,
            ttl: settings.ttl.map(Duration::from_secs),
            vary: settings.vary.union(request.vary()),
        })
    }

    fn render_mode(&self, location: &BlockLocation) -> Option<String> {
        match self.settings_for(location) {
            Ok(settings) => settings.render_mode,
            Err(err) => {
                tracing::warn!(block = %location.block_id(), error = %err, "block settings unavailable");
                None
            }
        }
    }

    fn flush(&self) {
        self.source.flush();
    }
}

impl std::fmt::Debug for BlockProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockProvider").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edge_cache::UrlCodec;

    struct LoginBlock;

    impl BlockSource for LoginBlock {
        fn render_block(
            &self,
            location: &BlockLocation,
            page_path: Option<&str>,
            principal: &Principal,
        ) -> Result<Option<String>, ProviderError> {
            if location.delta == "empty" {
                return Ok(None);
            }
            Ok(Some(format!(
                "{}@{}:{}",
                location.block_id(),
                page_path.unwrap_or("-"),
                principal.user_id().unwrap_or("anon")
            )))
        }
    }

    struct BrokenSink;

    impl SettingsSink for BrokenSink {
        fn persist(&self, _all: &BTreeMap<String, BlockSettings>) -> Result<(), SettingsError> {
            Err(SettingsError::PersistenceFailure("disk full".into()))
        }
    }

    fn provider(settings: Arc<InMemoryBlockSettings>) -> BlockProvider {
        BlockProvider::new(Arc::new(LoginBlock), settings)
    }

    fn request(path: &str) -> FragmentRequest {
        UrlCodec::default().decode(path).unwrap()
    }

    #[test]
    fn test_renders_with_page_and_scope() {
        let settings = Arc::new(InMemoryBlockSettings::new());
        let rendered = provider(settings)
            .render(
                &request("esi/block/bartik:sidebar:user:login/L25vZGUvNQ/CACHE=ROLE"),
                &Principal::authenticated("7", "s", ["editor"]),
            )
            .unwrap();
        assert_eq!(rendered.body, "user:login@/node/5:7");
        assert_eq!(rendered.ttl, None);
        assert!(rendered.vary.per_page && rendered.vary.per_role);
    }

    #[test]
    fn test_settings_ttl_and_disabled() {
        let settings = Arc::new(InMemoryBlockSettings::new());
        settings
            .save(
                "user:login",
                BlockSettings {
                    ttl: Some(60),
                    ..BlockSettings::default()
                },
            )
            .unwrap();
        let blocks = provider(settings.clone());
        let req = request("esi/block/bartik:sidebar:user:login");
        let rendered = blocks.render(&req, &Principal::anonymous("s")).unwrap();
        assert_eq!(rendered.ttl, Some(Duration::from_secs(60)));

        settings
            .save(
                "user:login",
                BlockSettings {
                    enabled: false,
                    ..BlockSettings::default()
                },
            )
            .unwrap();
        assert!(matches!(
            blocks.render(&req, &Principal::anonymous("s")),
            Err(ProviderError::Disabled(id)) if id == "user:login"
        ));
    }

    #[test]
    fn test_block_scope_survives_stripped_marker() {
        let settings = Arc::new(InMemoryBlockSettings::new());
        settings
            .save(
                "user:account",
                BlockSettings {
                    vary: VaryFlags::per_user(),
                    ..BlockSettings::default()
                },
            )
            .unwrap();
        let blocks = provider(settings);
        let user = Principal::authenticated("7", "s", ["editor"]);

        let stripped = blocks
            .render(&request("esi/block/t:r:user:account"), &user)
            .unwrap();
        assert!(stripped.vary.per_user);

        let marked = blocks
            .render(&request("esi/block/t:r:user:account/CACHE=USER"), &user)
            .unwrap();
        assert_eq!(marked.vary, stripped.vary);
    }

    #[test]
    fn test_render_mode_from_settings() {
        let settings = Arc::new(InMemoryBlockSettings::new());
        settings
            .save(
                "user:login",
                BlockSettings {
                    render_mode: Some("ssi".into()),
                    ..BlockSettings::default()
                },
            )
            .unwrap();
        let blocks = provider(settings);

        let location = BlockLocation::new("bartik", "sidebar", "user", "login");
        assert_eq!(blocks.render_mode(&location).as_deref(), Some("ssi"));
        let other = BlockLocation::new("bartik", "sidebar", "user", "new");
        assert_eq!(blocks.render_mode(&other), None);
    }

    #[test]
    fn test_empty_block_not_found() {
        let blocks = provider(Arc::new(InMemoryBlockSettings::new()));
        assert!(matches!(
            blocks.render(&request("esi/block/t:r:m:empty"), &Principal::anonymous("s")),
            Err(ProviderError::NotFound(_))
        ));
    }

    #[test]
    fn test_failed_persist_rolls_back() {
        let settings = InMemoryBlockSettings::with_sink(Arc::new(BrokenSink)).with_settings(
            BTreeMap::from([("user:login".to_string(), BlockSettings::default())]),
        );

        let disabled = BlockSettings {
            enabled: false,
            ..BlockSettings::default()
        };
        assert!(matches!(
            settings.save("user:login", disabled.clone()),
            Err(SettingsError::PersistenceFailure(_))
        ));
        assert_eq!(
            settings.load("user:login").unwrap(),
            Some(BlockSettings::default())
        );

        assert!(settings.save("new:block", disabled).is_err());
        assert_eq!(settings.load("new:block").unwrap(), None);
    }

    #[test]
    fn test_json_sink_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let sink = Arc::new(JsonFileSettingsSink::new(dir.path().join("blocks.json")));
        assert!(sink.read().unwrap().is_empty());

        let settings = InMemoryBlockSettings::with_sink(sink.clone());
        let custom = BlockSettings {
            enabled: true,
            ttl: Some(30),
            render_mode: Some("ssi".into()),
            vary: VaryFlags::per_user(),
        };
        settings.save("user:login", custom.clone()).unwrap();

        let reloaded = sink.read().unwrap();
        assert_eq!(reloaded.get("user:login"), Some(&custom));
    }
}
