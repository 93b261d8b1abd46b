//! Component and render-mode registry.
//!
//! Registrations are aggregated into an immutable snapshot on first use.
//! Readers share the snapshot; `flush` drops it and the next reader
//! rebuilds, so nobody ever observes a partially populated registry.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use edge_cache::{BlockLocation, FragmentRequest, VaryFlags};
use edge_core::Principal;
use parking_lot::RwLock;

use crate::error::ProviderError;
use crate::render::{esi_template, ssi_remote_template, ssi_template, ESI_MODE, SSI_MODE, SSI_REMOTE_MODE};

/// Output of a provider's render contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedFragment {
    /// Fragment body (HTML).
    pub body: String,
    /// Lifetime; `None` uses the configured default.
    pub ttl: Option<Duration>,
    /// Dimensions the body depends on.
    pub vary: VaryFlags,
}

impl RenderedFragment {
    /// A globally cacheable fragment with the default lifetime.
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            ttl: None,
            vary: VaryFlags::global(),
        }
    }

    /// Set the lifetime.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Set the vary flags.
    pub fn with_vary(mut self, vary: VaryFlags) -> Self {
        self.vary = vary;
        self
    }
}

/// Renders fragments for one component key.
pub trait ComponentProvider: Send + Sync {
    /// Render the fragment identified by `request` for `principal`.
    fn render(
        &self,
        request: &FragmentRequest,
        principal: &Principal,
    ) -> Result<RenderedFragment, ProviderError>;

    /// Render mode preferred for the fragment at `location`, if any.
    fn render_mode(&self, _location: &BlockLocation) -> Option<String> {
        None
    }

    /// Drop any provider-level caches.
    fn flush(&self) {}
}

/// A registered component.
#[derive(Clone)]
pub struct ComponentDescriptor {
    /// Component key (second path segment).
    pub key: String,
    /// Provider handling the key.
    pub provider: Arc<dyn ComponentProvider>,
    /// Who registered it.
    pub source: String,
}

impl ComponentDescriptor {
    pub fn new(
        key: impl Into<String>,
        provider: impl ComponentProvider + 'static,
        source: impl Into<String>,
    ) -> Self {
        Self::shared(key, Arc::new(provider), source)
    }

    pub fn shared(
        key: impl Into<String>,
        provider: Arc<dyn ComponentProvider>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            provider,
            source: source.into(),
        }
    }
}

impl std::fmt::Debug for ComponentDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentDescriptor")
            .field("key", &self.key)
            .field("source", &self.source)
            .finish()
    }
}

/// Turns a fragment URL into an inclusion tag.
pub type TagTemplate = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// A registered render mode.
#[derive(Clone)]
pub struct RenderModeDescriptor {
    /// Mode key (`esi`, `ssi`, ...).
    pub key: String,
    /// Human readable title.
    pub title: String,
    /// Tag template.
    pub template: TagTemplate,
}

impl RenderModeDescriptor {
    pub fn new(
        key: impl Into<String>,
        title: impl Into<String>,
        template: impl Fn(&str) -> String + Send + Sync + 'static,
    ) -> Self {
        Self {
            key: key.into(),
            title: title.into(),
            template: Arc::new(template),
        }
    }

    /// Render the tag for `url`.
    pub fn render(&self, url: &str) -> String {
        (self.template)(url)
    }

    /// Modes available without registration.
    pub fn builtin() -> Vec<Self> {
        vec![
            Self::new(ESI_MODE, "Edge Side Includes", esi_template),
            Self::new(SSI_MODE, "Server Side Includes", ssi_template),
            Self::new(SSI_REMOTE_MODE, "Server Side Includes (remote)", ssi_remote_template),
        ]
    }
}

impl std::fmt::Debug for RenderModeDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderModeDescriptor")
            .field("key", &self.key)
            .field("title", &self.title)
            .finish()
    }
}

/// Aggregated registrations at one point in time.
#[derive(Debug, Clone, Default)]
pub struct RegistrySnapshot {
    epoch: u64,
    components: HashMap<String, ComponentDescriptor>,
    render_modes: BTreeMap<String, RenderModeDescriptor>,
}

impl RegistrySnapshot {
    /// Insert or replace a component.
    pub fn insert_component(&mut self, descriptor: ComponentDescriptor) {
        self.components.insert(descriptor.key.clone(), descriptor);
    }

    /// Remove a component.
    pub fn remove_component(&mut self, key: &str) -> Option<ComponentDescriptor> {
        self.components.remove(key)
    }

    /// Insert or replace a render mode.
    pub fn insert_render_mode(&mut self, descriptor: RenderModeDescriptor) {
        self.render_modes.insert(descriptor.key.clone(), descriptor);
    }

    /// Remove a render mode.
    pub fn remove_render_mode(&mut self, key: &str) -> Option<RenderModeDescriptor> {
        self.render_modes.remove(key)
    }

    pub fn component(&self, key: &str) -> Option<&ComponentDescriptor> {
        self.components.get(key)
    }

    pub fn components(&self) -> impl Iterator<Item = &ComponentDescriptor> {
        self.components.values()
    }

    pub fn render_modes(&self) -> &BTreeMap<String, RenderModeDescriptor> {
        &self.render_modes
    }
}

/// Hook run over the aggregated snapshot before it is published.
pub type AlterHook = Arc<dyn Fn(&mut RegistrySnapshot) + Send + Sync>;

/// Builder for [`ComponentRegistry`].
#[derive(Default)]
pub struct RegistryBuilder {
    components: Vec<ComponentDescriptor>,
    render_modes: Vec<RenderModeDescriptor>,
    alters: Vec<AlterHook>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a component. Later registrations for a key win.
    pub fn component(
        mut self,
        key: impl Into<String>,
        provider: impl ComponentProvider + 'static,
        source: impl Into<String>,
    ) -> Self {
        self.components
            .push(ComponentDescriptor::new(key, provider, source));
        self
    }

    /// Register a prepared descriptor.
    pub fn descriptor(mut self, descriptor: ComponentDescriptor) -> Self {
        self.components.push(descriptor);
        self
    }

    /// Register a render mode.
    pub fn render_mode(mut self, descriptor: RenderModeDescriptor) -> Self {
        self.render_modes.push(descriptor);
        self
    }

    /// Add an alteration hook.
    pub fn alter(mut self, hook: impl Fn(&mut RegistrySnapshot) + Send + Sync + 'static) -> Self {
        self.alters.push(Arc::new(hook));
        self
    }

    pub fn build(self) -> ComponentRegistry {
        ComponentRegistry {
            components: RwLock::new(self.components),
            render_modes: RwLock::new(self.render_modes),
            alters: self.alters,
            snapshot: ArcSwapOption::empty(),
            epoch: AtomicU64::new(0),
        }
    }
}

/// Registry of component providers and render modes.
pub struct ComponentRegistry {
    components: RwLock<Vec<ComponentDescriptor>>,
    render_modes: RwLock<Vec<RenderModeDescriptor>>,
    alters: Vec<AlterHook>,
    snapshot: ArcSwapOption<RegistrySnapshot>,
    epoch: AtomicU64,
}

impl ComponentRegistry {
    /// Registry with no components and the built-in render modes.
    pub fn new() -> Self {
        RegistryBuilder::new().build()
    }

    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Register a component at runtime and invalidate the snapshot.
    pub fn register(&self, descriptor: ComponentDescriptor) {
        tracing::debug!(key = %descriptor.key, source = %descriptor.source, "registering component");
        self.components.write().push(descriptor);
        self.flush();
    }

    /// Register a render mode at runtime and invalidate the snapshot.
    pub fn register_render_mode(&self, descriptor: RenderModeDescriptor) {
        tracing::debug!(key = %descriptor.key, "registering render mode");
        self.render_modes.write().push(descriptor);
        self.flush();
    }

    /// Look up the provider for a component key.
    pub fn resolve(&self, key: &str) -> Option<ComponentDescriptor> {
        self.snapshot().component(key).cloned()
    }

    /// All render modes, keyed by mode key.
    pub fn list_render_modes(&self) -> BTreeMap<String, RenderModeDescriptor> {
        self.snapshot().render_modes().clone()
    }

    /// Look up one render mode.
    pub fn render_mode(&self, key: &str) -> Option<RenderModeDescriptor> {
        self.snapshot().render_modes().get(key).cloned()
    }

    /// Every distinct provider instance, for cache flushing.
    pub fn providers(&self) -> Vec<Arc<dyn ComponentProvider>> {
        let snapshot = self.snapshot();
        let mut providers: Vec<Arc<dyn ComponentProvider>> = Vec::new();
        for descriptor in snapshot.components() {
            if !providers
                .iter()
                .any(|known| Arc::ptr_eq(known, &descriptor.provider))
            {
                providers.push(Arc::clone(&descriptor.provider));
            }
        }
        providers
    }

    /// Current snapshot, rebuilding it if it was flushed.
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        loop {
            let epoch = self.epoch.load(Ordering::Acquire);
            let current = self.snapshot.load();
            if let Some(snapshot) = (*current).as_ref() {
                if snapshot.epoch == epoch {
                    return Arc::clone(snapshot);
                }
            }

            let built = Arc::new(self.build(epoch));
            self.snapshot
                .compare_and_swap(&current, Some(Arc::clone(&built)));

            // A flush during the build means registrations may have changed.
            if self.epoch.load(Ordering::Acquire) == epoch {
                return built;
            }
        }
    }

    /// Drop the snapshot. Idempotent.
    pub fn flush(&self) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
        self.snapshot.store(None);
    }

    fn build(&self, epoch: u64) -> RegistrySnapshot {
        let mut snapshot = RegistrySnapshot {
            epoch,
            ..RegistrySnapshot::default()
        };

        for mode in RenderModeDescriptor::builtin() {
            snapshot.insert_render_mode(mode);
        }
        for mode in self.render_modes.read().iter() {
            snapshot.insert_render_mode(mode.clone());
        }
        for component in self.components.read().iter() {
            if let Some(previous) = snapshot.components.get(&component.key) {
                tracing::debug!(
                    key = %component.key,
                    replaced = %previous.source,
                    source = %component.source,
                    "component registration overridden"
                );
            }
            snapshot.insert_component(component.clone());
        }
        for hook in &self.alters {
            hook(&mut snapshot);
        }

        tracing::info!(
            components = snapshot.components.len(),
            render_modes = snapshot.render_modes.len(),
            "component registry rebuilt"
        );
        snapshot
    }
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentRegistry")
            .field("components", &self.components.read().len())
            .field("render_modes", &self.render_modes.read().len())
            .field("alters", &self.alters.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct Fixed(&'static str);

    impl ComponentProvider for Fixed {
        fn render(
            &self,
            _request: &FragmentRequest,
            _principal: &Principal,
        ) -> Result<RenderedFragment, ProviderError> {
            Ok(RenderedFragment::new(self.0))
        }
    }

    fn render_with(registry: &ComponentRegistry, key: &str) -> String {
        let descriptor = registry.resolve(key).unwrap();
        let request = edge_cache::UrlCodec::default()
            .decode(&format!("esi/{}/t:r:m:d", key))
            .unwrap();
        descriptor
            .provider
            .render(&request, &Principal::anonymous("s"))
            .unwrap()
            .body
    }

    #[test]
    fn test_builtin_render_modes() {
        let registry = ComponentRegistry::new();
        let modes = registry.list_render_modes();
        assert_eq!(
            modes.keys().map(String::as_str).collect::<Vec<_>>(),
            vec!["esi", "ssi", "ssi_remote"]
        );
        assert_eq!(
            registry.render_mode("esi").unwrap().render("/x"),
            r#"<esi:include src="/x" />"#
        );
    }

    #[test]
    fn test_later_registration_wins() {
        let registry = RegistryBuilder::new()
            .component("block", Fixed("first"), "a")
            .component("block", Fixed("second"), "b")
            .build();
        assert_eq!(render_with(&registry, "block"), "second");
        assert_eq!(registry.resolve("block").unwrap().source, "b");
    }

    #[test]
    fn test_runtime_override_visible_after_flush() {
        let registry = RegistryBuilder::new()
            .component("block", Fixed("original"), "core")
            .build();
        assert_eq!(render_with(&registry, "block"), "original");

        registry.register(ComponentDescriptor::new("block", Fixed("override"), "custom"));
        assert_eq!(render_with(&registry, "block"), "override");
        assert!(registry.resolve("missing").is_none());
    }

    #[test]
    fn test_alter_hook_can_remove() {
        let registry = RegistryBuilder::new()
            .component("block", Fixed("x"), "core")
            .component("view", Fixed("y"), "core")
            .alter(|snapshot| {
                snapshot.remove_component("view");
                snapshot.remove_render_mode("ssi_remote");
            })
            .build();
        assert!(registry.resolve("block").is_some());
        assert!(registry.resolve("view").is_none());
        assert!(registry.render_mode("ssi_remote").is_none());
    }

    #[test]
    fn test_snapshot_reused_until_flush() {
        let builds = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&builds);
        let registry = RegistryBuilder::new()
            .alter(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .build();

        let first = registry.snapshot();
        let second = registry.snapshot();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(builds.load(Ordering::SeqCst), 1);

        registry.flush();
        registry.flush();
        let third = registry.snapshot();
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(builds.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_providers_deduplicated() {
        let shared: Arc<dyn ComponentProvider> = Arc::new(Fixed("x"));
        let registry = RegistryBuilder::new()
            .descriptor(ComponentDescriptor::shared("a", Arc::clone(&shared), "core"))
            .descriptor(ComponentDescriptor::shared("b", shared, "core"))
            .component("c", Fixed("y"), "core")
            .build();
        assert_eq!(registry.providers().len(), 2);
    }

    #[test]
    fn test_concurrent_readers_during_flush() {
        let registry = Arc::new(
            RegistryBuilder::new()
                .component("block", Fixed("x"), "core")
                .build(),
        );

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        if i == 0 {
                            registry.flush();
                        }
                        let snapshot = registry.snapshot();
                        assert!(snapshot.component("block").is_some());
                        assert_eq!(snapshot.render_modes().len(), 3);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
    }
}
