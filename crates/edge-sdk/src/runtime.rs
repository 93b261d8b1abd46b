//! Configured fragment runtime.

use std::sync::Arc;
use std::time::Duration;

use edge_cache::{BlockLocation, CodecError, FragmentStore, UrlCodec, UrlFilter, VaryFlags};
use edge_components::{
    ComponentDescriptor, ComponentProvider, ComponentRegistry, EdgeInvalidator, EmbedOptions,
    FlushReport, FragmentDispatcher, FragmentResponse, RegistryBuilder, RegistrySnapshot,
    RenderModeDescriptor, TagRenderer,
};
use edge_core::{ConfigError, EsiConfig, Principal};
use edge_security::{
    Clock, ContextProvider, ContextProviders, CookieDescriptor, CookieError, CookieManager,
    InMemorySeedBackend, SeedBackend, SeedError, SeedStore, SystemClock,
};

/// Runtime construction errors.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Builder for [`FragmentRuntime`].
pub struct FragmentRuntimeBuilder {
    config: EsiConfig,
    codec: UrlCodec,
    registry: RegistryBuilder,
    context: ContextProviders,
    seed_backend: Option<Arc<dyn SeedBackend>>,
    clock: Option<Arc<dyn Clock>>,
    store: Option<Arc<dyn FragmentStore>>,
    invalidator: Option<Arc<dyn EdgeInvalidator>>,
    debug_headers: bool,
}

impl FragmentRuntimeBuilder {
    fn new(config: EsiConfig) -> Self {
        Self {
            codec: UrlCodec::new(config.url_prefix.clone()),
            config,
            registry: RegistryBuilder::new(),
            context: ContextProviders::with_defaults(),
            seed_backend: None,
            clock: None,
            store: None,
            invalidator: None,
            debug_headers: false,
        }
    }

    /// Register a component provider.
    pub fn component(
        mut self,
        key: impl Into<String>,
        provider: impl ComponentProvider + 'static,
        source: impl Into<String>,
    ) -> Self {
        self.registry = self.registry.component(key, provider, source);
        self
    }

    pub fn descriptor(mut self, descriptor: ComponentDescriptor) -> Self {
        self.registry = self.registry.descriptor(descriptor);
        self
    }

    pub fn render_mode(mut self, descriptor: RenderModeDescriptor) -> Self {
        self.registry = self.registry.render_mode(descriptor);
        self
    }

    /// Alter the aggregated registry before it is published.
    pub fn alter(mut self, hook: impl Fn(&mut RegistrySnapshot) + Send + Sync + 'static) -> Self {
        self.registry = self.registry.alter(hook);
        self
    }

    /// Add a context provider after the defaults.
    pub fn context_provider(mut self, provider: impl ContextProvider + 'static) -> Self {
        self.context = self.context.with(provider);
        self
    }

    /// Append a fragment URL post-processor.
    pub fn url_filter(mut self, filter: impl UrlFilter + 'static) -> Self {
        self.codec = self.codec.with_filter(filter);
        self
    }

    /// Persist the seed somewhere other than memory.
    pub fn seed_backend(mut self, backend: Arc<dyn SeedBackend>) -> Self {
        self.seed_backend = Some(backend);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Cache rendered fragments server-side.
    pub fn fragment_store(mut self, store: Arc<dyn FragmentStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn edge_invalidator(mut self, invalidator: Arc<dyn EdgeInvalidator>) -> Self {
        self.invalidator = Some(invalidator);
        self
    }

    pub fn debug_headers(mut self, enabled: bool) -> Self {
        self.debug_headers = enabled;
        self
    }

    pub fn build(self) -> Result<FragmentRuntime, RuntimeError> {
        self.config.validate()?;

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let backend = self
            .seed_backend
            .unwrap_or_else(|| Arc::new(InMemorySeedBackend::new()));
        let seeds = Arc::new(SeedStore::with_clock(
            backend,
            self.config.seed_rotation_interval,
            Arc::clone(&clock),
        ));
        let cookies = CookieManager::new(
            Arc::clone(&seeds),
            Arc::new(self.context),
            self.config.cookie.clone(),
        );

        let registry = Arc::new(self.registry.build());
        let mut dispatcher = FragmentDispatcher::new(
            Arc::clone(&registry),
            self.codec.clone(),
            Duration::from_secs(self.config.default_ttl),
        )
        .with_clock(clock)
        .with_debug_headers(self.debug_headers);
        if let Some(store) = self.store {
            dispatcher = dispatcher.with_store(store);
        }
        if let Some(invalidator) = self.invalidator {
            dispatcher = dispatcher.with_invalidator(invalidator);
        }

        let tags = TagRenderer::new(
            Arc::clone(&registry),
            self.codec,
            EmbedOptions::from_config(&self.config),
        );

        tracing::info!(
            prefix = %self.config.url_prefix,
            render_mode = %self.config.render_mode,
            "fragment runtime ready"
        );

        Ok(FragmentRuntime {
            config: self.config,
            seeds,
            cookies,
            registry,
            dispatcher,
            tags,
        })
    }
}

/// Seed store, cookie manager, registry, dispatcher and tag renderer sharing
/// one configuration.
#[derive(Debug)]
pub struct FragmentRuntime {
    config: EsiConfig,
    seeds: Arc<SeedStore>,
    cookies: CookieManager,
    registry: Arc<ComponentRegistry>,
    dispatcher: FragmentDispatcher,
    tags: TagRenderer,
}

impl FragmentRuntime {
    pub fn builder(config: EsiConfig) -> FragmentRuntimeBuilder {
        FragmentRuntimeBuilder::new(config)
    }

    pub fn config(&self) -> &EsiConfig {
        &self.config
    }

    pub fn seeds(&self) -> &Arc<SeedStore> {
        &self.seeds
    }

    pub fn cookies(&self) -> &CookieManager {
        &self.cookies
    }

    pub fn registry(&self) -> &Arc<ComponentRegistry> {
        &self.registry
    }

    pub fn dispatcher(&self) -> &FragmentDispatcher {
        &self.dispatcher
    }

    pub fn tags(&self) -> &TagRenderer {
        &self.tags
    }

    /// Serve a fragment request.
    pub fn dispatch(&self, raw_path: &str, principal: &Principal) -> FragmentResponse {
        self.dispatcher.dispatch(raw_path, principal)
    }

    /// Inclusion markup for a fragment on the page at `page_path`.
    pub fn embed(
        &self,
        component_key: &str,
        location: &BlockLocation,
        vary: VaryFlags,
        page_path: Option<&str>,
        mode: Option<&str>,
    ) -> Result<String, CodecError> {
        self.tags
            .embed(component_key, location, vary, page_path, mode)
    }

    /// Cookies to set after login or a context change.
    pub fn issue_cookies(&self, principal: &Principal) -> Result<Vec<CookieDescriptor>, CookieError> {
        self.cookies.issue_cookies(principal)
    }

    /// Cookies to clear on logout.
    pub fn revoke_cookies(&self, principal: &Principal) -> Vec<CookieDescriptor> {
        self.cookies.revoke_cookies(principal)
    }

    /// Periodic maintenance: rotate the seed once it is due.
    pub fn run_maintenance(&self) -> Result<bool, SeedError> {
        let rotated = self.seeds.rotate_if_due()?;
        if rotated {
            tracing::info!("seed rotated by maintenance");
        }
        Ok(rotated)
    }

    /// Administrative flush of every fragment cache.
    pub fn flush(&self) -> FlushReport {
        self.dispatcher.flush()
    }
}
