//! Fragment request dispatch.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use edge_cache::{
    fragment_cache_key, generate_etag, header_names, CacheHeadersBuilder, CacheResult, CacheScope,
    CacheStatus, CachedFragment, FragmentCachePolicy, FragmentRequest, FragmentStore, UrlCodec,
    FRAGMENT_CACHE_PREFIX,
};
use edge_core::{Principal, RequestId};
use edge_observability::fragment_span;
use edge_security::{sha256_hex, Clock, SystemClock};
use http::StatusCode;

use crate::error::DispatchError;
use crate::registry::{ComponentRegistry, RenderedFragment};

const CONTENT_TYPE_HTML: &str = "text/html; charset=utf-8";

/// A bare fragment response: no page chrome, just the rendered body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentResponse {
    pub status: StatusCode,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl FragmentResponse {
    /// Empty, uncacheable response.
    pub fn minimal(status: StatusCode) -> Self {
        Self {
            status,
            headers: CacheHeadersBuilder::new()
                .from_policy(&FragmentCachePolicy::no_store())
                .build(),
            body: String::new(),
        }
    }

    /// First header value named `name` (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Receives namespace purges when the dispatcher is flushed.
pub trait EdgeInvalidator: Send + Sync {
    /// Purge every edge entry whose URL starts with `namespace`.
    fn purge(&self, namespace: &str) -> CacheResult<()>;
}

/// Outcome of a flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Providers whose `flush` ran.
    pub providers: usize,
    /// Fragment cache entries removed.
    pub entries_cleared: u64,
    /// Whether the edge invalidator accepted the purge.
    pub edge_purged: bool,
}

/// Decodes fragment paths and renders them through the registry.
pub struct FragmentDispatcher {
    registry: Arc<ComponentRegistry>,
    codec: UrlCodec,
    default_ttl: Duration,
    store: Option<Arc<dyn FragmentStore>>,
    invalidator: Option<Arc<dyn EdgeInvalidator>>,
    clock: Arc<dyn Clock>,
    debug_headers: bool,
}

impl FragmentDispatcher {
    pub fn new(registry: Arc<ComponentRegistry>, codec: UrlCodec, default_ttl: Duration) -> Self {
        Self {
            registry,
            codec,
            default_ttl,
            store: None,
            invalidator: None,
            clock: Arc::new(SystemClock),
            debug_headers: false,
        }
    }

    /// Cache rendered fragments server-side.
    pub fn with_store(mut self, store: Arc<dyn FragmentStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Notify an edge cache on flush.
    pub fn with_invalidator(mut self, invalidator: Arc<dyn EdgeInvalidator>) -> Self {
        self.invalidator = Some(invalidator);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Emit `X-Cache-Status`, `X-Cache-TTL` and `X-Request-ID`.
    pub fn with_debug_headers(mut self, enabled: bool) -> Self {
        self.debug_headers = enabled;
        self
    }

    pub fn registry(&self) -> &Arc<ComponentRegistry> {
        &self.registry
    }

    pub fn codec(&self) -> &UrlCodec {
        &self.codec
    }

    /// Serve one fragment path. Failures become minimal fragments.
    pub fn dispatch(&self, raw_path: &str, principal: &Principal) -> FragmentResponse {
        let request_id = RequestId::generate();
        let span = fragment_span(&request_id, raw_path);
        let _enter = span.enter();

        match self.try_dispatch(raw_path, principal, &request_id) {
            Ok(response) => response,
            Err(err) => {
                let status = err.status();
                if status.is_server_error() {
                    tracing::error!(error = %err, "fragment render failed");
                } else {
                    tracing::debug!(error = %err, "fragment not served");
                }
                FragmentResponse::minimal(status)
            }
        }
    }

    /// Serve one fragment path, surfacing the failure kind.
    pub fn try_dispatch(
        &self,
        raw_path: &str,
        principal: &Principal,
        request_id: &RequestId,
    ) -> Result<FragmentResponse, DispatchError> {
        let request = self.codec.decode(raw_path)?;
        let descriptor = self
            .registry
            .resolve(&request.component_key)
            .ok_or_else(|| DispatchError::UnknownComponent(request.component_key.clone()))?;

        let path = self.codec.path_for(&request)?;
        let cache_key = fragment_cache_key(&path, context_digest(request.cache_scope, principal).as_deref());
        let now = self.clock.now();

        if let Some(cached) = self.lookup(&cache_key, now) {
            let policy = FragmentCachePolicy::new(Duration::from_secs(cached.remaining_ttl_at(now)))
                .with_scope(request.cache_scope);
            tracing::debug!(key = %cache_key, age = cached.age_at(now), "fragment cache hit");
            return Ok(self.respond(
                &descriptor.key,
                &policy,
                CacheStatus::Hit,
                request_id,
                cached.content,
            ));
        }

        let rendered = render_guarded(&descriptor.key, || {
            descriptor.provider.render(&request, principal)
        })?;

        let ttl = rendered.ttl.unwrap_or(self.default_ttl);
        let vary = rendered.vary.union(request.vary());
        let policy = FragmentCachePolicy::new(ttl).with_scope(vary.scope());

        let status = self.store_rendered(&cache_key, &request, &policy, &rendered, now);
        Ok(self.respond(&descriptor.key, &policy, status, request_id, rendered.body))
    }

    /// Run every provider's flush and clear the fragment cache. Idempotent.
    pub fn flush(&self) -> FlushReport {
        let providers = self.registry.providers();
        for provider in &providers {
            provider.flush();
        }
        self.registry.flush();

        let entries_cleared = match &self.store {
            Some(store) => store.delete_prefix(FRAGMENT_CACHE_PREFIX).unwrap_or_else(|err| {
                tracing::error!(error = %err, "failed to clear fragment cache");
                0
            }),
            None => 0,
        };

        let edge_purged = match &self.invalidator {
            Some(invalidator) => {
                let namespace = format!("/{}/", self.codec.prefix());
                match invalidator.purge(&namespace) {
                    Ok(()) => true,
                    Err(err) => {
                        tracing::error!(error = %err, namespace = %namespace, "edge purge failed");
                        false
                    }
                }
            }
            None => false,
        };

        let report = FlushReport {
            providers: providers.len(),
            entries_cleared,
            edge_purged,
        };
        tracing::info!(
            providers = report.providers,
            entries_cleared = report.entries_cleared,
            edge_purged = report.edge_purged,
            "fragment caches flushed"
        );
        report
    }

    fn lookup(&self, key: &str, now: u64) -> Option<CachedFragment> {
        let store = self.store.as_ref()?;
        match store.get(key) {
            Ok(Some(entry)) if !entry.is_expired_at(now) => Some(entry),
            Ok(Some(_)) => {
                if let Err(err) = store.delete(key) {
                    tracing::warn!(error = %err, key = %key, "failed to evict expired fragment");
                }
                None
            }
            Ok(None) => None,
            Err(err) => {
                tracing::warn!(error = %err, key = %key, "fragment cache read failed");
                None
            }
        }
    }

    fn store_rendered(
        &self,
        key: &str,
        request: &FragmentRequest,
        policy: &FragmentCachePolicy,
        rendered: &RenderedFragment,
        now: u64,
    ) -> CacheStatus {
        let Some(store) = &self.store else {
            return CacheStatus::Bypass;
        };
        // The key only carries the URL's scope; broader provider variance is not storable.
        if !policy.is_cacheable() || policy.scope != request.cache_scope {
            return CacheStatus::Bypass;
        }
        match store.set(key, CachedFragment::new(rendered.body.clone(), policy.ttl, now)) {
            Ok(()) => CacheStatus::Miss,
            Err(err) => {
                tracing::warn!(error = %err, key = %key, "fragment cache write failed");
                CacheStatus::Error
            }
        }
    }

    fn respond(
        &self,
        component_key: &str,
        policy: &FragmentCachePolicy,
        status: CacheStatus,
        request_id: &RequestId,
        body: String,
    ) -> FragmentResponse {
        let mut headers = CacheHeadersBuilder::new()
            .from_policy(policy)
            .etag(generate_etag(&body))
            .fragment_key(component_key)
            .status(status)
            .request_id(request_id.to_string())
            .include_debug(self.debug_headers)
            .build();
        headers.push((
            header_names::CONTENT_TYPE.to_string(),
            CONTENT_TYPE_HTML.to_string(),
        ));

        FragmentResponse {
            status: StatusCode::OK,
            headers,
            body,
        }
    }
}

impl std::fmt::Debug for FragmentDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FragmentDispatcher")
            .field("codec", &self.codec)
            .field("default_ttl", &self.default_ttl)
            .field("store", &self.store.is_some())
            .field("invalidator", &self.invalidator.is_some())
            .finish()
    }
}

/// Digest of the context a scoped fragment is keyed on.
fn context_digest(scope: Option<CacheScope>, principal: &Principal) -> Option<String> {
    let raw = match scope? {
        CacheScope::Role => principal.roles().join(","),
        CacheScope::User => principal.session_id().to_string(),
    };
    let mut digest = sha256_hex(raw.as_bytes());
    digest.truncate(16);
    Some(digest)
}

fn render_guarded<F>(key: &str, render: F) -> Result<RenderedFragment, DispatchError>
where
    F: FnOnce() -> Result<RenderedFragment, crate::error::ProviderError>,
{
    match panic::catch_unwind(AssertUnwindSafe(render)) {
        Ok(Ok(rendered)) => Ok(rendered),
        Ok(Err(source)) => Err(DispatchError::ProviderRenderFailure {
            key: key.to_string(),
            source,
        }),
        Err(_) => Err(DispatchError::ProviderPanicked(key.to_string())),
    }
}
