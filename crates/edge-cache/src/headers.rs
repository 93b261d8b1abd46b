//! Fragment response headers.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::fragment::CacheStatus;
use crate::policy::FragmentCachePolicy;

/// Header names used on fragment responses.
pub mod header_names {
    /// Standard Cache-Control header.
    pub const CACHE_CONTROL: &str = "Cache-Control";
    /// Standard Vary header.
    pub const VARY: &str = "Vary";
    /// Standard ETag header.
    pub const ETAG: &str = "ETag";
    /// Standard Content-Type header.
    pub const CONTENT_TYPE: &str = "Content-Type";
    /// Context cookie the edge must add to its cache key (ROLE, USER).
    pub const X_FRAGMENT_CONTEXT: &str = "X-Fragment-Context";
    /// Component key that produced the fragment.
    pub const X_FRAGMENT_KEY: &str = "X-Fragment-Key";
    /// Server-side fragment cache status (HIT, MISS, BYPASS).
    pub const X_CACHE_STATUS: &str = "X-Cache-Status";
    /// Fragment cache TTL.
    pub const X_CACHE_TTL: &str = "X-Cache-TTL";
    /// Request ID for tracing.
    pub const X_REQUEST_ID: &str = "X-Request-ID";
}

/// Builder for fragment response headers.
#[derive(Debug, Default)]
pub struct CacheHeadersBuilder {
    cache_control: Option<String>,
    vary: Option<String>,
    context: Option<String>,
    etag: Option<String>,
    fragment_key: Option<String>,
    status: Option<CacheStatus>,
    ttl_secs: Option<u64>,
    request_id: Option<String>,
    include_debug: bool,
}

impl CacheHeadersBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set Cache-Control, Vary and the context header from a policy.
    pub fn from_policy(mut self, policy: &FragmentCachePolicy) -> Self {
        self.cache_control = Some(policy.cache_control_header());
        self.vary = policy.vary_header();
        self.context = policy
            .scope
            .filter(|_| policy.is_cacheable())
            .map(|scope| scope.context_key().to_string());
        self.ttl_secs = Some(policy.ttl.as_secs());
        self
    }

    /// Set ETag header.
    pub fn etag(mut self, value: impl Into<String>) -> Self {
        self.etag = Some(value.into());
        self
    }

    /// Set the component key header.
    pub fn fragment_key(mut self, key: impl Into<String>) -> Self {
        self.fragment_key = Some(key.into());
        self
    }

    /// Set the server-side cache status.
    pub fn status(mut self, status: CacheStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Set the request ID.
    pub fn request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }

    /// Enable debug headers in output.
    pub fn include_debug(mut self, enabled: bool) -> Self {
        self.include_debug = enabled;
        self
    }

    /// Build the headers.
    pub fn build(self) -> Vec<(String, String)> {
        let mut headers = Vec::new();

        if let Some(cc) = self.cache_control {
            headers.push((header_names::CACHE_CONTROL.to_string(), cc));
        }

        if let Some(vary) = self.vary {
            headers.push((header_names::VARY.to_string(), vary));
        }

        if let Some(context) = self.context {
            headers.push((header_names::X_FRAGMENT_CONTEXT.to_string(), context));
        }

        if let Some(etag) = self.etag {
            headers.push((header_names::ETAG.to_string(), format!("\"{}\"", etag)));
        }

        if let Some(key) = self.fragment_key {
            headers.push((header_names::X_FRAGMENT_KEY.to_string(), key));
        }

        if self.include_debug {
            if let Some(status) = self.status {
                headers.push((header_names::X_CACHE_STATUS.to_string(), status.to_string()));
            }
            if let Some(ttl) = self.ttl_secs {
                headers.push((header_names::X_CACHE_TTL.to_string(), ttl.to_string()));
            }
            if let Some(id) = self.request_id {
                headers.push((header_names::X_REQUEST_ID.to_string(), id));
            }
        }

        headers
    }
}

/// Generate a simple ETag from content.
pub fn generate_etag(content: &str) -> String {
    let mut hasher = DefaultHasher::new();
    content.hash(&mut hasher);
    format!("{:x}", hasher.finish())
}
