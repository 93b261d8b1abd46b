//! Fragment URL encoding.
//!
//! Path layout:
//!
//! ```text
//! <prefix>/<component_key>/<theme>:<region>:<module>:<delta>[/<base64(page)>][/CACHE=USER|ROLE]
//! ```
//!
//! The path records only *whether* a fragment is personalized, never for whom,
//! so the URL itself stays safe to cache on a device that ignores cookies.

use std::sync::Arc;

use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE_NO_PAD};
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::policy::{CacheScope, VaryFlags};

/// URL codec errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// A value cannot be placed in a path segment.
    #[error("invalid {field} segment: {value:?}")]
    InvalidSegment { field: &'static str, value: String },

    /// The path does not follow the fragment layout.
    #[error("malformed fragment request: {0}")]
    Malformed(String),
}

/// Where a fragment lives on the originating page.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockLocation {
    pub theme: String,
    pub region: String,
    pub module: String,
    pub delta: String,
}

impl BlockLocation {
    /// Create a location.
    pub fn new(
        theme: impl Into<String>,
        region: impl Into<String>,
        module: impl Into<String>,
        delta: impl Into<String>,
    ) -> Self {
        Self {
            theme: theme.into(),
            region: region.into(),
            module: module.into(),
            delta: delta.into(),
        }
    }

    /// `module:delta` identifier of the originating block.
    pub fn block_id(&self) -> String {
        format!("{}:{}", self.module, self.delta)
    }

    fn to_segment(&self) -> Result<String, CodecError> {
        let parts = [
            ("theme", &self.theme),
            ("region", &self.region),
            ("module", &self.module),
            ("delta", &self.delta),
        ];
        for (field, value) in parts {
            check_segment(field, value)?;
        }
        Ok(format!(
            "{}:{}:{}:{}",
            self.theme, self.region, self.module, self.delta
        ))
    }

    fn from_segment(segment: &str) -> Result<Self, CodecError> {
        let parts: Vec<&str> = segment.split(':').collect();
        match parts.as_slice() {
            [theme, region, module, delta] if parts.iter().all(|p| !p.is_empty()) => {
                Ok(Self::new(*theme, *region, *module, *delta))
            }
            _ => Err(CodecError::Malformed(format!(
                "expected theme:region:module:delta, got {:?}",
                segment
            ))),
        }
    }
}

/// A decoded fragment path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FragmentRequest {
    /// Registry key of the component.
    pub component_key: String,
    /// Originating location.
    pub location: BlockLocation,
    /// Base64 of the originating page path, if the fragment varies per page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_context: Option<String>,
    /// Personalization scope, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_scope: Option<CacheScope>,
}

impl FragmentRequest {
    /// Decoded originating page path.
    pub fn page_path(&self) -> Result<Option<String>, CodecError> {
        self.page_context.as_deref().map(decode_page).transpose()
    }

    /// Vary flags implied by the path.
    pub fn vary(&self) -> VaryFlags {
        let flags = VaryFlags::from_scope(self.cache_scope);
        if self.page_context.is_some() {
            flags.with_page()
        } else {
            flags
        }
    }
}

/// Post-processor for encoded fragment URLs (e.g. to append a signature).
///
/// Filters may only append a query string: `decode` ignores everything after
/// `?`.
pub trait UrlFilter: Send + Sync {
    /// Return the URL to emit.
    fn filter(&self, url: String, request: &FragmentRequest) -> String;
}

/// Encodes and decodes fragment paths.
#[derive(Clone)]
pub struct UrlCodec {
    prefix: String,
    filters: Vec<Arc<dyn UrlFilter>>,
}

impl UrlCodec {
    /// Create a codec whose paths start with `prefix`.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            filters: Vec::new(),
        }
    }

    /// Append a URL post-processor. Filters run in registration order.
    pub fn with_filter(mut self, filter: impl UrlFilter + 'static) -> Self {
        self.filters.push(Arc::new(filter));
        self
    }

    /// First path segment.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Build the canonical path for a fragment.
    ///
    /// `page_path` is embedded only when `vary.per_page` is set, and is then
    /// required: distinct pages must not share one path.
    pub fn encode(
        &self,
        component_key: &str,
        location: &BlockLocation,
        vary: VaryFlags,
        page_path: Option<&str>,
    ) -> Result<String, CodecError> {
        check_segment("component_key", component_key)?;

        let page_context = match page_path {
            Some(path) if vary.per_page && !path.is_empty() => {
                Some(URL_SAFE_NO_PAD.encode(path.as_bytes()))
            }
            _ if vary.per_page => {
                return Err(CodecError::InvalidSegment {
                    field: "page_path",
                    value: page_path.unwrap_or_default().to_string(),
                })
            }
            _ => None,
        };

        let request = FragmentRequest {
            component_key: component_key.to_string(),
            location: location.clone(),
            page_context,
            cache_scope: vary.scope(),
        };

        let url = self.path_for(&request)?;
        Ok(self
            .filters
            .iter()
            .fold(url, |url, filter| filter.filter(url, &request)))
    }

    /// Canonical path of an already decoded request, without filters.
    pub fn path_for(&self, request: &FragmentRequest) -> Result<String, CodecError> {
        check_segment("component_key", &request.component_key)?;

        let mut segments = vec![
            self.prefix.clone(),
            request.component_key.clone(),
            request.location.to_segment()?,
        ];
        if let Some(page) = &request.page_context {
            segments.push(page.clone());
        }
        if let Some(scope) = request.cache_scope {
            segments.push(scope.marker());
        }
        Ok(segments.join("/"))
    }

    /// Parse a fragment path. Any structural mismatch is `Malformed`.
    pub fn decode(&self, path: &str) -> Result<FragmentRequest, CodecError> {
        let path = path.split(['?', '#']).next().unwrap_or_default();
        let path = path.strip_prefix('/').unwrap_or(path);
        let segments: Vec<&str> = path.split('/').collect();

        if segments.len() < 3 || segments.len() > 5 {
            return Err(CodecError::Malformed(format!(
                "expected 3 to 5 segments, got {}",
                segments.len()
            )));
        }
        if segments[0] != self.prefix {
            return Err(CodecError::Malformed(format!(
                "path does not start with {:?}",
                self.prefix
            )));
        }
        if segments.iter().any(|segment| segment.is_empty()) {
            return Err(CodecError::Malformed("empty path segment".into()));
        }

        let location = BlockLocation::from_segment(segments[2])?;

        let mut rest = &segments[3..];
        let mut cache_scope = None;
        if let Some((last, head)) = rest.split_last() {
            if last.starts_with("CACHE=") {
                cache_scope = Some(CacheScope::from_marker(last).ok_or_else(|| {
                    CodecError::Malformed(format!("unknown cache marker {:?}", last))
                })?);
                rest = head;
            }
        }

        let page_context = match rest {
            [] => None,
            [page] if !page.starts_with("CACHE=") => {
                decode_page(page)?;
                Some((*page).to_string())
            }
            _ => {
                return Err(CodecError::Malformed(
                    "cache marker must be the last segment".into(),
                ))
            }
        };

        Ok(FragmentRequest {
            component_key: segments[1].to_string(),
            location,
            page_context,
            cache_scope,
        })
    }
}

impl std::fmt::Debug for UrlCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UrlCodec")
            .field("prefix", &self.prefix)
            .field("filters", &self.filters.len())
            .finish()
    }
}

impl Default for UrlCodec {
    fn default() -> Self {
        Self::new("esi")
    }
}

fn check_segment(field: &'static str, value: &str) -> Result<(), CodecError> {
    // Segments also land verbatim inside tag attributes.
    let reserved = |c: char| {
        matches!(c, '/' | ':' | '?' | '#' | '"' | '<' | '>' | '&') || c.is_whitespace()
    };
    let bad = value.is_empty() || value.starts_with("CACHE=") || value.chars().any(reserved);
    if bad {
        return Err(CodecError::InvalidSegment {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}

fn decode_page(segment: &str) -> Result<String, CodecError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .or_else(|_| STANDARD.decode(segment))
        .or_else(|_| STANDARD_NO_PAD.decode(segment))
        .map_err(|e| CodecError::Malformed(format!("invalid page context: {}", e)))?;
    String::from_utf8(bytes)
        .map_err(|_| CodecError::Malformed("page context is not UTF-8".into()))
}
