//! Inclusion tag rendering.

use std::sync::Arc;

use edge_cache::{BlockLocation, CodecError, UrlCodec, VaryFlags};
use edge_core::EsiConfig;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::registry::ComponentRegistry;

/// Edge Side Includes.
pub const ESI_MODE: &str = "esi";
/// Server Side Includes, local virtual path.
pub const SSI_MODE: &str = "ssi";
/// Server Side Includes, remote URL.
pub const SSI_REMOTE_MODE: &str = "ssi_remote";

pub(crate) fn esi_template(url: &str) -> String {
    format!(r#"<esi:include src="{}" />"#, url)
}

pub(crate) fn ssi_template(url: &str) -> String {
    format!(r#"<!--# include virtual="{}" -->"#, url)
}

pub(crate) fn ssi_remote_template(url: &str) -> String {
    format!(r#"<!--# include url="{}" -->"#, url)
}

/// Render a tag with one of the built-in modes. Unknown modes render nothing.
pub fn render_tag(url: &str, mode: &str) -> String {
    match mode {
        ESI_MODE => esi_template(url),
        SSI_MODE => ssi_template(url),
        SSI_REMOTE_MODE => ssi_remote_template(url),
        _ => String::new(),
    }
}

/// Options controlling how fragment URLs are emitted into pages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedOptions {
    /// Mode used when a fragment names none.
    pub default_mode: String,
    /// Prefix URLs with `base_url`.
    pub absolute_urls: bool,
    pub base_url: Option<String>,
    /// Wrap tags for client-side fetching.
    pub ajax_fallback: bool,
    /// Append `?destination=<page>` to the client-side URL.
    pub ajax_fallback_contextualize: bool,
}

impl Default for EmbedOptions {
    fn default() -> Self {
        Self::from_config(&EsiConfig::default())
    }
}

impl EmbedOptions {
    pub fn from_config(config: &EsiConfig) -> Self {
        Self {
            default_mode: config.render_mode.clone(),
            absolute_urls: config.absolute_urls,
            base_url: config.base_url.clone(),
            ajax_fallback: config.ajax_fallback,
            ajax_fallback_contextualize: config.ajax_fallback_contextualize,
        }
    }
}

/// Renders inclusion tags using the registry's render modes.
#[derive(Debug, Clone)]
pub struct TagRenderer {
    registry: Arc<ComponentRegistry>,
    codec: UrlCodec,
    options: EmbedOptions,
}

impl TagRenderer {
    pub fn new(registry: Arc<ComponentRegistry>, codec: UrlCodec, options: EmbedOptions) -> Self {
        Self {
            registry,
            codec,
            options,
        }
    }

    pub fn options(&self) -> &EmbedOptions {
        &self.options
    }

    /// Render the tag for `url` in `mode`, or the default mode.
    ///
    /// Returns an empty string for an unknown mode.
    pub fn render(&self, url: &str, mode: Option<&str>) -> String {
        let mode = mode.unwrap_or(self.options.default_mode.as_str());
        match self.registry.render_mode(mode) {
            Some(descriptor) => descriptor.render(url),
            None => {
                tracing::warn!(mode = %mode, "unknown render mode, emitting nothing");
                String::new()
            }
        }
    }

    /// URL emitted for a fragment path.
    pub fn fragment_url(&self, path: &str) -> String {
        match (&self.options.base_url, self.options.absolute_urls) {
            (Some(base), true) => format!("{}/{}", base.trim_end_matches('/'), path),
            _ => format!("/{}", path),
        }
    }

    /// Encode a fragment and render its inclusion markup.
    ///
    /// Without an explicit `mode` the component's preferred mode for
    /// `location` is used, then the configured default.
    pub fn embed(
        &self,
        component_key: &str,
        location: &BlockLocation,
        vary: VaryFlags,
        page_path: Option<&str>,
        mode: Option<&str>,
    ) -> Result<String, CodecError> {
        let path = self.codec.encode(component_key, location, vary, page_path)?;
        let url = self.fragment_url(&path);
        let preferred = match mode {
            Some(_) => None,
            None => self
                .registry
                .resolve(component_key)
                .and_then(|descriptor| descriptor.provider.render_mode(location)),
        };
        let tag = self.render(&url, mode.or(preferred.as_deref()));
        if tag.is_empty() || !self.options.ajax_fallback {
            return Ok(tag);
        }

        let mut data_src = url;
        if self.options.ajax_fallback_contextualize {
            if let Some(page) = page_path.filter(|page| !page.is_empty()) {
                let separator = if data_src.contains('?') { '&' } else { '?' };
                data_src = format!("{}{}destination={}", data_src, separator, encode_query(page));
            }
        }

        Ok(format!(
            r#"<div class="esi-fallback" data-src="{}">{}</div>"#,
            escape_attribute(&data_src),
            tag
        ))
    }
}

/// Query value characters left as-is: unreserved plus `/`.
const QUERY_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'/');

fn encode_query(value: &str) -> String {
    utf8_percent_encode(value, QUERY_VALUE).to_string()
}

fn escape_attribute(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{RegistryBuilder, RenderModeDescriptor};

    fn location() -> BlockLocation {
        BlockLocation::new("bartik", "sidebar", "user", "login")
    }

    fn renderer(options: EmbedOptions) -> TagRenderer {
        TagRenderer::new(
            Arc::new(ComponentRegistry::new()),
            UrlCodec::default(),
            options,
        )
    }

    #[test]
    fn test_builtin_templates() {
        assert_eq!(
            render_tag("/esi/block/a:b:c:d", "esi"),
            r#"<esi:include src="/esi/block/a:b:c:d" />"#
        );
        assert_eq!(
            render_tag("/x", "ssi"),
            r#"<!--# include virtual="/x" -->"#
        );
        assert_eq!(
            render_tag("http://h/x", "ssi_remote"),
            r#"<!--# include url="http://h/x" -->"#
        );
        assert_eq!(render_tag("/x", "bogus"), "");
    }

    #[test]
    fn test_ssi_per_fragment_mode() {
        let tags = renderer(EmbedOptions::default());
        let html = tags
            .embed("block", &location(), VaryFlags::global(), None, Some("ssi"))
            .unwrap();
        assert_eq!(
            html,
            r#"<!--# include virtual="/esi/block/bartik:sidebar:user:login" -->"#
        );
    }

    #[test]
    fn test_unknown_mode_renders_nothing() {
        let tags = renderer(EmbedOptions {
            ajax_fallback: true,
            ..EmbedOptions::default()
        });
        assert_eq!(tags.render("/x", Some("bogus")), "");
        let html = tags
            .embed("block", &location(), VaryFlags::global(), None, Some("bogus"))
            .unwrap();
        assert_eq!(html, "");
    }

    #[test]
    fn test_absolute_urls() {
        let tags = renderer(EmbedOptions {
            absolute_urls: true,
            base_url: Some("https://example.com/".into()),
            ..EmbedOptions::default()
        });
        assert_eq!(
            tags.fragment_url("esi/block/a:b:c:d"),
            "https://example.com/esi/block/a:b:c:d"
        );
        assert_eq!(renderer(EmbedOptions::default()).fragment_url("p"), "/p");
    }

    #[test]
    fn test_ajax_fallback_contextualized() {
        let tags = renderer(EmbedOptions {
            ajax_fallback: true,
            ajax_fallback_contextualize: true,
            ..EmbedOptions::default()
        });
        let html = tags
            .embed(
                "block",
                &location(),
                VaryFlags::per_role().with_page(),
                Some("/node/5"),
                None,
            )
            .unwrap();
        assert_eq!(
            html,
            concat!(
                r#"<div class="esi-fallback" "#,
                r#"data-src="/esi/block/bartik:sidebar:user:login/L25vZGUvNQ/CACHE=ROLE?destination=/node/5">"#,
                r#"<esi:include src="/esi/block/bartik:sidebar:user:login/L25vZGUvNQ/CACHE=ROLE" />"#,
                "</div>"
            )
        );
    }

    #[test]
    fn test_registered_mode() {
        let registry = RegistryBuilder::new()
            .render_mode(RenderModeDescriptor::new("comment", "Debug", |url| {
                format!("<!-- {} -->", url)
            }))
            .build();
        let tags = TagRenderer::new(
            Arc::new(registry),
            UrlCodec::default(),
            EmbedOptions::default(),
        );
        assert_eq!(tags.render("/x", Some("comment")), "<!-- /x -->");
        assert_eq!(tags.render("/x", None), r#"<esi:include src="/x" />"#);
    }

    struct SsiPreferred;

    impl crate::registry::ComponentProvider for SsiPreferred {
        fn render(
            &self,
            _request: &edge_cache::FragmentRequest,
            _principal: &edge_core::Principal,
        ) -> Result<crate::registry::RenderedFragment, crate::error::ProviderError> {
            Ok(crate::registry::RenderedFragment::new(""))
        }

        fn render_mode(&self, location: &BlockLocation) -> Option<String> {
            (location.delta == "login").then(|| SSI_MODE.to_string())
        }
    }

    #[test]
    fn test_component_preferred_mode() {
        let registry = RegistryBuilder::new()
            .component("block", SsiPreferred, "tests")
            .build();
        let tags = TagRenderer::new(
            Arc::new(registry),
            UrlCodec::default(),
            EmbedOptions::default(),
        );

        let preferred = tags
            .embed("block", &location(), VaryFlags::global(), None, None)
            .unwrap();
        assert_eq!(
            preferred,
            r#"<!--# include virtual="/esi/block/bartik:sidebar:user:login" -->"#
        );

        let explicit = tags
            .embed("block", &location(), VaryFlags::global(), None, Some("esi"))
            .unwrap();
        assert!(explicit.starts_with("<esi:include"));

        let other = BlockLocation::new("bartik", "sidebar", "user", "other");
        let fallback = tags
            .embed("block", &other, VaryFlags::global(), None, None)
            .unwrap();
        assert!(fallback.starts_with("<esi:include"));
    }

    #[test]
    fn test_query_encoding() {
        assert_eq!(encode_query("/a b?c"), "/a%20b%3Fc");
        assert_eq!(encode_query("/caf\u{e9}&x=1"), "/caf%C3%A9%26x%3D1");
        assert_eq!(escape_attribute(r#"/x?a=1&b="2""#), "/x?a=1&amp;b=&quot;2&quot;");
    }
}
