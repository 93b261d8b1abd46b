//! Context providers.

use std::collections::BTreeMap;
use std::sync::Arc;

use edge_core::Principal;

/// Context key carrying the principal's role set.
pub const ROLE_CONTEXT: &str = "ROLE";

/// Context key carrying the principal's session.
pub const USER_CONTEXT: &str = "USER";

/// Named context values for one principal at one instant.
pub type Context = BTreeMap<String, String>;

/// Source of named context values.
pub trait ContextProvider: Send + Sync {
    /// Provider name, for logs.
    fn name(&self) -> &str;

    /// Context values for `principal`.
    fn provide(&self, principal: &Principal) -> Context;
}

/// Supplies `ROLE` (sorted, comma-joined role identifiers) and `USER`
/// (session identifier).
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultContextProvider;

impl ContextProvider for DefaultContextProvider {
    fn name(&self) -> &str {
        "default"
    }

    fn provide(&self, principal: &Principal) -> Context {
        let mut context = Context::new();
        context.insert(ROLE_CONTEXT.to_string(), principal.roles().join(","));
        context.insert(USER_CONTEXT.to_string(), principal.session_id().to_string());
        context
    }
}

/// Ordered set of context providers, fixed at construction.
#[derive(Clone, Default)]
pub struct ContextProviders {
    providers: Vec<Arc<dyn ContextProvider>>,
}

impl ContextProviders {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a set holding only the default provider.
    pub fn with_defaults() -> Self {
        Self::new().with(DefaultContextProvider)
    }

    /// Append a provider. Later providers overwrite earlier keys.
    pub fn with(mut self, provider: impl ContextProvider + 'static) -> Self {
        self.providers.push(Arc::new(provider));
        self
    }

    /// Append a shared provider.
    pub fn with_shared(mut self, provider: Arc<dyn ContextProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    /// Number of providers.
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Whether no providers are registered.
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Merge every provider's values in registration order.
    pub fn gather(&self, principal: &Principal) -> Context {
        let mut context = Context::new();
        for provider in &self.providers {
            for (key, value) in provider.provide(principal) {
                if let Some(previous) = context.insert(key.clone(), value) {
                    tracing::trace!(
                        provider = provider.name(),
                        key = %key,
                        overwritten = previous.len(),
                        "context key overwritten"
                    );
                }
            }
        }
        context
    }
}

impl std::fmt::Debug for ContextProviders {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.providers.iter().map(|p| p.name()).collect();
        f.debug_struct("ContextProviders").field("providers", &names).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(&'static str, &'static str, &'static str);

    impl ContextProvider for Fixed {
        fn name(&self) -> &str {
            self.0
        }

        fn provide(&self, _principal: &Principal) -> Context {
            Context::from([(self.1.to_string(), self.2.to_string())])
        }
    }

    #[test]
    fn test_default_provider() {
        let principal = Principal::authenticated("1", "sess_x", ["editor", "admin"]);
        let context = ContextProviders::with_defaults().gather(&principal);

        assert_eq!(context[ROLE_CONTEXT], "admin,authenticated,editor");
        assert_eq!(context[USER_CONTEXT], "sess_x");
    }

    #[test]
    fn test_later_provider_overwrites() {
        let providers = ContextProviders::with_defaults()
            .with(Fixed("first", "LANG", "en"))
            .with(Fixed("second", ROLE_CONTEXT, "override"))
            .with(Fixed("third", "LANG", "fr"));

        let context = providers.gather(&Principal::anonymous("s"));
        assert_eq!(context[ROLE_CONTEXT], "override");
        assert_eq!(context["LANG"], "fr");
        assert_eq!(providers.len(), 4);
    }

    #[test]
    fn test_empty_set_yields_empty_context() {
        let providers = ContextProviders::new();
        assert!(providers.is_empty());
        assert!(providers.gather(&Principal::anonymous("s")).is_empty());
    }
}
