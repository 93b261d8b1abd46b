//! Fragment cache policies.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Personalization dimension a fragment's edge cache key varies on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CacheScope {
    /// Vary by role set.
    Role,
    /// Vary by user session.
    User,
}

impl CacheScope {
    /// Context key whose cookie the edge must hash.
    pub fn context_key(&self) -> &'static str {
        match self {
            Self::Role => "ROLE",
            Self::User => "USER",
        }
    }

    /// URL marker segment (`CACHE=ROLE` / `CACHE=USER`).
    pub fn marker(&self) -> String {
        format!("CACHE={}", self.context_key())
    }

    /// Parse a URL marker segment.
    pub fn from_marker(segment: &str) -> Option<Self> {
        match segment.strip_prefix("CACHE=")? {
            "ROLE" => Some(Self::Role),
            "USER" => Some(Self::User),
            _ => None,
        }
    }
}

impl std::fmt::Display for CacheScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.context_key())
    }
}

/// Dimensions a fragment varies on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaryFlags {
    /// Vary by originating page.
    pub per_page: bool,
    /// Vary by role set.
    pub per_role: bool,
    /// Vary by user.
    pub per_user: bool,
}

impl VaryFlags {
    /// Globally cacheable.
    pub fn global() -> Self {
        Self::default()
    }

    /// Vary by role set.
    pub fn per_role() -> Self {
        Self {
            per_role: true,
            ..Self::default()
        }
    }

    /// Vary by user.
    pub fn per_user() -> Self {
        Self {
            per_user: true,
            ..Self::default()
        }
    }

    /// Also vary by originating page.
    pub fn with_page(mut self) -> Self {
        self.per_page = true;
        self
    }

    /// Scope marker; USER takes precedence over ROLE.
    pub fn scope(&self) -> Option<CacheScope> {
        if self.per_user {
            Some(CacheScope::User)
        } else if self.per_role {
            Some(CacheScope::Role)
        } else {
            None
        }
    }

    /// Union of two flag sets.
    pub fn union(self, other: Self) -> Self {
        Self {
            per_page: self.per_page || other.per_page,
            per_role: self.per_role || other.per_role,
            per_user: self.per_user || other.per_user,
        }
    }

    /// Flags implied by a URL scope marker.
    pub fn from_scope(scope: Option<CacheScope>) -> Self {
        match scope {
            Some(CacheScope::User) => Self::per_user(),
            Some(CacheScope::Role) => Self::per_role(),
            None => Self::global(),
        }
    }
}

/// Cache lifetime and variance of one delivered fragment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FragmentCachePolicy {
    /// Time-to-live. Zero disables caching.
    pub ttl: Duration,
    /// Personalization scope.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<CacheScope>,
}

impl FragmentCachePolicy {
    /// Globally cacheable for `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, scope: None }
    }

    /// Never cached.
    pub fn no_store() -> Self {
        Self::new(Duration::ZERO)
    }

    /// Set the personalization scope.
    pub fn with_scope(mut self, scope: Option<CacheScope>) -> Self {
        self.scope = scope;
        self
    }

    /// Whether the fragment may be cached at all.
    pub fn is_cacheable(&self) -> bool {
        !self.ttl.is_zero()
    }

    /// Generate Cache-Control header value.
    pub fn cache_control_header(&self) -> String {
        if !self.is_cacheable() {
            return "no-cache, no-store, must-revalidate".to_string();
        }
        format!("public, max-age={}", self.ttl.as_secs())
    }

    /// Generate Vary header value.
    pub fn vary_header(&self) -> Option<String> {
        match self.scope {
            Some(_) if self.is_cacheable() => Some("Cookie".to_string()),
            _ => None,
        }
    }
}
