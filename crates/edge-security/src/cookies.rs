//! Context cookies.
//!
//! Every context value becomes one cookie whose value is a seed-bound hash of
//! the raw value. The edge cache only compares these values when building
//! cache keys; they are never decoded.

use std::collections::HashMap;
use std::sync::Arc;

use edge_core::{CookieSettings, Principal};
use serde::{Deserialize, Serialize};

use crate::digest::{constant_time_eq, context_hash, sha256_hex};
use crate::providers::{Context, ContextProviders};
use crate::seed::{Clock, Seed, SeedError, SeedStore};

/// Context key of the liveness sentinel cookie.
pub const LIVENESS_CONTEXT: &str = "LIVE";

/// Length of the hardening suffix in hex characters.
pub const HARDENING_SUFFIX_LEN: usize = 12;

/// Cookie manager errors.
#[derive(Debug, thiserror::Error)]
pub enum CookieError {
    /// The seed could not be obtained.
    #[error(transparent)]
    Seed(#[from] SeedError),
}

/// When a cookie expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "at", rename_all = "lowercase")]
pub enum CookieExpiry {
    /// Ends with the browser session.
    Session,
    /// Expires at a Unix timestamp.
    At(u64),
    /// Already expired; clears the cookie.
    Expired,
}

/// A cookie to send to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CookieDescriptor {
    /// Cookie name.
    pub name: String,
    /// Cookie value.
    pub value: String,
    /// Expiry.
    pub expires: CookieExpiry,
    /// Path attribute.
    pub path: String,
    /// Domain attribute.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    /// Secure attribute.
    pub secure: bool,
    /// HttpOnly attribute.
    pub http_only: bool,
}

impl CookieDescriptor {
    /// Whether this descriptor clears the cookie.
    pub fn is_clearing(&self) -> bool {
        self.expires == CookieExpiry::Expired
    }

    /// Render as a `Set-Cookie` header value.
    pub fn to_set_cookie(&self) -> String {
        let mut parts = vec![format!("{}={}", self.name, self.value)];

        match self.expires {
            CookieExpiry::Session => {}
            CookieExpiry::At(ts) => {
                if let Some(date) = http_date(ts) {
                    parts.push(format!("Expires={}", date));
                }
            }
            CookieExpiry::Expired => {
                parts.push("Expires=Thu, 01 Jan 1970 00:00:00 GMT".to_string());
                parts.push("Max-Age=0".to_string());
            }
        }

        parts.push(format!("Path={}", self.path));

        if let Some(domain) = &self.domain {
            parts.push(format!("Domain={}", domain));
        }
        if self.secure {
            parts.push("Secure".to_string());
        }
        if self.http_only {
            parts.push("HttpOnly".to_string());
        }
        parts.push("SameSite=Lax".to_string());

        parts.join("; ")
    }
}

fn http_date(ts: u64) -> Option<String> {
    let secs = i64::try_from(ts).ok()?;
    chrono::DateTime::from_timestamp(secs, 0)
        .map(|dt| dt.format("%a, %d %b %Y %H:%M:%S GMT").to_string())
}

/// Session-scoped suffix appended to cookie names when hardening is on.
pub fn hardening_suffix(principal: &Principal) -> String {
    let mut suffix = sha256_hex(principal.session_id().as_bytes());
    suffix.truncate(HARDENING_SUFFIX_LEN);
    suffix
}

/// Cookie name for a context key.
pub fn cookie_name(settings: &CookieSettings, principal: &Principal, key: &str) -> String {
    if settings.hardening {
        format!("{}{}_{}", settings.prefix, key, hardening_suffix(principal))
    } else {
        format!("{}{}", settings.prefix, key)
    }
}

/// Build the full cookie set for `principal` from an already gathered
/// context. Deterministic in its inputs; `now` only feeds the sentinel value
/// and the expiry.
pub fn build_cookies(
    principal: &Principal,
    context: &Context,
    seed: &Seed,
    settings: &CookieSettings,
    now: u64,
) -> Vec<CookieDescriptor> {
    let expires = if settings.lifetime > 0 {
        CookieExpiry::At(now.saturating_add(settings.lifetime))
    } else {
        CookieExpiry::Session
    };

    let descriptor = |key: &str, value: String| CookieDescriptor {
        name: cookie_name(settings, principal, key),
        value,
        expires,
        path: settings.path.clone(),
        domain: settings.domain.clone(),
        secure: settings.secure,
        http_only: settings.http_only,
    };

    let mut cookies: Vec<CookieDescriptor> = context
        .iter()
        .filter(|(key, _)| key.as_str() != LIVENESS_CONTEXT)
        .map(|(key, raw)| descriptor(key, context_hash(seed, raw)))
        .collect();

    cookies.push(descriptor(LIVENESS_CONTEXT, now.to_string()));
    cookies
}

/// Parse a `Cookie` request header into name/value pairs.
pub fn parse_cookie_header(header: &str) -> HashMap<String, String> {
    header
        .split(';')
        .filter_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            Some((name.to_string(), value.trim().to_string()))
        })
        .collect()
}

/// Issues and revokes context cookies.
#[derive(Debug)]
pub struct CookieManager {
    seeds: Arc<SeedStore>,
    providers: Arc<ContextProviders>,
    settings: CookieSettings,
    clock: Arc<dyn Clock>,
}

impl CookieManager {
    /// Create a manager. Time is taken from the seed store's clock.
    pub fn new(
        seeds: Arc<SeedStore>,
        providers: Arc<ContextProviders>,
        settings: CookieSettings,
    ) -> Self {
        let clock = seeds.clock();
        Self {
            seeds,
            providers,
            settings,
            clock,
        }
    }

    /// Cookie settings in use.
    pub fn settings(&self) -> &CookieSettings {
        &self.settings
    }

    /// Name of the liveness sentinel cookie for `principal`.
    pub fn sentinel_name(&self, principal: &Principal) -> String {
        cookie_name(&self.settings, principal, LIVENESS_CONTEXT)
    }

    /// Cookies to set after login or a context change.
    pub fn issue_cookies(&self, principal: &Principal) -> Result<Vec<CookieDescriptor>, CookieError> {
        let seed = self.seeds.get_seed()?;
        let context = self.gather(principal);
        let cookies = build_cookies(principal, &context, &seed, &self.settings, self.clock.now());

        tracing::debug!(
            count = cookies.len(),
            authenticated = principal.is_authenticated(),
            "issued context cookies"
        );
        Ok(cookies)
    }

    /// Names `issue_cookies` would produce, sentinel last.
    pub fn cookie_names(&self, principal: &Principal) -> Vec<String> {
        let context = self.gather(principal);
        context
            .keys()
            .map(String::as_str)
            .chain(std::iter::once(LIVENESS_CONTEXT))
            .map(|key| cookie_name(&self.settings, principal, key))
            .collect()
    }

    /// Clearing instructions for every context cookie, e.g. on logout.
    pub fn revoke_cookies(&self, principal: &Principal) -> Vec<CookieDescriptor> {
        let cookies: Vec<CookieDescriptor> = self
            .cookie_names(principal)
            .into_iter()
            .map(|name| CookieDescriptor {
                name,
                value: String::new(),
                expires: CookieExpiry::Expired,
                path: self.settings.path.clone(),
                domain: self.settings.domain.clone(),
                secure: self.settings.secure,
                http_only: self.settings.http_only,
            })
            .collect();

        tracing::debug!(count = cookies.len(), "revoked context cookies");
        cookies
    }

    /// Whether an authenticated principal's cookies must be reissued: the
    /// sentinel is missing, unparsable, or predates the current seed.
    pub fn needs_refresh(
        &self,
        principal: &Principal,
        request_cookies: &HashMap<String, String>,
    ) -> Result<bool, CookieError> {
        if !principal.is_authenticated() {
            return Ok(false);
        }

        let issued_at = match request_cookies
            .get(&self.sentinel_name(principal))
            .and_then(|value| value.parse::<u64>().ok())
        {
            Some(ts) => ts,
            None => return Ok(true),
        };

        let seed = self.seeds.get_seed()?;
        Ok(issued_at < seed.last_changed())
    }

    /// Whether the request carries exactly the hashed values the current seed
    /// would produce for `principal`.
    pub fn validate(
        &self,
        principal: &Principal,
        request_cookies: &HashMap<String, String>,
    ) -> Result<bool, CookieError> {
        let seed = self.seeds.get_seed()?;
        let context = self.gather(principal);

        let valid = context
            .iter()
            .filter(|(key, _)| key.as_str() != LIVENESS_CONTEXT)
            .all(|(key, raw)| {
                let name = cookie_name(&self.settings, principal, key);
                request_cookies
                    .get(&name)
                    .is_some_and(|value| constant_time_eq(value, &context_hash(&seed, raw)))
            });
        Ok(valid)
    }

    fn gather(&self, principal: &Principal) -> Context {
        let mut context = self.providers.gather(principal);
        if context.remove(LIVENESS_CONTEXT).is_some() {
            tracing::warn!("context provider supplied reserved key {}", LIVENESS_CONTEXT);
        }
        context
    }
}
