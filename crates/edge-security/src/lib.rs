//! Seed rotation and context cookies for edge fragment delivery.
//!
//! This crate provides:
//! - `SeedStore` - Rotating secret with pluggable persistence
//! - `ContextProvider` / `ContextProviders` - Named context values per principal
//! - `CookieManager` - Hashed, seed-bound context cookies and their revocation
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use edge_core::{CookieSettings, Principal};
//! use edge_security::{ContextProviders, CookieManager, InMemorySeedBackend, SeedStore};
//!
//! let seeds = Arc::new(SeedStore::new(Arc::new(InMemorySeedBackend::new()), 86_400));
//! let cookies = CookieManager::new(
//!     seeds,
//!     Arc::new(ContextProviders::with_defaults()),
//!     CookieSettings::default(),
//! );
//!
//! let principal = Principal::authenticated("7", "sess_abc", ["editor"]);
//! for cookie in cookies.issue_cookies(&principal)? {
//!     response.append_header("Set-Cookie", cookie.to_set_cookie());
//! }
//! ```

mod cookies;
mod digest;
mod providers;
mod seed;

pub use cookies::*;
pub use digest::*;
pub use providers::*;
pub use seed::*;
