//! Fragment URLs, cache policies and fragment storage for edge delivery.
//!
//! This crate provides:
//! - `UrlCodec` - Cache-safe fragment paths and their inverse parse
//! - `FragmentCachePolicy` / `VaryFlags` / `CacheScope` - Fragment cache lifetime and variance
//! - `FragmentStore` - Server-side fragment entries with prefix invalidation
//! - `CacheHeadersBuilder` - Cache-Control, Vary and debug headers
//!
//! # Example
//!
//! ```ignore
//! use edge_cache::{BlockLocation, UrlCodec, VaryFlags};
//!
//! let codec = UrlCodec::new("esi");
//! let location = BlockLocation::new("bartik", "sidebar", "user", "login");
//! let path = codec.encode("block", &location, VaryFlags::per_role().with_page(), Some("/node/5"))?;
//!
//! let request = codec.decode(&path)?;
//! assert_eq!(request.page_path()?.as_deref(), Some("/node/5"));
//! ```

mod fragment;
mod headers;
mod policy;
mod url;

pub use fragment::*;
pub use headers::*;
pub use policy::*;
pub use url::*;
