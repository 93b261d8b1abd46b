//! Public SDK for personalized edge fragment delivery.
//!
//! This crate re-exports all platform functionality and wires it together
//! in [`FragmentRuntime`]:
//!
//! ```ignore
//! use edge_sdk::prelude::*;
//!
//! let runtime = FragmentRuntime::builder(EsiConfig::load("edge.toml")?)
//!     .component(BLOCK_COMPONENT, BlockProvider::new(source, settings), "my-app")
//!     .build()?;
//!
//! // Page render: emit an inclusion tag instead of the block.
//! let tag = runtime.embed(BLOCK_COMPONENT, &location, VaryFlags::per_role(), Some("/node/5"), None)?;
//!
//! // Fragment request from the edge.
//! let response = runtime.dispatch(path, &principal);
//!
//! // After login.
//! for cookie in runtime.issue_cookies(&principal)? {
//!     headers.push(("Set-Cookie", cookie.to_set_cookie()));
//! }
//! ```

mod runtime;

pub use runtime::*;

pub use edge_cache;
pub use edge_components;
pub use edge_core;
pub use edge_observability;
pub use edge_security;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::runtime::*;
    pub use edge_cache::*;
    pub use edge_components::*;
    pub use edge_core::*;
    pub use edge_observability::*;
    pub use edge_security::*;
}
