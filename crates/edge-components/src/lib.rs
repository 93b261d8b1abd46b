//! Component registry, fragment dispatch and inclusion tags.
//!
//! This crate provides:
//! - `ComponentRegistry` - Keyed fragment providers and render modes, rebuilt on flush
//! - `FragmentDispatcher` - Decodes fragment paths and renders bare fragment responses
//! - `TagRenderer` - ESI / SSI inclusion tags for fragment URLs
//! - `BlockProvider` - The `block` component over an external block source
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use edge_components::{BlockProvider, FragmentDispatcher, RegistryBuilder};
//!
//! let registry = Arc::new(
//!     RegistryBuilder::new()
//!         .component("block", BlockProvider::new(source, settings), "edge_components::blocks")
//!         .build(),
//! );
//! let dispatcher = FragmentDispatcher::new(registry, codec, Duration::from_secs(300));
//!
//! let response = dispatcher.dispatch("esi/block/bartik:sidebar:user:login/CACHE=ROLE", &principal);
//! ```

mod blocks;
mod dispatch;
mod error;
mod registry;
mod render;

pub use blocks::*;
pub use dispatch::*;
pub use error::*;
pub use registry::*;
pub use render::*;
