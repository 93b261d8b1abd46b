//! Logging setup for edge fragment delivery.
//!
//! This crate provides:
//! - `init_logging` - Install a `tracing` subscriber (human or JSON output)
//! - `fragment_span` - Request-scoped span carrying the request ID

mod logging;

pub use logging::*;

// Re-export RequestId from edge-core for convenience
pub use edge_core::RequestId;
