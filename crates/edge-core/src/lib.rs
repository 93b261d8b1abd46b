//! Core types and configuration for edge fragment delivery.
//!
//! This crate provides the types shared by every other crate:
//! - `EsiConfig` - Fragment delivery configuration (render mode, TTL, cookies)
//! - `Principal` - The anonymous or authenticated party a request acts for
//! - `RequestId` - Request identifier for log correlation

mod config;
mod context;

pub use config::*;
pub use context::*;
