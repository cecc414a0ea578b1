//! # tandem-common
//!
//! Shared types, configuration, error handling, and validation used across all Tandem crates.
//! No signaling logic lives here, only primitives and contracts.

pub mod config;
pub mod error;
pub mod ids;
pub mod validation;

pub use error::{RelayError, RelayResult};
pub use ids::ConnectionId;
