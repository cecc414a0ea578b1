//! # tandem-bridge
//!
//! Inbound channel for the speech translation collaborator. The collaborator
//! connects over WebSocket, pushes translation payloads that are broadcast to
//! every signaling client, and receives language-pair changes in return.
//! The bridge never interprets translations beyond logging a summary.

pub mod handler;
pub mod ingest;

pub use handler::build_router;
pub use ingest::{BridgeFrame, ingest};
