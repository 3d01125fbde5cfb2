//! Stratus API Server - the control-plane collaborator
//!
//! This crate provides:
//! - Axum-based HTTP server for Pod and Node resources
//! - In-memory resource store with UID and resource-version assignment
//! - Broadcast event bus feeding scheduler event handlers and WATCH streams
//! - The pod `binding` subresource that records scheduling decisions

pub mod error;
pub mod handlers;
pub mod response;
pub mod server;
pub mod state;
pub mod store;
pub mod validation;
pub mod watch;

// Re-export commonly used types
pub use error::{ApiError, Result};
pub use server::{ApiServer, Config};
pub use state::{AppState, EventBusConfig};
pub use store::MemoryStore;
