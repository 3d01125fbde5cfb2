//! Stratus Core - Fundamental types for the Stratus control plane
//!
//! This crate provides:
//! - Resource abstractions over k8s-openapi types
//! - Type-safe resource keys and identifiers
//! - Watch events emitted by the API server

pub mod events;
pub mod resources;
pub mod types;

// Re-export commonly used types
pub use events::{ResourceEvent, WatchEventType};
pub use resources::{is_valid_name, Resource, ResourceError};
pub use types::{GroupVersionKind, ResourceKey, ResourceVersion};

// Re-export k8s-openapi types for convenience
pub use k8s_openapi;
pub use k8s_openapi::api::core::v1::{Binding, Node, Pod};
pub use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
