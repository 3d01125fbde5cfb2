//! The control-plane surface the scheduler consumes.

use crate::error::Result;
use async_trait::async_trait;
use stratus_core::{Binding, Node};

/// Client for the cluster control plane. The scheduler only ever lists the
/// candidate nodes and publishes binding decisions; everything else reaches it
/// through the watch event stream.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// List all nodes currently known to the control plane.
    async fn list_nodes(&self) -> Result<Vec<Node>>;

    /// Publish a pod-to-node binding.
    async fn bind(&self, binding: &Binding) -> Result<()>;
}
