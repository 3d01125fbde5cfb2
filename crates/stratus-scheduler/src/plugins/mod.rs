//! Reference plugins and the default registry.

pub mod node_number;
pub mod node_unschedulable;

pub use node_number::NodeNumber;
pub use node_unschedulable::NodeUnschedulable;

use crate::framework::{FilterPlugin, PermitPlugin, Plugin, PluginRegistry, PreScorePlugin, ScorePlugin};
use crate::waiting_pod::Handle;
use std::sync::Arc;

/// Build the default plugin registry: NodeUnschedulable filtering and
/// NodeNumber pre-score/score/permit. Plugin instances are shared across the
/// extension points they serve.
pub fn default_registry(handle: Arc<dyn Handle>) -> PluginRegistry {
    let node_unschedulable = Arc::new(NodeUnschedulable);
    let node_number = Arc::new(NodeNumber::new(handle));

    PluginRegistry {
        filter: vec![node_unschedulable.clone() as Arc<dyn FilterPlugin>],
        pre_score: vec![node_number.clone() as Arc<dyn PreScorePlugin>],
        score: vec![node_number.clone() as Arc<dyn ScorePlugin>],
        permit: vec![node_number.clone() as Arc<dyn PermitPlugin>],
        enqueue_extensions: vec![
            node_unschedulable as Arc<dyn Plugin>,
            node_number as Arc<dyn Plugin>,
        ],
    }
}
