use crate::framework::Status;
use miette::Diagnostic;
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// Why a pod found no feasible node: the set of plugins that rejected it and
/// the per-node failure statuses. The queue uses the plugin set to decide
/// which cluster events can rescue the pod.
#[derive(Debug, Clone, Default)]
pub struct Diagnosis {
    pub node_to_status: HashMap<String, Status>,
    pub unschedulable_plugins: HashSet<String>,
}

/// Scheduler error type
#[derive(Error, Debug, Diagnostic)]
pub enum SchedulerError {
    /// No node survived the filter phase
    #[error("no feasible node for pod {pod_name}")]
    #[diagnostic(
        code(scheduler::no_feasible_node),
        help("Check node conditions and the per-node statuses in the diagnosis")
    )]
    NoFeasibleNode {
        pod_name: String,
        diagnosis: Diagnosis,
    },

    /// A plugin returned a non-success status outside the permit wait path
    #[error("running plugin {plugin}: {message}")]
    #[diagnostic(
        code(scheduler::plugin_failure),
        help("This is an internal plugin failure, not an unschedulable verdict")
    )]
    Plugin { plugin: String, message: String },

    /// Permit rejected the pod, inline or through its waiting rendezvous
    #[error("pod {pod_name} rejected by permit plugin {plugin}: {message}")]
    #[diagnostic(
        code(scheduler::permit_rejected),
        help("The pod is requeued and may be retried on a matching cluster event")
    )]
    PermitRejected {
        pod_name: String,
        plugin: String,
        message: String,
    },

    /// Publishing the binding to the control plane failed
    #[error("binding pod {pod_name} failed: {message}")]
    #[diagnostic(
        code(scheduler::binding_failed),
        help("Check connectivity to the API server; the pod will be retried")
    )]
    Binding { pod_name: String, message: String },

    /// The control-plane client failed outside of binding
    #[error("cluster client error: {message}")]
    #[diagnostic(
        code(scheduler::client_error),
        help("Check connectivity to the API server")
    )]
    Client { message: String },

    /// Node selection was handed an empty score list
    #[error("empty node score list")]
    #[diagnostic(
        code(scheduler::empty_node_score_list),
        help("This is likely a bug. Please report it")
    )]
    EmptyNodeScoreList,
}

/// Result type for scheduler operations
pub type Result<T> = std::result::Result<T, SchedulerError>;

impl SchedulerError {
    /// Create a NoFeasibleNode error
    pub fn no_feasible_node(pod_name: impl Into<String>, diagnosis: Diagnosis) -> Self {
        Self::NoFeasibleNode {
            pod_name: pod_name.into(),
            diagnosis,
        }
    }

    /// Create a Plugin error
    pub fn plugin(plugin: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Plugin {
            plugin: plugin.into(),
            message: message.into(),
        }
    }

    /// Create a PermitRejected error
    pub fn permit_rejected(
        pod_name: impl Into<String>,
        plugin: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::PermitRejected {
            pod_name: pod_name.into(),
            plugin: plugin.into(),
            message: message.into(),
        }
    }

    /// Create a Binding error
    pub fn binding(pod_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Binding {
            pod_name: pod_name.into(),
            message: message.into(),
        }
    }

    /// Create a Client error
    pub fn client(message: impl Into<String>) -> Self {
        Self::Client {
            message: message.into(),
        }
    }
}
