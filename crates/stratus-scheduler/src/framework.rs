//! Plugin framework: status codes, cluster events, extension-point traits and
//! the plugin registry.

use crate::cycle_state::CycleState;
use bitflags::bitflags;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use stratus_core::{Node, Pod};

/// Code is the status code returned from plugins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Code {
    /// The plugin ran correctly and found the pod schedulable.
    #[default]
    Success,
    /// Internal plugin error, unexpected input, etc.
    Error,
    /// The plugin found the pod unschedulable; a later cluster event may help.
    Unschedulable,
    /// The plugin found the pod unschedulable and retrying on the same cluster
    /// state would not change anything.
    UnschedulableAndUnresolvable,
    /// A permit plugin asked to delay the binding.
    Wait,
}

/// Status is the outcome of a single plugin call.
#[derive(Debug, Clone, Default)]
pub struct Status {
    code: Code,
    message: String,
    failed_plugin: Option<String>,
}

impl Status {
    /// Success status with no message
    pub fn success() -> Self {
        Self::default()
    }

    /// Internal error status
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            code: Code::Error,
            message: message.into(),
            failed_plugin: None,
        }
    }

    /// Unschedulable status
    pub fn unschedulable(message: impl Into<String>) -> Self {
        Self {
            code: Code::Unschedulable,
            message: message.into(),
            failed_plugin: None,
        }
    }

    /// Unschedulable status that no cluster event can resolve
    pub fn unschedulable_and_unresolvable(message: impl Into<String>) -> Self {
        Self {
            code: Code::UnschedulableAndUnresolvable,
            message: message.into(),
            failed_plugin: None,
        }
    }

    /// Wait status returned by permit plugins that delay the binding
    pub fn wait(message: impl Into<String>) -> Self {
        Self {
            code: Code::Wait,
            message: message.into(),
            failed_plugin: None,
        }
    }

    pub fn code(&self) -> Code {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_success(&self) -> bool {
        self.code == Code::Success
    }

    pub fn is_wait(&self) -> bool {
        self.code == Code::Wait
    }

    /// True for both Unschedulable and UnschedulableAndUnresolvable
    pub fn is_unschedulable(&self) -> bool {
        matches!(
            self.code,
            Code::Unschedulable | Code::UnschedulableAndUnresolvable
        )
    }

    /// Record the plugin that produced this status
    pub fn with_failed_plugin(mut self, plugin: &str) -> Self {
        self.failed_plugin = Some(plugin.to_string());
        self
    }

    pub fn failed_plugin(&self) -> Option<&str> {
        self.failed_plugin.as_deref()
    }
}

bitflags! {
    /// ActionType is a bitmask over the mutations a cluster resource can undergo.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ActionType: u32 {
        const ADD = 1;
        const UPDATE = 1 << 1;
        const DELETE = 1 << 2;
        const ALL = Self::ADD.bits() | Self::UPDATE.bits() | Self::DELETE.bits();
    }
}

/// Resource kinds that cluster events can refer to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventResource {
    Pod,
    Node,
    WildCard,
}

/// A (resource, action, label) descriptor for cluster mutations. Plugins
/// register the events that can make a pod they rejected schedulable again;
/// the queue matches incoming events against those registrations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClusterEvent {
    pub resource: EventResource,
    pub action_type: ActionType,
    pub label: &'static str,
}

impl ClusterEvent {
    /// A wildcard event matches every registration.
    pub fn is_wildcard(&self) -> bool {
        self.resource == EventResource::WildCard && self.action_type == ActionType::ALL
    }
}

/// Mapping from registered cluster events to the names of the plugins that
/// registered them. Built once at scheduler construction.
pub type ClusterEventMap = HashMap<ClusterEvent, HashSet<String>>;

/// Base trait for all plugins.
pub trait Plugin: Send + Sync {
    /// Name of the plugin, used in logs, diagnoses and the cluster event map.
    fn name(&self) -> &'static str;

    /// Cluster events that may make a pod rejected by this plugin schedulable.
    fn events_to_register(&self) -> Vec<ClusterEvent> {
        Vec::new()
    }
}

/// Plugin that decides whether a pod can run on a node.
pub trait FilterPlugin: Plugin {
    fn filter(&self, state: &CycleState, pod: &Pod, node: &Node) -> Status;
}

/// Plugin called once per cycle with the feasible nodes, before scoring.
/// May write shared state into the CycleState.
pub trait PreScorePlugin: Plugin {
    fn pre_score(&self, state: &CycleState, pod: &Pod, nodes: &[Node]) -> Status;
}

/// Plugin that ranks a feasible node; higher is better.
pub trait ScorePlugin: Plugin {
    fn score(&self, state: &CycleState, pod: &Pod, node_name: &str) -> (i64, Status);
}

/// Plugin that can prevent or delay the binding. Returns the status and, for
/// Wait, the maximum time to hold the pod before timing out.
pub trait PermitPlugin: Plugin {
    fn permit(&self, state: &CycleState, pod: &Pod, node_name: &str) -> (Status, Duration);
}

/// Enabled plugins per extension point. Built explicitly at scheduler
/// construction; there is no process-global plugin state.
pub struct PluginRegistry {
    pub filter: Vec<Arc<dyn FilterPlugin>>,
    pub pre_score: Vec<Arc<dyn PreScorePlugin>>,
    pub score: Vec<Arc<dyn ScorePlugin>>,
    pub permit: Vec<Arc<dyn PermitPlugin>>,
    /// Plugins consulted for `events_to_register`. A plugin enabled at several
    /// extension points appears here once.
    pub enqueue_extensions: Vec<Arc<dyn Plugin>>,
}

impl PluginRegistry {
    /// Build the cluster event map from the registered enqueue extensions.
    pub fn cluster_event_map(&self) -> ClusterEventMap {
        let mut map: ClusterEventMap = HashMap::new();
        for plugin in &self.enqueue_extensions {
            for event in plugin.events_to_register() {
                map.entry(event)
                    .or_default()
                    .insert(plugin.name().to_string());
            }
        }
        map
    }

    /// Union of registered action bits per resource, used to decide which
    /// watch callbacks are wired up at all.
    pub fn event_resource_actions(&self) -> HashMap<EventResource, ActionType> {
        let mut map: HashMap<EventResource, ActionType> = HashMap::new();
        for plugin in &self.enqueue_extensions {
            for event in plugin.events_to_register() {
                map.entry(event.resource)
                    .and_modify(|at| *at |= event.action_type)
                    .or_insert(event.action_type);
            }
        }
        map
    }
}

/// Name of the node a pod is assigned to, or empty if unassigned.
pub fn pod_node_name(pod: &Pod) -> &str {
    pod.spec
        .as_ref()
        .and_then(|s| s.node_name.as_deref())
        .unwrap_or("")
}

/// A pod is assigned once its node name is non-empty.
pub fn is_assigned(pod: &Pod) -> bool {
    !pod_node_name(pod).is_empty()
}

/// Pod UID, empty if the control plane has not assigned one.
pub fn pod_uid(pod: &Pod) -> String {
    pod.metadata.uid.clone().unwrap_or_default()
}

/// Node name, empty if unset.
pub fn node_name(node: &Node) -> String {
    node.metadata.name.clone().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert!(Status::success().is_success());
        assert!(Status::wait("").is_wait());
        assert!(Status::unschedulable("no fit").is_unschedulable());
        assert!(Status::unschedulable_and_unresolvable("cordoned").is_unschedulable());
        assert!(!Status::error("boom").is_success());
        assert!(!Status::error("boom").is_unschedulable());
    }

    #[test]
    fn test_status_failed_plugin() {
        let status = Status::unschedulable("no fit").with_failed_plugin("NodeUnschedulable");
        assert_eq!(status.failed_plugin(), Some("NodeUnschedulable"));
        assert_eq!(status.message(), "no fit");
    }

    #[test]
    fn test_action_type_compatibility() {
        assert!(!(ActionType::ADD & ActionType::ALL).is_empty());
        assert!((ActionType::UPDATE & ActionType::DELETE).is_empty());
        assert!(!(ActionType::UPDATE & (ActionType::ADD | ActionType::UPDATE)).is_empty());
    }

    #[test]
    fn test_wildcard_event() {
        let wildcard = ClusterEvent {
            resource: EventResource::WildCard,
            action_type: ActionType::ALL,
            label: "Test",
        };
        assert!(wildcard.is_wildcard());

        let node_add = ClusterEvent {
            resource: EventResource::Node,
            action_type: ActionType::ADD,
            label: "NodeAdd",
        };
        assert!(!node_add.is_wildcard());
    }

    #[test]
    fn test_pod_assignment_helpers() {
        let mut pod = Pod::default();
        assert!(!is_assigned(&pod));

        pod.spec = Some(Default::default());
        pod.spec.as_mut().unwrap().node_name = Some("node1".to_string());
        assert!(is_assigned(&pod));
        assert_eq!(pod_node_name(&pod), "node1");
    }
}
