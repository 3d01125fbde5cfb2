use crate::cycle_state::CycleState;
use crate::framework::{ActionType, ClusterEvent, EventResource, FilterPlugin, Plugin, Status};
use stratus_core::{Node, Pod};

pub const NAME: &str = "NodeUnschedulable";

/// Filter plugin that rejects nodes marked unschedulable (cordoned).
pub struct NodeUnschedulable;

impl Plugin for NodeUnschedulable {
    fn name(&self) -> &'static str {
        NAME
    }

    fn events_to_register(&self) -> Vec<ClusterEvent> {
        // Uncordoning is a node update; fresh nodes arrive as adds.
        vec![ClusterEvent {
            resource: EventResource::Node,
            action_type: ActionType::ADD.union(ActionType::UPDATE),
            label: "NodeSchedulableChange",
        }]
    }
}

impl FilterPlugin for NodeUnschedulable {
    fn filter(&self, _state: &CycleState, _pod: &Pod, node: &Node) -> Status {
        let unschedulable = node
            .spec
            .as_ref()
            .and_then(|s| s.unschedulable)
            .unwrap_or(false);

        if unschedulable {
            return Status::unschedulable_and_unresolvable("node(s) were unschedulable");
        }

        Status::success()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_test_node(name: &str, unschedulable: bool) -> Node {
        let mut node = Node::default();
        node.metadata.name = Some(name.to_string());
        node.spec = Some(Default::default());
        node.spec.as_mut().unwrap().unschedulable = Some(unschedulable);
        node
    }

    #[test]
    fn test_schedulable_node_passes() {
        let state = CycleState::new();
        let status = NodeUnschedulable.filter(&state, &Pod::default(), &make_test_node("node1", false));
        assert!(status.is_success());
    }

    #[test]
    fn test_unschedulable_node_fails() {
        let state = CycleState::new();
        let status = NodeUnschedulable.filter(&state, &Pod::default(), &make_test_node("node1", true));
        assert!(status.is_unschedulable());
        assert_eq!(status.code(), crate::framework::Code::UnschedulableAndUnresolvable);
    }

    #[test]
    fn test_node_without_spec_passes() {
        let state = CycleState::new();
        let status = NodeUnschedulable.filter(&state, &Pod::default(), &Node::default());
        assert!(status.is_success());
    }
}
