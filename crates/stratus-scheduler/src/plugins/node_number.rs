use crate::cycle_state::{CycleState, StateData};
use crate::framework::{
    ActionType, ClusterEvent, EventResource, PermitPlugin, Plugin, PreScorePlugin, ScorePlugin,
    Status,
};
use crate::waiting_pod::Handle;
use std::sync::Arc;
use std::time::Duration;
use stratus_core::{Node, Pod};
use tracing::debug;

pub const NAME: &str = "NodeNumber";

const PRE_SCORE_STATE_KEY: &str = "PreScoreNodeNumber";

/// NodeNumber scores 10 when the last character of the pod name and the node
/// name are the same decimal digit, otherwise 0. As a permit plugin it delays
/// the binding by {node digit} seconds before allowing the pod. Only single
/// digit suffixes are handled; anything else is treated as success with no
/// effect.
pub struct NodeNumber {
    handle: Arc<dyn Handle>,
}

impl NodeNumber {
    pub fn new(handle: Arc<dyn Handle>) -> Self {
        Self { handle }
    }
}

/// Pod suffix digit computed at pre-score and consumed at score.
#[derive(Debug, Clone)]
struct PreScoreState {
    pod_suffix_number: u32,
}

impl StateData for PreScoreState {
    fn clone_data(&self) -> Box<dyn StateData> {
        Box::new(self.clone())
    }
}

fn last_digit(name: &str) -> Option<u32> {
    name.chars().last().and_then(|c| c.to_digit(10))
}

impl Plugin for NodeNumber {
    fn name(&self) -> &'static str {
        NAME
    }

    fn events_to_register(&self) -> Vec<ClusterEvent> {
        vec![ClusterEvent {
            resource: EventResource::Node,
            action_type: ActionType::ADD,
            label: "NodeAdd",
        }]
    }
}

impl PreScorePlugin for NodeNumber {
    fn pre_score(&self, state: &CycleState, pod: &Pod, _nodes: &[Node]) -> Status {
        let pod_name = pod.metadata.name.as_deref().unwrap_or("");
        let Some(podnum) = last_digit(pod_name) else {
            // Success even if the suffix is not a number.
            return Status::success();
        };

        state.write(
            PRE_SCORE_STATE_KEY,
            Box::new(PreScoreState {
                pod_suffix_number: podnum,
            }),
        );

        Status::success()
    }
}

impl ScorePlugin for NodeNumber {
    fn score(&self, state: &CycleState, _pod: &Pod, node_name: &str) -> (i64, Status) {
        let data = match state.read(PRE_SCORE_STATE_KEY) {
            Ok(data) => data,
            Err(err) => return (0, Status::error(err.to_string())),
        };
        let Some(pre_score) = data.downcast_ref::<PreScoreState>() else {
            return (0, Status::error("failed to convert pre score state"));
        };

        let Some(nodenum) = last_digit(node_name) else {
            return (0, Status::success());
        };

        if pre_score.pod_suffix_number == nodenum {
            (10, Status::success())
        } else {
            (0, Status::success())
        }
    }
}

impl PermitPlugin for NodeNumber {
    fn permit(&self, _state: &CycleState, pod: &Pod, node_name: &str) -> (Status, Duration) {
        let Some(nodenum) = last_digit(node_name) else {
            return (Status::success(), Duration::ZERO);
        };

        // Allow the pod after {node digit} seconds. The waiting pod may
        // already be gone when the timer fires, so look it up first.
        let handle = self.handle.clone();
        let uid = pod.metadata.uid.clone().unwrap_or_default();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(nodenum as u64)).await;
            if let Some(wp) = handle.get_waiting_pod(&uid) {
                debug!(uid = %uid, "allowing waiting pod after node number delay");
                wp.allow(NAME);
            }
        });

        (Status::wait(""), Duration::from_secs(10))
    }
}
