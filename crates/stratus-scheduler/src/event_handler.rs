//! Translates API server watch events into queue operations.

use crate::framework::{is_assigned, ActionType, ClusterEvent, EventResource};
use crate::queue::SchedulingQueue;
use std::collections::HashMap;
use std::sync::Arc;
use stratus_core::{Pod, ResourceEvent, WatchEventType};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Spawn the event-handler task. Unassigned pod additions enter the active
/// queue; node mutations selected by `resource_actions` trigger a sweep of the
/// unschedulable set.
pub fn start(
    queue: Arc<SchedulingQueue>,
    resource_actions: HashMap<EventResource, ActionType>,
    mut rx: broadcast::Receiver<ResourceEvent>,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    info!("event handler shutting down");
                    return;
                }
                event = rx.recv() => match event {
                    Ok(event) => handle_event(&queue, &resource_actions, event),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "event handler lagged behind the watch stream");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        info!("watch stream closed, event handler stopping");
                        return;
                    }
                },
            }
        }
    })
}

fn handle_event(
    queue: &SchedulingQueue,
    resource_actions: &HashMap<EventResource, ActionType>,
    event: ResourceEvent,
) {
    if event.kind() == "Pod" {
        handle_pod_event(queue, event);
    } else if event.kind() == "Node" {
        handle_node_event(queue, resource_actions, event);
    }
}

fn handle_pod_event(queue: &SchedulingQueue, event: ResourceEvent) {
    if !matches!(event.event_type, WatchEventType::Added) {
        return;
    }

    let pod: Pod = match serde_json::from_value(event.object) {
        Ok(pod) => pod,
        Err(err) => {
            warn!(key = %event.resource_key, error = %err, "dropping undecodable pod event");
            return;
        }
    };

    if is_assigned(&pod) {
        debug!(key = %event.resource_key, "ignoring already assigned pod");
        return;
    }

    info!(key = %event.resource_key, "unassigned pod observed, queueing");
    queue.add(pod);
}

fn handle_node_event(
    queue: &SchedulingQueue,
    resource_actions: &HashMap<EventResource, ActionType>,
    event: ResourceEvent,
) {
    let cluster_event = match event.event_type {
        WatchEventType::Added => ClusterEvent {
            resource: EventResource::Node,
            action_type: ActionType::ADD,
            label: "NodeAdd",
        },
        WatchEventType::Modified => ClusterEvent {
            resource: EventResource::Node,
            action_type: ActionType::UPDATE,
            label: "NodeUpdate",
        },
        WatchEventType::Deleted => ClusterEvent {
            resource: EventResource::Node,
            action_type: ActionType::DELETE,
            label: "NodeDelete",
        },
        WatchEventType::Error => return,
    };

    // Only react to actions some plugin registered for.
    let registered = resource_actions
        .get(&EventResource::Node)
        .copied()
        .unwrap_or(ActionType::empty());
    if (registered & cluster_event.action_type).is_empty() {
        debug!(label = cluster_event.label, "no plugin registered for node event");
        return;
    }

    debug!(label = cluster_event.label, key = %event.resource_key, "node event, sweeping unschedulable pods");
    queue.move_all_to_active_or_backoff_queue(cluster_event);
}
