//! In-process control-plane client: the scheduler reads and writes straight
//! through the API server state, and mutations surface as watch events.

use async_trait::async_trait;
use std::sync::Arc;
use stratus_apiserver::handlers::common::{list_resources, store_prefix};
use stratus_apiserver::handlers::pods::apply_binding;
use stratus_apiserver::AppState;
use stratus_core::{Binding, Node};
use stratus_scheduler::{ClusterClient, SchedulerError};

pub struct InProcessCluster {
    state: Arc<AppState>,
}

impl InProcessCluster {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }
}

#[async_trait]
impl ClusterClient for InProcessCluster {
    async fn list_nodes(&self) -> stratus_scheduler::Result<Vec<Node>> {
        list_resources(&self.state, &store_prefix("v1", "Node", None))
            .await
            .map_err(|e| SchedulerError::client(format!("{:?}", e)))
    }

    async fn bind(&self, binding: &Binding) -> stratus_scheduler::Result<()> {
        let pod_name = binding.metadata.name.clone().unwrap_or_default();
        apply_binding(&self.state, binding)
            .await
            .map(|_| ())
            .map_err(|e| SchedulerError::binding(pod_name, format!("{:?}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{ObjectReference, Pod};
    use stratus_apiserver::handlers::common::create_resource;
    use stratus_apiserver::MemoryStore;
    use stratus_core::ObjectMeta;

    fn make_state() -> Arc<AppState> {
        Arc::new(AppState::new(Arc::new(MemoryStore::new())))
    }

    #[tokio::test]
    async fn test_list_nodes_round_trip() {
        let state = make_state();
        let mut node = Node::default();
        node.metadata.name = Some("node1".to_string());
        create_resource(&state, node).await.unwrap();

        let cluster = InProcessCluster::new(state);
        let nodes = cluster.list_nodes().await.unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].metadata.name.as_deref(), Some("node1"));
    }

    #[tokio::test]
    async fn test_bind_updates_pod_assignment() {
        let state = make_state();

        let mut pod = Pod::default();
        pod.metadata.name = Some("pod1".to_string());
        pod.metadata.namespace = Some("default".to_string());
        pod.spec = Some(Default::default());
        pod.spec.as_mut().unwrap().containers = vec![Default::default()];
        create_resource(&state, pod).await.unwrap();

        let cluster = InProcessCluster::new(state.clone());
        let binding = Binding {
            metadata: ObjectMeta {
                name: Some("pod1".to_string()),
                namespace: Some("default".to_string()),
                ..Default::default()
            },
            target: ObjectReference {
                kind: Some("Node".to_string()),
                name: Some("node1".to_string()),
                ..Default::default()
            },
        };
        cluster.bind(&binding).await.unwrap();

        // Binding the same pod twice is a conflict surfaced as a bind error.
        let err = cluster.bind(&binding).await.unwrap_err();
        assert!(matches!(err, SchedulerError::Binding { .. }));
    }
}
