//! In-memory control plane used by tests: serves a node list, records
//! bindings, and publishes watch events the way the API server does.

use crate::client::ClusterClient;
use crate::error::{Result, SchedulerError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use stratus_core::{Binding, Node, Pod, Resource, ResourceEvent, WatchEventType};
use tokio::sync::broadcast;

/// Mock cluster backing the scheduler in tests.
pub struct MockCluster {
    nodes: Mutex<Vec<Node>>,
    bindings: Mutex<Vec<Binding>>,
    /// namespace/name -> bound node, the observable outcome of a binding.
    bound: Mutex<HashMap<String, String>>,
    event_tx: broadcast::Sender<ResourceEvent>,
    fail_bindings: AtomicBool,
    version: AtomicU64,
}

impl MockCluster {
    pub fn new() -> Arc<Self> {
        let (event_tx, _) = broadcast::channel(256);
        Arc::new(Self {
            nodes: Mutex::new(Vec::new()),
            bindings: Mutex::new(Vec::new()),
            bound: Mutex::new(HashMap::new()),
            event_tx,
            fail_bindings: AtomicBool::new(false),
            version: AtomicU64::new(0),
        })
    }

    /// Subscribe to the watch stream, as the event handler does.
    pub fn subscribe(&self) -> broadcast::Receiver<ResourceEvent> {
        self.event_tx.subscribe()
    }

    fn next_version(&self) -> String {
        self.version.fetch_add(1, Ordering::Relaxed).to_string()
    }

    fn publish<T: Resource>(&self, resource: &T, event_type: WatchEventType) {
        let key = resource.resource_key().expect("mock resources are named");
        let object = serde_json::to_value(resource).expect("mock resources serialize");
        let event = ResourceEvent::new(event_type, key, object, self.next_version());
        // No subscribers is fine.
        let _ = self.event_tx.send(event);
    }

    /// Register a node and publish its ADDED event.
    pub fn add_node(&self, node: Node) {
        self.nodes.lock().unwrap().push(node.clone());
        self.publish(&node, WatchEventType::Added);
    }

    /// Replace a node by name and publish a MODIFIED event.
    pub fn update_node(&self, node: Node) {
        {
            let mut nodes = self.nodes.lock().unwrap();
            if let Some(existing) = nodes
                .iter_mut()
                .find(|n| n.metadata.name == node.metadata.name)
            {
                *existing = node.clone();
            }
        }
        self.publish(&node, WatchEventType::Modified);
    }

    /// Publish a pod ADDED event, as the informer does for fresh pods.
    pub fn add_pod(&self, pod: Pod) {
        self.publish(&pod, WatchEventType::Added);
    }

    /// The node a pod was bound to, if any.
    pub fn bound_node(&self, namespace: &str, name: &str) -> Option<String> {
        self.bound
            .lock()
            .unwrap()
            .get(&format!("{}/{}", namespace, name))
            .cloned()
    }

    /// All bindings received so far.
    pub fn bindings(&self) -> Vec<Binding> {
        self.bindings.lock().unwrap().clone()
    }

    /// Make subsequent bind calls fail, to exercise the error path.
    pub fn set_fail_bindings(&self, fail: bool) {
        self.fail_bindings.store(fail, Ordering::Relaxed);
    }
}

#[async_trait]
impl ClusterClient for MockCluster {
    async fn list_nodes(&self) -> Result<Vec<Node>> {
        Ok(self.nodes.lock().unwrap().clone())
    }

    async fn bind(&self, binding: &Binding) -> Result<()> {
        let pod_name = binding.metadata.name.clone().unwrap_or_default();
        if self.fail_bindings.load(Ordering::Relaxed) {
            return Err(SchedulerError::binding(pod_name, "mock binding failure"));
        }

        let namespace = binding.metadata.namespace.clone().unwrap_or_default();
        let target = binding.target.name.clone().unwrap_or_default();
        self.bound
            .lock()
            .unwrap()
            .insert(format!("{}/{}", namespace, pod_name), target);
        self.bindings.lock().unwrap().push(binding.clone());
        Ok(())
    }
}
