//! The scheduling loop: one pod at a time through filter, pre-score, score,
//! select, permit, and a spawned wait-then-bind tail.

use crate::client::ClusterClient;
use crate::cycle_state::CycleState;
use crate::error::{Diagnosis, Result, SchedulerError};
use crate::event_handler;
use crate::framework::{node_name, pod_uid, PluginRegistry, Status};
use crate::plugins;
use crate::queue::{QueueConfig, QueuedPodInfo, SchedulingQueue};
use crate::waiting_pod::{Handle, WaitingPod, WaitingPods};
use k8s_openapi::api::core::v1::ObjectReference;
use rand::Rng;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use stratus_core::{Binding, Node, ObjectMeta, Pod, ResourceEvent};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Configuration for the scheduler
#[derive(Debug, Clone, Default)]
pub struct SchedulerConfig {
    pub queue: QueueConfig,
}

/// A node's accumulated score for one pod.
#[derive(Debug, Clone)]
pub struct NodeScore {
    pub name: String,
    pub score: i64,
}

/// Pod scheduler
pub struct Scheduler {
    queue: Arc<SchedulingQueue>,
    client: Arc<dyn ClusterClient>,
    waiting_pods: Arc<WaitingPods>,
    registry: PluginRegistry,
}

impl Scheduler {
    /// Create a scheduler with the default plugin registry.
    pub fn new(client: Arc<dyn ClusterClient>, config: SchedulerConfig) -> Self {
        Self::with_plugins(client, config, plugins::default_registry)
    }

    /// Create a scheduler with a caller-built plugin registry. The builder
    /// receives the waiting-pod handle so permit plugins can signal pods.
    pub fn with_plugins(
        client: Arc<dyn ClusterClient>,
        config: SchedulerConfig,
        build: impl FnOnce(Arc<dyn Handle>) -> PluginRegistry,
    ) -> Self {
        let waiting_pods = Arc::new(WaitingPods::default());
        let registry = build(waiting_pods.clone() as Arc<dyn Handle>);
        let queue = Arc::new(SchedulingQueue::new(
            registry.cluster_event_map(),
            config.queue,
        ));
        Self {
            queue,
            client,
            waiting_pods,
            registry,
        }
    }

    /// The scheduling queue, shared with the event handlers.
    pub fn queue(&self) -> &Arc<SchedulingQueue> {
        &self.queue
    }

    /// Wire an API server watch stream into the queue.
    pub fn start_event_handlers(
        &self,
        rx: broadcast::Receiver<ResourceEvent>,
        token: CancellationToken,
    ) -> JoinHandle<()> {
        event_handler::start(
            self.queue.clone(),
            self.registry.event_resource_actions(),
            rx,
            token,
        )
    }

    /// Run the scheduling loop until the token is cancelled or the queue is
    /// closed.
    pub async fn run(self: Arc<Self>, token: CancellationToken) {
        info!("starting scheduler");
        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    info!("scheduler shutting down");
                    return;
                }
                next = self.queue.next_pod() => match next {
                    Some(pinfo) => self.schedule_one(pinfo, &token).await,
                    None => {
                        info!("scheduling queue closed, scheduler stopping");
                        return;
                    }
                },
            }
        }
    }

    /// One scheduling cycle for one pod.
    async fn schedule_one(&self, pinfo: QueuedPodInfo, token: &CancellationToken) {
        let pod = pinfo.pod.clone();
        let pod_name = pod_log_name(&pod);
        info!(pod = %pod_name, attempts = pinfo.attempts, "attempting to schedule pod");

        let state = CycleState::new();

        let nodes = match self.client.list_nodes().await {
            Ok(nodes) => nodes,
            Err(err) => {
                error!(pod = %pod_name, error = %err, "listing nodes failed");
                error_func(&self.queue, pinfo, &err);
                return;
            }
        };
        debug!(pod = %pod_name, nodes = nodes.len(), "listed candidate nodes");

        let feasible = match self.run_filter_plugins(&state, &pod, nodes) {
            Ok(feasible) => feasible,
            Err(err) => {
                warn!(pod = %pod_name, error = %err, "filter phase failed");
                error_func(&self.queue, pinfo, &err);
                return;
            }
        };
        debug!(pod = %pod_name, feasible = feasible.len(), "filter phase passed");

        if let Err(err) = self.run_pre_score_plugins(&state, &pod, &feasible) {
            error!(pod = %pod_name, error = %err, "pre-score phase failed");
            error_func(&self.queue, pinfo, &err);
            return;
        }

        let scores = match self.run_score_plugins(&state, &pod, &feasible) {
            Ok(scores) => scores,
            Err(err) => {
                error!(pod = %pod_name, error = %err, "score phase failed");
                error_func(&self.queue, pinfo, &err);
                return;
            }
        };

        let selected = match select_node(&scores) {
            Ok(selected) => selected,
            Err(err) => {
                error!(pod = %pod_name, error = %err, "node selection failed");
                error_func(&self.queue, pinfo, &err);
                return;
            }
        };
        info!(pod = %pod_name, node = %selected, "selected node");

        let permit_status = match self.run_permit_plugins(&state, &pod, &selected) {
            Ok(status) => status,
            Err(err) => {
                warn!(pod = %pod_name, error = %err, "permit phase failed");
                error_func(&self.queue, pinfo, &err);
                return;
            }
        };
        if permit_status.is_wait() {
            info!(pod = %pod_name, "permit plugins asked to wait");
        }

        // The wait-then-bind tail runs concurrently so the loop can pick up
        // the next pod while this one sits in its permit window.
        let queue = self.queue.clone();
        let client = self.client.clone();
        let waiting_pods = self.waiting_pods.clone();
        let tail_token = token.clone();
        tokio::spawn(async move {
            let pod_name = pod_log_name(&pinfo.pod);
            let uid = pod_uid(&pinfo.pod);
            tokio::select! {
                _ = tail_token.cancelled() => {
                    // Discard the attempt; the rendezvous is torn down so its
                    // timers cannot fire into a dead cycle.
                    if let Some(wp) = waiting_pods.remove(&uid) {
                        wp.reject("Scheduler", "scheduling cycle cancelled");
                    }
                }
                status = wait_on_permit(&waiting_pods, &pinfo.pod) => {
                    if !status.is_success() {
                        let plugin = status.failed_plugin().unwrap_or("Permit").to_string();
                        let err = if status.is_unschedulable() {
                            SchedulerError::permit_rejected(pod_name.clone(), plugin, status.message())
                        } else {
                            SchedulerError::plugin(plugin, status.message())
                        };
                        warn!(pod = %pod_name, error = %err, "pod did not pass its permit wait");
                        error_func(&queue, pinfo, &err);
                        return;
                    }

                    match bind(client.as_ref(), &pinfo.pod, &selected).await {
                        Ok(()) => info!(pod = %pod_name, node = %selected, "bound pod"),
                        Err(err) => {
                            error!(pod = %pod_name, error = %err, "binding failed");
                            error_func(&queue, pinfo, &err);
                        }
                    }
                }
            }
        });
    }

    /// Run every filter plugin over every node; feasible nodes are exactly
    /// the passing nodes in input order. An empty result is a fit error
    /// carrying the union of failed plugins and the per-node statuses.
    fn run_filter_plugins(
        &self,
        state: &CycleState,
        pod: &Pod,
        nodes: Vec<Node>,
    ) -> Result<Vec<Node>> {
        let mut feasible = Vec::new();
        let mut diagnosis = Diagnosis::default();

        for node in nodes {
            let mut status = Status::success();
            for plugin in &self.registry.filter {
                status = plugin.filter(state, pod, &node);
                if !status.is_success() {
                    status = status.with_failed_plugin(plugin.name());
                    diagnosis
                        .unschedulable_plugins
                        .insert(plugin.name().to_string());
                    break;
                }
            }

            if status.is_success() {
                feasible.push(node);
            } else {
                diagnosis.node_to_status.insert(node_name(&node), status);
            }
        }

        if feasible.is_empty() {
            return Err(SchedulerError::no_feasible_node(pod_log_name(pod), diagnosis));
        }

        Ok(feasible)
    }

    fn run_pre_score_plugins(&self, state: &CycleState, pod: &Pod, nodes: &[Node]) -> Result<()> {
        for plugin in &self.registry.pre_score {
            let status = plugin.pre_score(state, pod, nodes);
            if !status.is_success() {
                return Err(SchedulerError::plugin(plugin.name(), status.message()));
            }
        }
        Ok(())
    }

    /// A node's score is the plain sum of the per-plugin scores; weights and
    /// normalization are not applied.
    fn run_score_plugins(
        &self,
        state: &CycleState,
        pod: &Pod,
        nodes: &[Node],
    ) -> Result<Vec<NodeScore>> {
        let mut result: Vec<NodeScore> = nodes
            .iter()
            .map(|n| NodeScore {
                name: node_name(n),
                score: 0,
            })
            .collect();

        for entry in result.iter_mut() {
            for plugin in &self.registry.score {
                let (score, status) = plugin.score(state, pod, &entry.name);
                if !status.is_success() {
                    return Err(SchedulerError::plugin(plugin.name(), status.message()));
                }
                debug!(plugin = plugin.name(), node = %entry.name, score, "score plugin ran");
                entry.score += score;
            }
        }

        Ok(result)
    }

    /// Run the permit plugins and aggregate: any rejection fails the cycle,
    /// any other failure fails the cycle wrapped with the plugin name, and a
    /// Wait (with no rejection) parks the pod in a WaitingPod rendezvous.
    fn run_permit_plugins(&self, state: &CycleState, pod: &Arc<Pod>, node: &str) -> Result<Status> {
        let mut wait_timeouts: HashMap<String, Duration> = HashMap::new();

        for plugin in &self.registry.permit {
            let (status, timeout) = plugin.permit(state, pod, node);
            if status.is_success() {
                continue;
            }
            if status.is_unschedulable() {
                warn!(
                    pod = %pod_log_name(pod),
                    plugin = plugin.name(),
                    status = status.message(),
                    "pod rejected by permit plugin"
                );
                return Err(SchedulerError::permit_rejected(
                    pod_log_name(pod),
                    plugin.name(),
                    status.message(),
                ));
            }
            if status.is_wait() {
                wait_timeouts.insert(plugin.name().to_string(), timeout);
                continue;
            }
            return Err(SchedulerError::plugin(plugin.name(), status.message()));
        }

        if !wait_timeouts.is_empty() {
            let wp = WaitingPod::new(pod.clone(), &wait_timeouts);
            self.waiting_pods.insert(pod_uid(pod), wp);
            return Ok(Status::wait(format!(
                "one or more permit plugins asked to wait and no plugin rejected pod {}",
                pod_log_name(pod)
            )));
        }

        Ok(Status::success())
    }
}

/// Highest score wins; ties are broken by reservoir sampling so each of k
/// equally scored nodes is selected with probability 1/k.
pub(crate) fn select_node(scores: &[NodeScore]) -> Result<String> {
    let Some(first) = scores.first() else {
        return Err(SchedulerError::EmptyNodeScoreList);
    };

    let mut rng = rand::thread_rng();
    let mut selected = first.name.clone();
    let mut max_score = first.score;
    let mut count_at_max = 1u32;

    for candidate in &scores[1..] {
        if candidate.score > max_score {
            max_score = candidate.score;
            selected = candidate.name.clone();
            count_at_max = 1;
        } else if candidate.score == max_score {
            count_at_max += 1;
            if rng.gen_range(0..count_at_max) == 0 {
                selected = candidate.name.clone();
            }
        }
    }

    Ok(selected)
}

/// Block until the pod's rendezvous resolves. Pods that never entered the
/// wait state pass straight through.
async fn wait_on_permit(waiting_pods: &WaitingPods, pod: &Pod) -> Status {
    let uid = pod_uid(pod);
    let Some(wp) = waiting_pods.get(&uid) else {
        return Status::success();
    };

    debug!(pod = %pod_log_name(pod), "pod waiting on permit");
    let status = wp.get_signal().await;
    waiting_pods.remove(&uid);
    debug!(pod = %pod_log_name(pod), "got signal from waiting pod");
    status
}

/// Publish the pod-to-node decision to the control plane.
async fn bind(client: &dyn ClusterClient, pod: &Pod, node: &str) -> Result<()> {
    let binding = Binding {
        metadata: ObjectMeta {
            namespace: pod.metadata.namespace.clone(),
            name: pod.metadata.name.clone(),
            uid: pod.metadata.uid.clone(),
            ..Default::default()
        },
        target: ObjectReference {
            kind: Some("Node".to_string()),
            name: Some(node.to_string()),
            ..Default::default()
        },
    };

    client.bind(&binding).await
}

/// Terminal error path for one attempt: record the fit diagnosis (if any) so
/// the queue can match rescue events, then park the pod as unschedulable.
fn error_func(queue: &SchedulingQueue, mut pinfo: QueuedPodInfo, err: &SchedulerError) {
    pinfo.unschedulable_plugins = match err {
        SchedulerError::NoFeasibleNode { diagnosis, .. } => {
            info!(pod = %pod_log_name(&pinfo.pod), "unable to schedule pod; no fit; waiting");
            diagnosis.unschedulable_plugins.clone()
        }
        _ => {
            error!(pod = %pod_log_name(&pinfo.pod), error = %err, "error scheduling pod; retrying");
            HashSet::new()
        }
    };

    queue.add_unschedulable(pinfo);
}

fn pod_log_name(pod: &Pod) -> String {
    format!(
        "{}/{}",
        pod.metadata.namespace.as_deref().unwrap_or(""),
        pod.metadata.name.as_deref().unwrap_or("")
    )
}
