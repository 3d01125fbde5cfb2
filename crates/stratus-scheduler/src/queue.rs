//! The scheduling queue: three sub-containers coordinated under one mutex.
//!
//! - `active_q`: FIFO of pods ready to attempt now.
//! - `pod_backoff_q`: FIFO of pods still inside their backoff window. The
//!   queue is insertion-ordered, not due-time-ordered; the flusher inspects
//!   the head only and requeues it at the tail when it is not yet due.
//! - `unschedulable_q`: pods parked until a matching cluster event, a backoff
//!   expiry or the leftover timeout moves them back.
//!
//! A single `std::sync::Mutex` guards all three containers and is never held
//! across an await point; a `tokio::sync::Notify` paired with it carries the
//! one signal that matters: "active_q gained an item".

use crate::framework::{ActionType, ClusterEvent, ClusterEventMap, EventResource};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use stratus_core::Pod;
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Sentinel event used when pods have overstayed in the unschedulable set.
/// Wildcard, so it bypasses the per-plugin event matching.
pub const UNSCHEDULABLE_TIMEOUT: ClusterEvent = ClusterEvent {
    resource: EventResource::WildCard,
    action_type: ActionType::ALL,
    label: "UnschedulableTimeout",
};

/// A pod wrapped for the queue.
#[derive(Debug, Clone)]
pub struct QueuedPodInfo {
    pub pod: Arc<Pod>,
    /// Time of the most recent enqueue; refreshed on every re-add to the
    /// unschedulable set.
    pub timestamp: Instant,
    /// Time the pod first entered the queue. Never updated afterwards.
    pub initial_attempt_timestamp: Instant,
    /// Number of completed scheduling attempts.
    pub attempts: u32,
    /// Plugins that caused the most recent unschedulable verdict.
    pub unschedulable_plugins: HashSet<String>,
}

impl QueuedPodInfo {
    fn new(pod: Arc<Pod>) -> Self {
        let now = Instant::now();
        Self {
            pod,
            timestamp: now,
            initial_attempt_timestamp: now,
            attempts: 0,
            unschedulable_plugins: HashSet::new(),
        }
    }
}

/// `name_namespace` key for the unschedulable map.
fn key_func(pinfo: &QueuedPodInfo) -> String {
    format!(
        "{}_{}",
        pinfo.pod.metadata.name.as_deref().unwrap_or(""),
        pinfo.pod.metadata.namespace.as_deref().unwrap_or("")
    )
}

/// Queue tuning knobs.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Backoff for the first failed attempt.
    pub initial_backoff: Duration,
    /// Backoff ceiling.
    pub max_backoff: Duration,
    /// How long a pod may sit in the unschedulable set before it is moved
    /// regardless of cluster events.
    pub pod_max_in_unschedulable_q: Duration,
    /// Tick of both background flushers.
    pub flush_interval: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(10),
            pod_max_in_unschedulable_q: Duration::from_secs(5 * 60),
            flush_interval: Duration::from_secs(1),
        }
    }
}

/// Sizes of the three sub-containers, for logs and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStats {
    pub active: usize,
    pub backoff: usize,
    pub unschedulable: usize,
}

struct QueueInner {
    active_q: VecDeque<QueuedPodInfo>,
    pod_backoff_q: VecDeque<QueuedPodInfo>,
    unschedulable_q: HashMap<String, QueuedPodInfo>,
    closed: bool,
}

/// The scheduling queue. See the module docs for the structure.
pub struct SchedulingQueue {
    inner: Mutex<QueueInner>,
    notify: Notify,
    cluster_event_map: ClusterEventMap,
    config: QueueConfig,
}

impl SchedulingQueue {
    pub fn new(cluster_event_map: ClusterEventMap, config: QueueConfig) -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                active_q: VecDeque::new(),
                pod_backoff_q: VecDeque::new(),
                unschedulable_q: HashMap::new(),
                closed: false,
            }),
            notify: Notify::new(),
            cluster_event_map,
            config,
        }
    }

    /// Append a freshly observed pod to the active queue and wake one waiter.
    /// Callers filter assigned pods upstream.
    pub fn add(&self, pod: Pod) {
        let pinfo = QueuedPodInfo::new(Arc::new(pod));
        {
            let mut inner = self.inner.lock().unwrap();
            inner.active_q.push_back(pinfo);
        }
        self.notify.notify_one();
    }

    /// Block until the active queue is non-empty, then pop its head. Returns
    /// `None` once the queue is closed.
    pub async fn next_pod(&self) -> Option<QueuedPodInfo> {
        loop {
            let notified = self.notify.notified();
            {
                let mut inner = self.inner.lock().unwrap();
                if let Some(pinfo) = inner.active_q.pop_front() {
                    return Some(pinfo);
                }
                if inner.closed {
                    return None;
                }
            }
            debug!("next_pod: waiting for active queue");
            notified.await;
        }
    }

    /// Park a pod that failed its attempt. Refreshes the timestamp, counts
    /// the attempt, and overwrites any prior entry under the same key.
    pub fn add_unschedulable(&self, mut pinfo: QueuedPodInfo) {
        pinfo.timestamp = Instant::now();
        pinfo.attempts += 1;
        info!(
            pod = pinfo.pod.metadata.name.as_deref().unwrap_or(""),
            attempts = pinfo.attempts,
            plugins = ?pinfo.unschedulable_plugins,
            "pod added to unschedulable queue"
        );
        let mut inner = self.inner.lock().unwrap();
        let key = key_func(&pinfo);
        inner.unschedulable_q.insert(key, pinfo);
    }

    /// Drain the unschedulable set through the move policy for `event` and
    /// wake one waiter.
    pub fn move_all_to_active_or_backoff_queue(&self, event: ClusterEvent) {
        {
            let mut inner = self.inner.lock().unwrap();
            let keys: Vec<String> = inner.unschedulable_q.keys().cloned().collect();
            self.move_pods_locked(&mut inner, keys, &event);
        }
        self.notify.notify_one();
    }

    /// Move policy, applied per pod while the lock is held: skip pods whose
    /// recorded plugins do not match the event, and route the rest to the
    /// backoff queue (still inside the backoff window) or the active queue.
    fn move_pods_locked(&self, inner: &mut QueueInner, keys: Vec<String>, event: &ClusterEvent) {
        let now = Instant::now();
        for key in keys {
            let matches = match inner.unschedulable_q.get(&key) {
                // An empty plugin set denotes a failure outside the filter or
                // permit phases; those pods are moved regardless of the event.
                Some(p) => p.unschedulable_plugins.is_empty() || self.pod_matches_event(p, event),
                None => continue,
            };
            if !matches {
                continue;
            }

            let pinfo = inner.unschedulable_q.remove(&key).unwrap();
            let pod_name = pinfo.pod.metadata.name.clone().unwrap_or_default();
            if self.backoff_due(&pinfo) > now {
                debug!(pod = %pod_name, event = event.label, "moving pod to backoff queue");
                inner.pod_backoff_q.push_back(pinfo);
            } else {
                debug!(pod = %pod_name, event = event.label, "moving pod to active queue");
                inner.active_q.push_back(pinfo);
            }
        }
    }

    /// True when the incoming event is a wildcard or some registered
    /// (event, plugins) pair has a compatible event and a plugin in common
    /// with the pod's recorded unschedulable plugins.
    fn pod_matches_event(&self, pinfo: &QueuedPodInfo, event: &ClusterEvent) -> bool {
        if event.is_wildcard() {
            return true;
        }

        for (registered, plugins) in &self.cluster_event_map {
            let event_match = registered.is_wildcard()
                || (registered.resource == event.resource
                    && !(registered.action_type & event.action_type).is_empty());

            if event_match
                && plugins
                    .intersection(&pinfo.unschedulable_plugins)
                    .next()
                    .is_some()
            {
                return true;
            }
        }

        false
    }

    /// Exponential backoff with overflow-safe doubling, capped at the
    /// configured maximum.
    fn backoff_duration(&self, attempts: u32) -> Duration {
        let mut duration = self.config.initial_backoff;
        for _ in 1..attempts {
            if duration > self.config.max_backoff - duration {
                return self.config.max_backoff;
            }
            duration += duration;
        }
        duration
    }

    /// The instant at which the pod completes its backoff.
    fn backoff_due(&self, pinfo: &QueuedPodInfo) -> Instant {
        pinfo.timestamp + self.backoff_duration(pinfo.attempts)
    }

    /// Pump pods whose backoff has completed into the active queue. Inspects
    /// the head only: a not-yet-due head goes back to the tail and ends the
    /// round, so an undue entry costs one inspection per tick.
    fn flush_backoff_q_completed(&self) {
        let now = Instant::now();
        let mut inner = self.inner.lock().unwrap();
        while let Some(pinfo) = inner.pod_backoff_q.pop_front() {
            let pod_name = pinfo.pod.metadata.name.clone().unwrap_or_default();
            if self.backoff_due(&pinfo) > now {
                inner.pod_backoff_q.push_back(pinfo);
                debug!(pod = %pod_name, "backoff not completed, requeued at tail");
                break;
            }
            debug!(pod = %pod_name, "backoff completed, pod moved to active queue");
            inner.active_q.push_back(pinfo);
            self.notify.notify_one();
        }
    }

    /// Move pods that overstayed in the unschedulable set, regardless of
    /// cluster events.
    fn flush_unschedulable_pods_leftover(&self) {
        let now = Instant::now();
        let mut inner = self.inner.lock().unwrap();
        let keys: Vec<String> = inner
            .unschedulable_q
            .iter()
            .filter(|(_, p)| now.duration_since(p.timestamp) > self.config.pod_max_in_unschedulable_q)
            .map(|(k, _)| k.clone())
            .collect();

        if keys.is_empty() {
            return;
        }

        info!(count = keys.len(), "flushing pods left too long in unschedulable queue");
        self.move_pods_locked(&mut inner, keys, &UNSCHEDULABLE_TIMEOUT);
        self.notify.notify_one();
    }

    /// Start the two periodic flushers. They stop when the token is cancelled
    /// or the queue is closed.
    pub fn run(self: Arc<Self>, token: &CancellationToken) {
        let queue = Arc::clone(&self);
        let flush_token = token.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(queue.config.flush_interval);
            loop {
                tokio::select! {
                    _ = flush_token.cancelled() => return,
                    _ = ticker.tick() => {
                        if queue.is_closed() {
                            return;
                        }
                        queue.flush_backoff_q_completed();
                    }
                }
            }
        });

        let queue = self;
        let flush_token = token.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(queue.config.flush_interval);
            loop {
                tokio::select! {
                    _ = flush_token.cancelled() => return,
                    _ = ticker.tick() => {
                        if queue.is_closed() {
                            return;
                        }
                        queue.flush_unschedulable_pods_leftover();
                    }
                }
            }
        });
    }

    /// Close the queue: unblocks every `next_pod` caller and stops the
    /// flushers. The queue is no longer usable afterwards.
    pub fn close(&self) {
        {
            let mut inner = self.inner.lock().unwrap();
            inner.closed = true;
        }
        self.notify.notify_waiters();
    }

    fn is_closed(&self) -> bool {
        self.inner.lock().unwrap().closed
    }

    /// Snapshot of the sub-container sizes.
    pub fn stats(&self) -> QueueStats {
        let inner = self.inner.lock().unwrap();
        QueueStats {
            active: inner.active_q.len(),
            backoff: inner.pod_backoff_q.len(),
            unschedulable: inner.unschedulable_q.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn make_test_pod(name: &str) -> Pod {
        let mut pod = Pod::default();
        pod.metadata.name = Some(name.to_string());
        pod.metadata.namespace = Some("default".to_string());
        pod
    }

    fn node_add_event() -> ClusterEvent {
        ClusterEvent {
            resource: EventResource::Node,
            action_type: ActionType::ADD,
            label: "NodeAdd",
        }
    }

    fn node_delete_event() -> ClusterEvent {
        ClusterEvent {
            resource: EventResource::Node,
            action_type: ActionType::DELETE,
            label: "NodeDelete",
        }
    }

    /// Event map registering NodeNumber for Node/ADD.
    fn test_event_map() -> ClusterEventMap {
        let mut map = HashMap::new();
        map.insert(
            node_add_event(),
            ["NodeNumber".to_string()].into_iter().collect(),
        );
        map
    }

    fn test_queue() -> SchedulingQueue {
        SchedulingQueue::new(test_event_map(), QueueConfig::default())
    }

    #[tokio::test]
    async fn test_add_then_next_pod_round_trip() {
        let queue = test_queue();
        queue.add(make_test_pod("pod1"));

        let pinfo = queue.next_pod().await.unwrap();
        assert_eq!(pinfo.pod.metadata.name.as_deref(), Some("pod1"));
        assert_eq!(pinfo.attempts, 0);
        assert_eq!(pinfo.timestamp, pinfo.initial_attempt_timestamp);
    }

    #[tokio::test]
    async fn test_next_pod_is_fifo() {
        let queue = test_queue();
        queue.add(make_test_pod("pod1"));
        queue.add(make_test_pod("pod2"));
        queue.add(make_test_pod("pod3"));

        for expected in ["pod1", "pod2", "pod3"] {
            let pinfo = queue.next_pod().await.unwrap();
            assert_eq!(pinfo.pod.metadata.name.as_deref(), Some(expected));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_next_pod_blocks_until_add() {
        let queue = Arc::new(test_queue());

        let waiter = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.next_pod().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        queue.add(make_test_pod("pod1"));
        let pinfo = waiter.await.unwrap().unwrap();
        assert_eq!(pinfo.pod.metadata.name.as_deref(), Some("pod1"));
    }

    #[tokio::test]
    async fn test_close_unblocks_next_pod() {
        let queue = Arc::new(test_queue());

        let waiter = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.next_pod().await })
        };

        queue.close();
        assert!(waiter.await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_add_unschedulable_increments_attempts_and_overwrites() {
        let queue = test_queue();
        queue.add(make_test_pod("pod1"));
        let pinfo = queue.next_pod().await.unwrap();

        queue.add_unschedulable(pinfo.clone());
        queue.add_unschedulable(pinfo);

        let stats = queue.stats();
        assert_eq!(stats.unschedulable, 1);
        assert_eq!(stats.active, 0);
        assert_eq!(stats.backoff, 0);

        let inner = queue.inner.lock().unwrap();
        let stored = inner.unschedulable_q.get("pod1_default").unwrap();
        assert_eq!(stored.attempts, 1);
    }

    #[tokio::test]
    async fn test_attempts_accumulate_across_failures() {
        let queue = test_queue();
        queue.add(make_test_pod("pod1"));
        let mut pinfo = queue.next_pod().await.unwrap();

        for expected in 1..=4u32 {
            queue.add_unschedulable(pinfo);
            let inner = queue.inner.lock().unwrap();
            pinfo = inner.unschedulable_q.get("pod1_default").unwrap().clone();
            drop(inner);
            assert_eq!(pinfo.attempts, expected);
        }
    }

    #[test]
    fn test_backoff_duration_doubles_and_caps() {
        let queue = test_queue();
        assert_eq!(queue.backoff_duration(1), Duration::from_secs(1));
        assert_eq!(queue.backoff_duration(2), Duration::from_secs(2));
        assert_eq!(queue.backoff_duration(3), Duration::from_secs(4));
        assert_eq!(queue.backoff_duration(4), Duration::from_secs(8));
        // 16s exceeds the cap.
        assert_eq!(queue.backoff_duration(5), Duration::from_secs(10));
        assert_eq!(queue.backoff_duration(30), Duration::from_secs(10));
    }

    #[test]
    fn test_backoff_duration_bounds() {
        let queue = test_queue();
        let config = QueueConfig::default();
        for attempts in 1..=20u32 {
            let d = queue.backoff_duration(attempts);
            assert!(d >= config.initial_backoff);
            assert!(d <= config.max_backoff);
        }
        // attempts >= 1 + log2(max/initial) pins the duration at the cap.
        for attempts in 5..=20u32 {
            assert_eq!(queue.backoff_duration(attempts), config.max_backoff);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_matching_event_moves_pod() {
        let queue = test_queue();
        queue.add(make_test_pod("pod1"));
        let mut pinfo = queue.next_pod().await.unwrap();
        pinfo
            .unschedulable_plugins
            .insert("NodeNumber".to_string());
        queue.add_unschedulable(pinfo);

        // Past the backoff window, so the pod goes straight to active.
        tokio::time::sleep(Duration::from_secs(2)).await;
        queue.move_all_to_active_or_backoff_queue(node_add_event());

        let stats = queue.stats();
        assert_eq!(stats.active, 1);
        assert_eq!(stats.unschedulable, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_matching_event_skips_pod() {
        let queue = test_queue();
        queue.add(make_test_pod("pod1"));
        let mut pinfo = queue.next_pod().await.unwrap();
        pinfo
            .unschedulable_plugins
            .insert("NodeNumber".to_string());
        queue.add_unschedulable(pinfo);

        tokio::time::sleep(Duration::from_secs(2)).await;
        // NodeNumber registered ADD only; DELETE must not rescue the pod.
        queue.move_all_to_active_or_backoff_queue(node_delete_event());

        let stats = queue.stats();
        assert_eq!(stats.active, 0);
        assert_eq!(stats.unschedulable, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unregistered_plugin_is_not_rescued() {
        let queue = test_queue();
        queue.add(make_test_pod("pod1"));
        let mut pinfo = queue.next_pod().await.unwrap();
        pinfo
            .unschedulable_plugins
            .insert("SomeOtherPlugin".to_string());
        queue.add_unschedulable(pinfo);

        tokio::time::sleep(Duration::from_secs(2)).await;
        queue.move_all_to_active_or_backoff_queue(node_add_event());

        assert_eq!(queue.stats().unschedulable, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_plugin_set_moves_on_any_event() {
        let queue = test_queue();
        queue.add(make_test_pod("pod1"));
        let pinfo = queue.next_pod().await.unwrap();
        assert!(pinfo.unschedulable_plugins.is_empty());
        queue.add_unschedulable(pinfo);

        tokio::time::sleep(Duration::from_secs(2)).await;
        queue.move_all_to_active_or_backoff_queue(node_delete_event());

        let stats = queue.stats();
        assert_eq!(stats.active, 1);
        assert_eq!(stats.unschedulable, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_move_within_backoff_window_goes_to_backoff_queue() {
        let queue = test_queue();
        queue.add(make_test_pod("pod1"));
        let pinfo = queue.next_pod().await.unwrap();
        queue.add_unschedulable(pinfo);

        // Still inside the 1s backoff for the first attempt.
        queue.move_all_to_active_or_backoff_queue(node_add_event());

        let stats = queue.stats();
        assert_eq!(stats.backoff, 1);
        assert_eq!(stats.active, 0);
        assert_eq!(stats.unschedulable, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_backoff_moves_due_pods() {
        let queue = test_queue();
        queue.add(make_test_pod("pod1"));
        let pinfo = queue.next_pod().await.unwrap();
        queue.add_unschedulable(pinfo);
        queue.move_all_to_active_or_backoff_queue(node_add_event());
        assert_eq!(queue.stats().backoff, 1);

        tokio::time::sleep(Duration::from_secs(2)).await;
        queue.flush_backoff_q_completed();

        let stats = queue.stats();
        assert_eq!(stats.backoff, 0);
        assert_eq!(stats.active, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_backoff_undue_head_stops_the_round() {
        let queue = test_queue();
        for name in ["pod1", "pod2"] {
            queue.add(make_test_pod(name));
            let pinfo = queue.next_pod().await.unwrap();
            queue.add_unschedulable(pinfo);
        }
        queue.move_all_to_active_or_backoff_queue(node_delete_event());
        assert_eq!(queue.stats().backoff, 2);

        // Neither pod is due: one head inspection, requeue at tail, stop.
        queue.flush_backoff_q_completed();
        let stats = queue.stats();
        assert_eq!(stats.backoff, 2);
        assert_eq!(stats.active, 0);

        // The inspected head went to the tail, so the order rotated.
        let inner = queue.inner.lock().unwrap();
        assert_eq!(
            inner.pod_backoff_q[0].pod.metadata.name.as_deref(),
            Some("pod2")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_leftover_flush_uses_wildcard_timeout() {
        let queue = test_queue();
        queue.add(make_test_pod("pod1"));
        let mut pinfo = queue.next_pod().await.unwrap();
        // A plugin nothing registered for: only the wildcard timeout can move it.
        pinfo
            .unschedulable_plugins
            .insert("SomeOtherPlugin".to_string());
        queue.add_unschedulable(pinfo);

        queue.flush_unschedulable_pods_leftover();
        assert_eq!(queue.stats().unschedulable, 1);

        tokio::time::sleep(Duration::from_secs(5 * 60 + 1)).await;
        queue.flush_unschedulable_pods_leftover();

        let stats = queue.stats();
        assert_eq!(stats.unschedulable, 0);
        assert_eq!(stats.active, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_flushers_drain_backoff() {
        let queue = Arc::new(test_queue());
        let token = CancellationToken::new();
        queue.clone().run(&token);

        queue.add(make_test_pod("pod1"));
        let pinfo = queue.next_pod().await.unwrap();
        queue.add_unschedulable(pinfo);
        queue.move_all_to_active_or_backoff_queue(node_delete_event());
        assert_eq!(queue.stats().backoff, 1);

        tokio::time::sleep(Duration::from_secs(3)).await;
        let pinfo = queue.next_pod().await.unwrap();
        assert_eq!(pinfo.pod.metadata.name.as_deref(), Some("pod1"));
        assert_eq!(pinfo.attempts, 1);

        token.cancel();
    }

    #[tokio::test]
    async fn test_no_pod_in_two_sub_queues() {
        let queue = test_queue();
        queue.add(make_test_pod("pod1"));
        let pinfo = queue.next_pod().await.unwrap();
        queue.add_unschedulable(pinfo);

        queue.move_all_to_active_or_backoff_queue(node_delete_event());

        let stats = queue.stats();
        assert_eq!(stats.active + stats.backoff + stats.unschedulable, 1);
    }
}
