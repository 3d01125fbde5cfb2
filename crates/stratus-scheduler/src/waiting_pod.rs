//! Per-pod rendezvous for permit plugins that delay the binding.

use crate::framework::Status;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use stratus_core::Pod;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tracing::debug;

struct WaitingPodInner {
    /// Permit plugins that still have to allow the pod.
    pending: HashSet<String>,
    tx: Option<oneshot::Sender<Status>>,
    rx: Option<oneshot::Receiver<Status>>,
    /// Terminal status, set exactly once. Allow/reject are no-ops afterwards.
    terminal: Option<Status>,
    timers: Vec<AbortHandle>,
}

/// WaitingPod coordinates the allow/reject/timeout signals for one pod whose
/// permit phase returned Wait. Construction starts one reject timer per
/// waiting plugin; the first of allow-completion, rejection or timeout
/// resolves the single-shot signal, and every later signal is ignored.
pub struct WaitingPod {
    pod: Arc<Pod>,
    inner: Mutex<WaitingPodInner>,
}

impl WaitingPod {
    /// Create the rendezvous and start the per-plugin timeout timers. The
    /// timers hold weak references so a discarded pod never receives a late
    /// rejection.
    pub fn new(pod: Arc<Pod>, plugin_timeouts: &HashMap<String, Duration>) -> Arc<Self> {
        let (tx, rx) = oneshot::channel();
        let wp = Arc::new(Self {
            pod,
            inner: Mutex::new(WaitingPodInner {
                pending: plugin_timeouts.keys().cloned().collect(),
                tx: Some(tx),
                rx: Some(rx),
                terminal: None,
                timers: Vec::new(),
            }),
        });

        for (plugin, timeout) in plugin_timeouts {
            let weak: Weak<WaitingPod> = Arc::downgrade(&wp);
            let plugin = plugin.clone();
            let timeout = *timeout;
            let handle = tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                if let Some(wp) = weak.upgrade() {
                    wp.reject(&plugin, &format!("permit plugin {} timed out", plugin));
                }
            });
            wp.inner.lock().unwrap().timers.push(handle.abort_handle());
        }

        {
            // No plugin asked to wait: resolve right away.
            let mut inner = wp.inner.lock().unwrap();
            if inner.pending.is_empty() {
                Self::resolve(&mut inner, Status::success());
            }
        }

        wp
    }

    pub fn pod(&self) -> &Arc<Pod> {
        &self.pod
    }

    /// Mark `plugin` as satisfied. Once every waiting plugin has allowed, the
    /// signal resolves with success. No-op after resolution.
    pub fn allow(&self, plugin: &str) {
        let mut inner = self.inner.lock().unwrap();
        if inner.terminal.is_some() {
            return;
        }
        inner.pending.remove(plugin);
        debug!(
            plugin,
            remaining = inner.pending.len(),
            "permit plugin allowed waiting pod"
        );
        if inner.pending.is_empty() {
            Self::resolve(&mut inner, Status::success());
        }
    }

    /// Resolve the signal with Unschedulable, recording the rejecting plugin.
    /// Cancels all pending timers. No-op after resolution.
    pub fn reject(&self, plugin: &str, reason: &str) {
        let mut inner = self.inner.lock().unwrap();
        if inner.terminal.is_some() {
            return;
        }
        Self::resolve(
            &mut inner,
            Status::unschedulable(reason).with_failed_plugin(plugin),
        );
    }

    fn resolve(inner: &mut WaitingPodInner, status: Status) {
        for timer in inner.timers.drain(..) {
            timer.abort();
        }
        inner.terminal = Some(status.clone());
        if let Some(tx) = inner.tx.take() {
            let _ = tx.send(status);
        }
    }

    /// Await the terminal status. The signal is productively observable once;
    /// later calls return the cached terminal status.
    pub async fn get_signal(&self) -> Status {
        let rx = self.inner.lock().unwrap().rx.take();
        match rx {
            Some(rx) => rx
                .await
                .unwrap_or_else(|_| Status::error("waiting pod dropped before a permit signal")),
            None => {
                let inner = self.inner.lock().unwrap();
                inner
                    .terminal
                    .clone()
                    .unwrap_or_else(|| Status::error("permit signal already consumed"))
            }
        }
    }
}

/// Map of waiting pods keyed by pod UID. The scheduling loop inserts before
/// spawning the waiter and the waiter removes on completion; permit plugins
/// look pods up through the [`Handle`] trait.
#[derive(Default)]
pub struct WaitingPods {
    pods: Mutex<HashMap<String, Arc<WaitingPod>>>,
}

impl WaitingPods {
    pub fn insert(&self, uid: impl Into<String>, wp: Arc<WaitingPod>) {
        self.pods.lock().unwrap().insert(uid.into(), wp);
    }

    pub fn get(&self, uid: &str) -> Option<Arc<WaitingPod>> {
        self.pods.lock().unwrap().get(uid).cloned()
    }

    pub fn remove(&self, uid: &str) -> Option<Arc<WaitingPod>> {
        self.pods.lock().unwrap().remove(uid)
    }
}

/// Access to waiting pods for permit plugins.
pub trait Handle: Send + Sync {
    fn get_waiting_pod(&self, uid: &str) -> Option<Arc<WaitingPod>>;
}

impl Handle for WaitingPods {
    fn get_waiting_pod(&self, uid: &str) -> Option<Arc<WaitingPod>> {
        self.get(uid)
    }
}
