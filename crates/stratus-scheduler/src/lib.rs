//! Stratus Scheduler - Pod to Node scheduling
//!
//! This crate provides:
//! - The scheduling queue (active / backoff / unschedulable) driven by cluster events
//! - The scheduling cycle: filter, pre-score, score, select, permit, bind
//! - The permit phase rendezvous (WaitingPod) for plugins that delay binding
//! - The plugin framework and the reference plugins
//! - Event handlers wiring API server watch streams into the queue

pub mod client;
pub mod cycle_state;
pub mod error;
pub mod event_handler;
pub mod framework;
pub mod mock;
pub mod plugins;
pub mod queue;
pub mod scheduler;
pub mod waiting_pod;

// Re-export commonly used types
pub use client::ClusterClient;
pub use cycle_state::{CycleState, CycleStateError, StateData};
pub use error::{Diagnosis, Result, SchedulerError};
pub use framework::{
    ActionType, ClusterEvent, Code, EventResource, FilterPlugin, PermitPlugin, Plugin,
    PluginRegistry, PreScorePlugin, ScorePlugin, Status,
};
pub use queue::{QueueConfig, QueuedPodInfo, SchedulingQueue};
pub use scheduler::{Scheduler, SchedulerConfig};
pub use waiting_pod::{Handle, WaitingPod, WaitingPods};
