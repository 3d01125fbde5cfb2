//! Per-attempt scratchpad shared by the plugins of one scheduling cycle.

use downcast_rs::{impl_downcast, DowncastSync};
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Mutex;
use thiserror::Error;

/// A value stored in the CycleState. Implementors provide a clone so that
/// reads hand out independent copies.
pub trait StateData: DowncastSync + Debug {
    fn clone_data(&self) -> Box<dyn StateData>;
}
impl_downcast!(sync StateData);

#[derive(Debug, Error)]
pub enum CycleStateError {
    #[error("no state found for key {0:?}")]
    NotFound(String),
}

/// CycleState is created by the scheduling loop for a single attempt of a
/// single pod and dropped when the attempt terminates. Plugins use it to pass
/// data between extension points; keys are plugin-chosen strings.
#[derive(Debug, Default)]
pub struct CycleState {
    storage: Mutex<HashMap<String, Box<dyn StateData>>>,
}

impl CycleState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a value under `key`, replacing any previous value.
    pub fn write(&self, key: impl Into<String>, data: Box<dyn StateData>) {
        self.storage.lock().unwrap().insert(key.into(), data);
    }

    /// Read a clone of the value stored under `key`.
    pub fn read(&self, key: &str) -> Result<Box<dyn StateData>, CycleStateError> {
        self.storage
            .lock()
            .unwrap()
            .get(key)
            .map(|data| data.clone_data())
            .ok_or_else(|| CycleStateError::NotFound(key.to_string()))
    }
}
