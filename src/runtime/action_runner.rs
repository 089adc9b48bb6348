//! Execution bookkeeping for actions.
//!
//! The runner only tracks which actions are running and reports lifecycle
//! callbacks. It spawns nothing itself: shell processes belong to the
//! bridge and are attached from outside with [`ActionRunner::attach_process`].

use std::collections::HashMap;
use std::io;

use tracing::{debug, warn};

use crate::workbench::{ActionId, ActionState};

/// A running process that can be stopped.
///
/// Implementors expose one or both capabilities. `None` means the
/// capability is not available for this handle.
pub trait ActionProcess: Send {
    fn kill(&mut self) -> Option<io::Result<()>> {
        None
    }

    fn terminate(&mut self) -> Option<io::Result<()>> {
        None
    }
}

impl ActionProcess for tokio::process::Child {
    fn kill(&mut self) -> Option<io::Result<()>> {
        Some(self.start_kill())
    }
}

/// Lifecycle notifications. All methods default to no-ops.
pub trait RunnerCallbacks {
    /// The action was started; `executed` is already `true`.
    fn on_start(&mut self, _action: &ActionState) {}
    /// Partial output of a running action.
    fn on_data(&mut self, _action: &ActionState, _chunk: &str) {}
    /// The action was stopped; `executed` is false for a stopped streaming action.
    fn on_end(&mut self, _action: &ActionState) {}
}

/// One live execution.
pub struct ExecutionRecord {
    pub process: Option<Box<dyn ActionProcess>>,
    pub is_streaming: bool,
}

pub struct ActionRunner<C: RunnerCallbacks> {
    executions: HashMap<ActionId, ExecutionRecord>,
    callbacks: C,
}

impl<C: RunnerCallbacks> ActionRunner<C> {
    pub fn new(callbacks: C) -> Self {
        Self {
            executions: HashMap::new(),
            callbacks,
        }
    }

    pub fn callbacks(&self) -> &C {
        &self.callbacks
    }

    /// Begin tracking `action`. A second start for the same id is ignored.
    pub fn start(&mut self, action: &ActionState) {
        if self.executions.contains_key(&action.id) {
            warn!(action = %action.id, "action already running");
            return;
        }

        self.executions.insert(
            action.id.clone(),
            ExecutionRecord {
                process: None,
                is_streaming: action.stream,
            },
        );
        debug!(action = %action.id, streaming = action.stream, "action started");

        let mut started = action.clone();
        started.executed = true;
        self.callbacks.on_start(&started);
    }

    /// Stop tracking `action`, killing an attached process.
    /// Stopping an action that is not running is ignored.
    pub fn stop(&mut self, action: &ActionState) {
        let Some(record) = self.executions.remove(&action.id) else {
            warn!(action = %action.id, "action not running");
            return;
        };

        if let Some(mut process) = record.process {
            let outcome = process.kill().or_else(|| process.terminate());
            match outcome {
                Some(Ok(())) => debug!(action = %action.id, "process stopped"),
                Some(Err(e)) => warn!(action = %action.id, error = %e, "failed to stop process"),
                None => warn!(action = %action.id, "process has no kill or terminate capability"),
            }
        }

        let mut ended = action.clone();
        ended.executed = !record.is_streaming;
        self.callbacks.on_end(&ended);
    }

    pub fn is_running(&self, id: &ActionId) -> bool {
        self.executions.contains_key(id)
    }

    /// Attach a process handle to a running action. Returns false if the
    /// action is not running.
    pub fn attach_process(&mut self, id: &ActionId, process: Box<dyn ActionProcess>) -> bool {
        match self.executions.get_mut(id) {
            Some(record) => {
                record.process = Some(process);
                true
            }
            None => {
                warn!(action = %id, "cannot attach process to idle action");
                false
            }
        }
    }

    /// Forward partial output of a running action.
    pub fn push_data(&mut self, action: &ActionState, chunk: &str) {
        if self.is_running(&action.id) {
            self.callbacks.on_data(action, chunk);
        }
    }
}
