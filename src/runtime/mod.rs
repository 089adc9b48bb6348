//! Action execution: bookkeeping (`action_runner`) and effects (`executor`).

mod action_runner;
mod executor;

pub use action_runner::{ActionProcess, ActionRunner, ExecutionRecord, RunnerCallbacks};
pub use executor::{ActionExecutor, ExecutionSummary, StoreRunnerCallbacks, resolve_in_workspace};
