//! Applies completed actions to the workspace, one at a time, in the order
//! their closing tags arrived.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use super::action_runner::{ActionRunner, RunnerCallbacks};
use crate::errors::ExecutorError;
use crate::shell::ShellBridge;
use crate::workbench::{ActionState, ActionStatus, WorkbenchStore};

/// Runner callbacks that record lifecycle and output in the store.
pub struct StoreRunnerCallbacks {
    store: Arc<WorkbenchStore>,
}

impl StoreRunnerCallbacks {
    pub fn new(store: Arc<WorkbenchStore>) -> Self {
        Self { store }
    }
}

impl RunnerCallbacks for StoreRunnerCallbacks {
    fn on_start(&mut self, action: &ActionState) {
        self.store.mark_action_executed(&action.id, action.executed);
        self.store.set_action_status(&action.id, ActionStatus::Running);
    }

    fn on_data(&mut self, action: &ActionState, chunk: &str) {
        self.store.append_action_output(&action.id, chunk);
    }

    fn on_end(&mut self, action: &ActionState) {
        self.store.mark_action_executed(&action.id, action.executed);
    }
}

/// Final counts of one executor run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExecutionSummary {
    pub complete: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl ExecutionSummary {
    fn record(&mut self, status: ActionStatus) {
        match status {
            ActionStatus::Complete => self.complete += 1,
            ActionStatus::Skipped => self.skipped += 1,
            _ => self.failed += 1,
        }
    }
}

pub struct ActionExecutor {
    runner: ActionRunner<StoreRunnerCallbacks>,
    store: Arc<WorkbenchStore>,
    bridge: Arc<ShellBridge>,
    workspace: PathBuf,
    session_id: String,
}

impl ActionExecutor {
    pub fn new(store: Arc<WorkbenchStore>, bridge: Arc<ShellBridge>, workspace: PathBuf) -> Self {
        Self {
            runner: ActionRunner::new(StoreRunnerCallbacks::new(store.clone())),
            store,
            bridge,
            workspace,
            session_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Execute queued actions until every sender is dropped.
    pub async fn run(mut self, mut queue: mpsc::UnboundedReceiver<ActionState>) -> ExecutionSummary {
        let mut summary = ExecutionSummary::default();
        while let Some(action) = queue.recv().await {
            let status = self.execute(&action).await;
            summary.record(status);
        }
        info!(
            complete = summary.complete,
            failed = summary.failed,
            skipped = summary.skipped,
            "action queue drained"
        );
        summary
    }

    /// Run one action and record its final status in the store.
    pub async fn execute(&mut self, action: &ActionState) -> ActionStatus {
        self.runner.start(action);

        let status = match self.apply(action).await {
            Ok(status) => {
                self.store.set_action_status(&action.id, status);
                status
            }
            Err(e) => {
                error!(action = %action.id, error = %e, "action failed");
                self.store.set_action_error(&action.id, e.to_string());
                ActionStatus::Failed
            }
        };

        self.runner.stop(action);
        status
    }

    async fn apply(&mut self, action: &ActionState) -> Result<ActionStatus, ExecutorError> {
        match action.action_type.as_str() {
            "file" => {
                let path = self.write_file(action)?;
                info!(action = %action.id, path = %path.display(), "file written");
                Ok(ActionStatus::Complete)
            }
            "shell" | "command" => self.run_shell(action).await,
            other => {
                warn!(action = %action.id, action_type = other, "no executor for action type");
                Ok(ActionStatus::Skipped)
            }
        }
    }

    fn write_file(&self, action: &ActionState) -> Result<PathBuf, ExecutorError> {
        let rel = action
            .attribute("filePath")
            .or_else(|| action.attribute("path"))
            .ok_or_else(|| ExecutorError::MissingFilePath {
                action_id: action.id.to_string(),
            })?;
        let path = resolve_in_workspace(&self.workspace, rel)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ExecutorError::WriteFailed {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let mut content = action.content.clone();
        if !content.is_empty() && !content.ends_with('\n') {
            content.push('\n');
        }
        std::fs::write(&path, content).map_err(|source| ExecutorError::WriteFailed {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }

    async fn run_shell(&mut self, action: &ActionState) -> Result<ActionStatus, ExecutorError> {
        let bridge = self.bridge.clone();
        let runner = &mut self.runner;
        let result = bridge
            .execute_command_with(&self.session_id, &action.content, |chunk| {
                runner.push_data(action, chunk)
            })
            .await?;

        if result.timed_out {
            if action.stream {
                // Long-running (dev server): still going is success
                info!(action = %action.id, "streaming action left running");
                return Ok(ActionStatus::Complete);
            }
            self.store.set_action_error(
                &action.id,
                format!(
                    "timed out after {:?}",
                    self.bridge.options().command_timeout
                ),
            );
            return Ok(ActionStatus::Failed);
        }

        self.store.set_action_exit_code(&action.id, result.exit_code);
        if result.exit_code != 0 {
            self.store
                .set_action_error(&action.id, format!("exit code {}", result.exit_code));
            return Ok(ActionStatus::Failed);
        }
        Ok(ActionStatus::Complete)
    }
}

/// Join `rel` onto `root`, refusing absolute paths and `..` that climbs out.
pub fn resolve_in_workspace(root: &Path, rel: &str) -> Result<PathBuf, ExecutorError> {
    let escape = || ExecutorError::PathEscapesWorkspace {
        path: PathBuf::from(rel),
    };

    let mut clean = PathBuf::new();
    for component in Path::new(rel).components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if !clean.pop() {
                    return Err(escape());
                }
            }
            Component::RootDir | Component::Prefix(_) => return Err(escape()),
        }
    }
    if clean.as_os_str().is_empty() {
        return Err(escape());
    }
    Ok(root.join(clean))
}
