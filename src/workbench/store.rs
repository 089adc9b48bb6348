//! Process-wide observable workbench state.
//!
//! The store is an explicit context object shared as `Arc<WorkbenchStore>`.
//! Each method is one atomic update under the state lock, followed by a
//! broadcast of the matching [`WorkbenchEvent`]. Misses are no-ops.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use tokio::sync::broadcast;

use super::state::{
    ActionId, ActionState, ActionStatus, ArtifactId, ArtifactState, Document, PreviewInfo,
    WorkbenchEvent, WorkbenchState, WorkbenchView,
};

const EVENT_CAPACITY: usize = 256;

pub struct WorkbenchStore {
    state: Mutex<WorkbenchState>,
    events: broadcast::Sender<WorkbenchEvent>,
    id_counter: AtomicU64,
}

impl Default for WorkbenchStore {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkbenchStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state: Mutex::new(WorkbenchState::default()),
            events,
            id_counter: AtomicU64::new(0),
        }
    }

    /// Receive every change notification from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<WorkbenchEvent> {
        self.events.subscribe()
    }

    /// Clone of the full state.
    pub fn snapshot(&self) -> WorkbenchState {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, WorkbenchState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: WorkbenchEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    /// `type-<unix millis>-<counter>`; the counter keeps same-millisecond ids apart.
    fn next_id(&self, entity_type: &str) -> String {
        let seq = self.id_counter.fetch_add(1, Ordering::Relaxed);
        format!("{}-{}-{}", entity_type, Utc::now().timestamp_millis(), seq)
    }

    // ── Artifacts ────────────────────────────────────────────────────

    pub fn add_artifact(&self, mut artifact: ArtifactState) -> ArtifactId {
        let id = ArtifactId(self.next_id(&artifact.artifact_type));
        artifact.id = id.clone();
        self.lock().artifacts.insert(id.clone(), artifact);
        self.emit(WorkbenchEvent::ArtifactAdded { id: id.clone() });
        id
    }

    pub fn artifact(&self, id: &ArtifactId) -> Option<ArtifactState> {
        self.lock().artifacts.get(id).cloned()
    }

    pub fn first_artifact(&self) -> Option<ArtifactState> {
        self.lock().artifacts.values().next().cloned()
    }

    /// Record the final content of an artifact whose closing tag arrived.
    pub fn close_artifact(&self, id: &ArtifactId, content: &str) -> bool {
        let found = {
            let mut state = self.lock();
            match state.artifacts.get_mut(id) {
                Some(artifact) => {
                    artifact.content = content.to_string();
                    artifact.closed = true;
                    true
                }
                None => false,
            }
        };
        if found {
            self.emit(WorkbenchEvent::ArtifactUpdated { id: id.clone() });
        }
        found
    }

    pub fn remove_artifact(&self, id: &ArtifactId) -> Option<ArtifactState> {
        let removed = self.lock().artifacts.shift_remove(id);
        if removed.is_some() {
            self.emit(WorkbenchEvent::ArtifactRemoved { id: id.clone() });
        }
        removed
    }

    /// Remove the first-inserted artifact whose content equals `content`.
    ///
    /// Ambiguous when several artifacts share content; prefer
    /// [`remove_artifact`](Self::remove_artifact).
    pub fn remove_artifact_by_content(&self, content: &str) -> Option<ArtifactState> {
        let id = self
            .lock()
            .artifacts
            .values()
            .find(|a| a.content == content)
            .map(|a| a.id.clone())?;
        self.remove_artifact(&id)
    }

    // ── Actions ──────────────────────────────────────────────────────

    /// Insert an action and link it to its artifact, if any.
    pub fn add_action(&self, mut action: ActionState) -> ActionId {
        let id = ActionId(self.next_id(&action.action_type));
        action.id = id.clone();
        {
            let mut state = self.lock();
            if let Some(artifact_id) = &action.artifact_id
                && let Some(artifact) = state.artifacts.get_mut(artifact_id)
            {
                artifact.action_ids.push(id.clone());
            }
            state.actions.insert(id.clone(), action);
        }
        self.emit(WorkbenchEvent::ActionAdded { id: id.clone() });
        id
    }

    pub fn action(&self, id: &ActionId) -> Option<ActionState> {
        self.lock().actions.get(id).cloned()
    }

    /// Actions of one artifact in insertion order.
    pub fn artifact_actions(&self, id: &ArtifactId) -> Vec<ActionState> {
        let state = self.lock();
        state
            .artifacts
            .get(id)
            .map(|artifact| {
                artifact
                    .action_ids
                    .iter()
                    .filter_map(|action_id| state.actions.get(action_id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn remove_action(&self, id: &ActionId) -> Option<ActionState> {
        let removed = {
            let mut state = self.lock();
            let removed = state.actions.shift_remove(id);
            if let Some(action) = &removed
                && let Some(artifact_id) = &action.artifact_id
                && let Some(artifact) = state.artifacts.get_mut(artifact_id)
            {
                artifact.action_ids.retain(|a| a != id);
            }
            removed
        };
        if removed.is_some() {
            self.emit(WorkbenchEvent::ActionRemoved { id: id.clone() });
        }
        removed
    }

    /// Remove the first-inserted action whose content equals `content`.
    pub fn remove_action_by_content(&self, content: &str) -> Option<ActionState> {
        let id = self
            .lock()
            .actions
            .values()
            .find(|a| a.content == content)
            .map(|a| a.id.clone())?;
        self.remove_action(&id)
    }

    /// Apply `f` to one action and broadcast its new status.
    fn mutate_action(&self, id: &ActionId, f: impl FnOnce(&mut ActionState)) -> bool {
        let status = {
            let mut state = self.lock();
            match state.actions.get_mut(id) {
                Some(action) => {
                    f(action);
                    Some(action.status)
                }
                None => None,
            }
        };
        match status {
            Some(status) => {
                self.emit(WorkbenchEvent::ActionUpdated {
                    id: id.clone(),
                    status,
                });
                true
            }
            None => false,
        }
    }

    /// Replace the content of the most recently inserted action.
    ///
    /// Only correct while a single action is mid-stream; prefer
    /// [`update_action`](Self::update_action).
    pub fn update_last_action(&self, content: &str) -> bool {
        let last = self.lock().actions.keys().last().cloned();
        match last {
            Some(id) => self.update_action(&id, content),
            None => false,
        }
    }

    /// Replace the content of one action.
    pub fn update_action(&self, id: &ActionId, content: &str) -> bool {
        self.mutate_action(id, |action| action.content = content.to_string())
    }

    /// Final content arrived; the action is ready to run.
    pub fn complete_action(&self, id: &ActionId, content: &str) -> Option<ActionState> {
        let mut completed = None;
        self.mutate_action(id, |action| {
            action.content = content.to_string();
            action.status = ActionStatus::Pending;
            completed = Some(action.clone());
        });
        completed
    }

    pub fn set_action_status(&self, id: &ActionId, status: ActionStatus) -> bool {
        self.mutate_action(id, |action| action.status = status)
    }

    pub fn mark_action_executed(&self, id: &ActionId, executed: bool) -> bool {
        self.mutate_action(id, |action| action.executed = executed)
    }

    pub fn set_action_exit_code(&self, id: &ActionId, exit_code: i32) -> bool {
        self.mutate_action(id, |action| action.exit_code = Some(exit_code))
    }

    pub fn set_action_error(&self, id: &ActionId, error: impl Into<String>) -> bool {
        let error = error.into();
        self.mutate_action(id, |action| {
            action.error = Some(error);
            action.status = ActionStatus::Failed;
        })
    }

    pub fn append_action_output(&self, id: &ActionId, chunk: &str) -> bool {
        let found = match self.lock().actions.get_mut(id) {
            Some(action) => {
                action.output.push_str(chunk);
                true
            }
            None => false,
        };
        if found {
            self.emit(WorkbenchEvent::ActionOutput {
                id: id.clone(),
                chunk: chunk.to_string(),
            });
        }
        found
    }

    // ── UI slice ─────────────────────────────────────────────────────

    pub fn set_show_workbench(&self, show: bool) {
        let changed = {
            let mut state = self.lock();
            std::mem::replace(&mut state.show_workbench, show) != show
        };
        if changed {
            self.emit(WorkbenchEvent::WorkbenchToggled { show });
        }
    }

    pub fn set_current_view(&self, view: WorkbenchView) {
        self.lock().current_view = view;
        self.emit(WorkbenchEvent::ViewChanged { view });
    }

    pub fn add_unsaved_file(&self, path: impl Into<String>) {
        let count = {
            let mut state = self.lock();
            state.unsaved_files.insert(path.into());
            state.unsaved_files.len()
        };
        self.emit(WorkbenchEvent::UnsavedFilesChanged { count });
    }

    pub fn remove_unsaved_file(&self, path: &str) {
        let count = {
            let mut state = self.lock();
            state.unsaved_files.remove(path);
            state.unsaved_files.len()
        };
        self.emit(WorkbenchEvent::UnsavedFilesChanged { count });
    }

    pub fn set_selected_file(&self, path: Option<String>) {
        self.lock().selected_file = path.clone();
        self.emit(WorkbenchEvent::SelectedFileChanged { path });
    }

    pub fn set_documents(&self, files: impl IntoIterator<Item = (String, Document)>) {
        let count = {
            let mut state = self.lock();
            state.files = files.into_iter().collect();
            state.files.len()
        };
        self.emit(WorkbenchEvent::DocumentsChanged { count });
    }

    /// Document of the selected file.
    pub fn current_document(&self) -> Option<Document> {
        let state = self.lock();
        state
            .selected_file
            .as_ref()
            .and_then(|path| state.files.get(path).cloned())
    }

    pub fn set_current_document_content(&self, content: impl Into<String>) {
        let content = content.into();
        self.with_current_document(|doc| doc.content = content);
    }

    pub fn set_current_document_scroll_position(&self, position: u32) {
        self.with_current_document(|doc| doc.scroll_position = Some(position));
    }

    fn with_current_document(&self, f: impl FnOnce(&mut Document)) {
        let count = {
            let mut state = self.lock();
            let Some(path) = state.selected_file.clone() else {
                return;
            };
            f(state.files.entry(path).or_default());
            state.files.len()
        };
        self.emit(WorkbenchEvent::DocumentsChanged { count });
    }

    /// Drop the selected file's document.
    pub fn reset_current_document(&self) {
        let count = {
            let mut state = self.lock();
            let Some(path) = state.selected_file.clone() else {
                return;
            };
            state.files.remove(&path);
            state.files.len()
        };
        self.emit(WorkbenchEvent::DocumentsChanged { count });
    }

    /// Register a preview port, replacing any entry for the same port.
    pub fn add_preview(&self, port: u16, url: impl Into<String>) {
        let ports = {
            let mut state = self.lock();
            state.previews.retain(|p| p.port != port);
            state.previews.push(PreviewInfo {
                port,
                url: url.into(),
            });
            state.previews.iter().map(|p| p.port).collect()
        };
        self.emit(WorkbenchEvent::PreviewsChanged { ports });
    }

    pub fn remove_preview(&self, port: u16) {
        let ports = {
            let mut state = self.lock();
            state.previews.retain(|p| p.port != port);
            state.previews.iter().map(|p| p.port).collect()
        };
        self.emit(WorkbenchEvent::PreviewsChanged { ports });
    }

    /// Flip the terminal panel, or force it with `Some(show)`.
    pub fn toggle_terminal(&self, show: Option<bool>) -> bool {
        let show = {
            let mut state = self.lock();
            state.show_terminal = show.unwrap_or(!state.show_terminal);
            state.show_terminal
        };
        self.emit(WorkbenchEvent::TerminalToggled { show });
        show
    }
}
