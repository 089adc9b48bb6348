//! Workbench state types.

use std::collections::{BTreeMap, BTreeSet};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Identifier of an artifact in the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactId(pub String);

/// Identifier of an action in the store and in the runner's execution table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionId(pub String);

impl std::fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::fmt::Display for ActionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle of an action from first sight in the stream to execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    /// Content still arriving
    #[default]
    Streaming,
    /// Closing tag seen, waiting for the executor
    Pending,
    Running,
    Complete,
    Failed,
    /// Stream ended before the closing tag
    Aborted,
    /// Action type has no executor
    Skipped,
}

impl ActionStatus {
    /// Whether the action reached a final state.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ActionStatus::Complete | ActionStatus::Failed | ActionStatus::Aborted | ActionStatus::Skipped
        )
    }
}

impl std::fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ActionStatus::Streaming => "streaming",
            ActionStatus::Pending => "pending",
            ActionStatus::Running => "running",
            ActionStatus::Complete => "complete",
            ActionStatus::Failed => "failed",
            ActionStatus::Aborted => "aborted",
            ActionStatus::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// One effectful step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionState {
    pub id: ActionId,
    #[serde(default)]
    pub artifact_id: Option<ArtifactId>,
    #[serde(rename = "type")]
    pub action_type: String,
    pub content: String,
    #[serde(default)]
    pub attributes: IndexMap<String, String>,
    /// Long-running action (dev server); stopping it early is not a failure
    #[serde(default)]
    pub stream: bool,
    #[serde(default)]
    pub executed: bool,
    #[serde(default)]
    pub status: ActionStatus,
    #[serde(default)]
    pub output: String,
    #[serde(default)]
    pub exit_code: Option<i32>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ActionState {
    /// A new action; the id is assigned by the store.
    pub fn new(action_type: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: ActionId(String::new()),
            artifact_id: None,
            action_type: action_type.into(),
            content: content.into(),
            attributes: IndexMap::new(),
            stream: false,
            executed: false,
            status: ActionStatus::default(),
            output: String::new(),
            exit_code: None,
            error: None,
        }
    }

    pub fn with_attributes(mut self, attributes: IndexMap<String, String>) -> Self {
        self.stream = attributes
            .get("stream")
            .is_some_and(|v| v.eq_ignore_ascii_case("true"));
        self.attributes = attributes;
        self
    }

    pub fn with_artifact(mut self, artifact_id: Option<ArtifactId>) -> Self {
        self.artifact_id = artifact_id;
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

/// A bundle of generated output holding ordered actions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactState {
    pub id: ArtifactId,
    #[serde(rename = "type")]
    pub artifact_type: String,
    pub content: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub attributes: IndexMap<String, String>,
    #[serde(default)]
    pub closed: bool,
    /// Actions in insertion order
    #[serde(default)]
    pub action_ids: Vec<ActionId>,
}

impl ArtifactState {
    /// A new artifact; the id is assigned by the store.
    pub fn new(artifact_type: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: ArtifactId(String::new()),
            artifact_type: artifact_type.into(),
            content: content.into(),
            title: None,
            attributes: IndexMap::new(),
            closed: false,
            action_ids: Vec::new(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_attributes(mut self, attributes: IndexMap<String, String>) -> Self {
        self.attributes = attributes;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkbenchView {
    #[default]
    Code,
    Preview,
}

/// A dev server port exposed by the workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewInfo {
    pub port: u16,
    pub url: String,
}

/// An open editor document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub content: String,
    #[serde(default)]
    pub scroll_position: Option<u32>,
}

/// Full store contents. Cloned out by `WorkbenchStore::snapshot`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkbenchState {
    pub artifacts: IndexMap<ArtifactId, ArtifactState>,
    pub actions: IndexMap<ActionId, ActionState>,
    pub show_workbench: bool,
    pub current_view: WorkbenchView,
    pub unsaved_files: BTreeSet<String>,
    pub files: BTreeMap<String, Document>,
    pub previews: Vec<PreviewInfo>,
    pub selected_file: Option<String>,
    pub show_terminal: bool,
}

/// Change notification broadcast after every store mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkbenchEvent {
    ArtifactAdded { id: ArtifactId },
    ArtifactUpdated { id: ArtifactId },
    ArtifactRemoved { id: ArtifactId },
    ActionAdded { id: ActionId },
    ActionUpdated { id: ActionId, status: ActionStatus },
    ActionOutput { id: ActionId, chunk: String },
    ActionRemoved { id: ActionId },
    WorkbenchToggled { show: bool },
    ViewChanged { view: WorkbenchView },
    UnsavedFilesChanged { count: usize },
    SelectedFileChanged { path: Option<String> },
    DocumentsChanged { count: usize },
    PreviewsChanged { ports: Vec<u16> },
    TerminalToggled { show: bool },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_attribute_sets_flag() {
        let mut attrs = IndexMap::new();
        attrs.insert("stream".to_string(), "TRUE".to_string());
        let action = ActionState::new("shell", "npm run dev").with_attributes(attrs);
        assert!(action.stream);

        let action = ActionState::new("shell", "ls").with_attributes(IndexMap::new());
        assert!(!action.stream);
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!ActionStatus::Streaming.is_terminal());
        assert!(!ActionStatus::Pending.is_terminal());
        assert!(!ActionStatus::Running.is_terminal());
        assert!(ActionStatus::Complete.is_terminal());
        assert!(ActionStatus::Failed.is_terminal());
        assert!(ActionStatus::Aborted.is_terminal());
        assert!(ActionStatus::Skipped.is_terminal());
    }

    #[test]
    fn test_event_serialization() {
        let event = WorkbenchEvent::ActionUpdated {
            id: ActionId("shell-1-0".to_string()),
            status: ActionStatus::Running,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(
            json,
            r#"{"type":"action_updated","id":"shell-1-0","status":"running"}"#
        );
    }
}
