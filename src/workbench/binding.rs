//! Parser callbacks wired to the workbench store.
//!
//! Parser `tag_id`s are mapped to store ids, so updates and removals always
//! target the exact element even when two elements share content. Actions
//! whose closing tag arrived are handed to the executor queue.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::state::{ActionId, ActionState, ActionStatus, ArtifactId, ArtifactState};
use super::store::WorkbenchStore;
use crate::parser::{ActionData, ArtifactData, ParserCallbacks};

pub struct WorkbenchBinding {
    store: Arc<WorkbenchStore>,
    queue: Option<mpsc::UnboundedSender<ActionState>>,
    artifacts: HashMap<u64, ArtifactId>,
    actions: HashMap<u64, ActionId>,
    commentary: String,
}

impl WorkbenchBinding {
    /// Binding that only mirrors parser events into the store.
    pub fn new(store: Arc<WorkbenchStore>) -> Self {
        Self {
            store,
            queue: None,
            artifacts: HashMap::new(),
            actions: HashMap::new(),
            commentary: String::new(),
        }
    }

    /// Also send every completed action to `queue` for execution.
    pub fn with_queue(mut self, queue: mpsc::UnboundedSender<ActionState>) -> Self {
        self.queue = Some(queue);
        self
    }

    /// Latest prose outside any tag.
    pub fn commentary(&self) -> &str {
        &self.commentary
    }

    pub fn store(&self) -> &Arc<WorkbenchStore> {
        &self.store
    }

    /// Store id of the action the parser numbered `tag_id`.
    pub fn action_id(&self, tag_id: u64) -> Option<&ActionId> {
        self.actions.get(&tag_id)
    }

    pub fn artifact_id(&self, tag_id: u64) -> Option<&ArtifactId> {
        self.artifacts.get(&tag_id)
    }
}

impl ParserCallbacks for WorkbenchBinding {
    fn on_artifact_open(&mut self, data: &ArtifactData) {
        self.store.set_show_workbench(true);
        let title = data
            .attribute("title")
            .map(str::to_string)
            .unwrap_or_else(|| data.tag_type.clone());
        let id = self.store.add_artifact(
            ArtifactState::new(&data.tag_type, &data.content)
                .with_title(title)
                .with_attributes(data.attributes.clone()),
        );
        debug!(tag_id = data.tag_id, artifact = %id, "artifact opened");
        self.artifacts.insert(data.tag_id, id);
    }

    fn on_artifact_close(&mut self, data: &ArtifactData) {
        match self.artifacts.get(&data.tag_id) {
            Some(id) => {
                self.store.close_artifact(id, &data.content);
            }
            None => warn!(tag_id = data.tag_id, "close for unknown artifact"),
        }
    }

    fn on_action_open(&mut self, data: &ActionData) {
        let artifact_id = data
            .parent
            .and_then(|parent| self.artifacts.get(&parent).cloned());
        let id = self.store.add_action(
            ActionState::new(&data.tag_type, &data.content)
                .with_attributes(data.attributes.clone())
                .with_artifact(artifact_id),
        );
        debug!(tag_id = data.tag_id, action = %id, "action opened");
        self.actions.insert(data.tag_id, id);
    }

    fn on_action_stream(&mut self, data: &ActionData) {
        if let Some(id) = self.actions.get(&data.tag_id) {
            self.store.update_action(id, &data.content);
        }
    }

    fn on_action_close(&mut self, data: &ActionData) {
        let Some(id) = self.actions.get(&data.tag_id) else {
            warn!(tag_id = data.tag_id, "close for unknown action");
            return;
        };

        if !data.closed {
            self.store.update_action(id, &data.content);
            self.store.set_action_status(id, ActionStatus::Aborted);
            warn!(action = %id, "action never closed, not executing");
            return;
        }

        let Some(action) = self.store.complete_action(id, &data.content) else {
            return;
        };
        if let Some(queue) = &self.queue
            && queue.send(action).is_err()
        {
            warn!(action = %id, "executor queue closed, action will not run");
        }
    }

    fn on_stream(&mut self, text: &str) {
        self.commentary = text.to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{StreamingMessageParser, parse_message};

    #[test]
    fn test_artifact_with_actions_populates_store() {
        let store = Arc::new(WorkbenchStore::new());
        let mut binding = WorkbenchBinding::new(store.clone());
        parse_message(
            r#"Setting up.<artifact type="project" title="Todo"><action type="file" filePath="a.txt">hi</action><action type="shell">ls</action></artifact>"#,
            &mut binding,
        );

        let state = store.snapshot();
        assert!(state.show_workbench);
        assert_eq!(state.artifacts.len(), 1);
        let artifact = state.artifacts.values().next().unwrap();
        assert_eq!(artifact.title.as_deref(), Some("Todo"));
        assert!(artifact.closed);
        assert_eq!(artifact.action_ids.len(), 2);

        let actions: Vec<_> = state.actions.values().collect();
        assert_eq!(actions[0].action_type, "file");
        assert_eq!(actions[0].attribute("filePath"), Some("a.txt"));
        assert_eq!(actions[1].content, "ls");
        assert!(actions.iter().all(|a| a.status == ActionStatus::Pending));
        assert_eq!(binding.commentary(), "Setting up.");
    }

    #[test]
    fn test_artifact_title_defaults_to_type() {
        let store = Arc::new(WorkbenchStore::new());
        let mut binding = WorkbenchBinding::new(store.clone());
        parse_message(r#"<artifact type="code">x</artifact>"#, &mut binding);
        let artifact = store.first_artifact().unwrap();
        assert_eq!(artifact.title.as_deref(), Some("code"));
        assert_eq!(artifact.content, "x");
    }

    #[test]
    fn test_streamed_action_updates_by_id() {
        let store = Arc::new(WorkbenchStore::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut parser =
            StreamingMessageParser::new(WorkbenchBinding::new(store.clone()).with_queue(tx));

        parser.feed(r#"<action type="shell">npm "#);
        parser.feed("install");
        assert!(rx.try_recv().is_err());
        parser.feed("</action>");

        let queued = rx.try_recv().unwrap();
        assert_eq!(queued.content, "npm install");
        assert_eq!(queued.status, ActionStatus::Pending);
        assert_eq!(store.snapshot().actions.len(), 1);
    }

    #[test]
    fn test_identical_content_actions_stay_distinct() {
        let store = Arc::new(WorkbenchStore::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut binding = WorkbenchBinding::new(store.clone()).with_queue(tx);
        parse_message(
            r#"<action type="shell">ls</action><action type="shell">ls</action>"#,
            &mut binding,
        );

        let first = rx.try_recv().unwrap();
        let second = rx.try_recv().unwrap();
        assert_ne!(first.id, second.id);
        assert_eq!(binding.action_id(0), Some(&first.id));
    }

    #[test]
    fn test_unterminated_action_is_aborted_not_queued() {
        let store = Arc::new(WorkbenchStore::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut parser =
            StreamingMessageParser::new(WorkbenchBinding::new(store.clone()).with_queue(tx));
        parser.feed(r#"<action type="shell">rm -rf bu"#);
        parser.end();

        assert!(rx.try_recv().is_err());
        let action = store.snapshot().actions.into_values().next().unwrap();
        assert_eq!(action.status, ActionStatus::Aborted);
        assert_eq!(action.content, "rm -rf bu");
    }

    #[test]
    fn test_closed_queue_does_not_panic() {
        let store = Arc::new(WorkbenchStore::new());
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let mut binding = WorkbenchBinding::new(store.clone()).with_queue(tx);
        parse_message(r#"<action type="shell">ls</action>"#, &mut binding);
        assert_eq!(store.snapshot().actions.len(), 1);
    }
}
