//! Event payloads and callback surface of the streaming tag parser.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// The two tag families the parser recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagKind {
    Artifact,
    Action,
}

impl std::fmt::Display for TagKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TagKind::Artifact => write!(f, "artifact"),
            TagKind::Action => write!(f, "action"),
        }
    }
}

/// Payload delivered with every structural event.
///
/// `tag_id` is assigned by the parser in order of appearance and is stable for
/// the lifetime of one parser instance, so consumers can target one element
/// even when two elements carry identical content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagData {
    pub tag_id: u64,
    pub kind: TagKind,
    /// Value of the mandatory `type="..."` attribute
    #[serde(rename = "type")]
    pub tag_type: String,
    /// Remaining `key="value"` attributes in source order
    #[serde(default)]
    pub attributes: IndexMap<String, String>,
    /// Trimmed content seen so far (full content on close)
    pub content: String,
    /// Enclosing artifact for actions written inside an artifact
    #[serde(default)]
    pub parent: Option<u64>,
    /// True only on a close event triggered by the closing tag.
    /// Elements still open at `end()` are closed with `closed = false`.
    #[serde(default)]
    pub closed: bool,
}

impl TagData {
    /// Look up an attribute other than `type`.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

/// Artifact payload alias, kept for readability at call sites.
pub type ArtifactData = TagData;
/// Action payload alias, kept for readability at call sites.
pub type ActionData = TagData;

/// Callback set driven by [`StreamingMessageParser`](super::StreamingMessageParser).
///
/// Every method has an empty default so implementors only wire what they need.
pub trait ParserCallbacks {
    fn on_artifact_open(&mut self, _data: &ArtifactData) {}
    fn on_artifact_close(&mut self, _data: &ArtifactData) {}
    fn on_action_open(&mut self, _data: &ActionData) {}
    /// Fired when an open action's content grew during a `feed` call.
    /// Carries the whole content so far, not a delta.
    fn on_action_stream(&mut self, _data: &ActionData) {}
    fn on_action_close(&mut self, _data: &ActionData) {}
    /// Prose outside any artifact/action span, accumulated and trimmed.
    fn on_stream(&mut self, _text: &str) {}
}

impl<C: ParserCallbacks + ?Sized> ParserCallbacks for &mut C {
    fn on_artifact_open(&mut self, data: &ArtifactData) {
        (**self).on_artifact_open(data)
    }
    fn on_artifact_close(&mut self, data: &ArtifactData) {
        (**self).on_artifact_close(data)
    }
    fn on_action_open(&mut self, data: &ActionData) {
        (**self).on_action_open(data)
    }
    fn on_action_stream(&mut self, data: &ActionData) {
        (**self).on_action_stream(data)
    }
    fn on_action_close(&mut self, data: &ActionData) {
        (**self).on_action_close(data)
    }
    fn on_stream(&mut self, text: &str) {
        (**self).on_stream(text)
    }
}

/// A recorded parser event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ParserEvent {
    ArtifactOpen(TagData),
    ArtifactClose(TagData),
    ActionOpen(TagData),
    ActionStream(TagData),
    ActionClose(TagData),
    Stream { text: String },
}

/// Callback implementation that records every event in order.
#[derive(Debug, Default, Clone)]
pub struct EventCollector {
    pub events: Vec<ParserEvent>,
}

impl EventCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events of one variant, selected by a predicate over the event.
    pub fn count(&self, pred: impl Fn(&ParserEvent) -> bool) -> usize {
        self.events.iter().filter(|e| pred(e)).count()
    }

    /// Latest prose text, if any was reported.
    pub fn last_stream(&self) -> Option<&str> {
        self.events.iter().rev().find_map(|e| match e {
            ParserEvent::Stream { text } => Some(text.as_str()),
            _ => None,
        })
    }
}

impl ParserCallbacks for EventCollector {
    fn on_artifact_open(&mut self, data: &ArtifactData) {
        self.events.push(ParserEvent::ArtifactOpen(data.clone()));
    }
    fn on_artifact_close(&mut self, data: &ArtifactData) {
        self.events.push(ParserEvent::ArtifactClose(data.clone()));
    }
    fn on_action_open(&mut self, data: &ActionData) {
        self.events.push(ParserEvent::ActionOpen(data.clone()));
    }
    fn on_action_stream(&mut self, data: &ActionData) {
        self.events.push(ParserEvent::ActionStream(data.clone()));
    }
    fn on_action_close(&mut self, data: &ActionData) {
        self.events.push(ParserEvent::ActionClose(data.clone()));
    }
    fn on_stream(&mut self, text: &str) {
        self.events.push(ParserEvent::Stream {
            text: text.to_string(),
        });
    }
}
