//! Incremental tokenizer for model output.
//!
//! Input arrives in arbitrary chunks. The parser keeps only the bytes it could
//! not classify yet (a dangling `<artif` or `</act`), so every structural
//! event fires exactly once no matter how the text was split.

use tracing::{debug, warn};

use super::tag::{CLOSE_ACTION, CLOSE_ARTIFACT, OpenTagScan, partial_suffix_len, scan_open_tag};
use super::types::{ParserCallbacks, TagData, TagKind};

/// An element whose opening tag has been seen.
struct OpenElement {
    data: TagData,
    /// Untrimmed content accumulated so far
    raw: String,
    /// Whether the open callback has fired
    announced: bool,
    /// Trimmed content last handed to a callback
    reported: String,
}

impl OpenElement {
    fn snapshot(&self) -> TagData {
        let mut data = self.data.clone();
        data.content = self.raw.trim().to_string();
        data
    }
}

/// Streaming recognizer for `<artifact>` and `<action>` tags.
///
/// Callers must invoke [`feed`](Self::feed) in chunk-arrival order and finish
/// with [`end`](Self::end). After `end` the parser is inert.
pub struct StreamingMessageParser<C: ParserCallbacks> {
    callbacks: C,
    /// Input that has not been classified yet
    pending: String,
    artifact: Option<OpenElement>,
    action: Option<OpenElement>,
    /// Text outside any artifact/action span
    prose: String,
    next_tag_id: u64,
    ended: bool,
}

impl<C: ParserCallbacks> StreamingMessageParser<C> {
    pub fn new(callbacks: C) -> Self {
        Self {
            callbacks,
            pending: String::new(),
            artifact: None,
            action: None,
            prose: String::new(),
            next_tag_id: 0,
            ended: false,
        }
    }

    pub fn callbacks(&self) -> &C {
        &self.callbacks
    }

    pub fn callbacks_mut(&mut self) -> &mut C {
        &mut self.callbacks
    }

    pub fn into_callbacks(self) -> C {
        self.callbacks
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }

    /// Prose seen so far, untrimmed.
    pub fn prose(&self) -> &str {
        &self.prose
    }

    /// Append a chunk and fire every event it completes.
    pub fn feed(&mut self, chunk: &str) {
        if self.ended {
            warn!(len = chunk.len(), "feed after end ignored");
            return;
        }

        self.pending.push_str(chunk);
        self.advance();
        self.report_progress();
        self.report_prose();
    }

    /// Flush held-back input, close unterminated elements and stop.
    pub fn end(&mut self) {
        if self.ended {
            return;
        }

        let rest = std::mem::take(&mut self.pending);
        if self.action.is_some() {
            self.push_element_text(&rest);
        } else if let Some(artifact) = self.artifact.as_mut() {
            artifact.raw.push_str(&rest);
        } else {
            self.prose.push_str(&rest);
        }

        if let Some(tag_id) = self.action.as_ref().map(|a| a.data.tag_id) {
            debug!(tag_id, "unterminated action at end of stream");
            self.close_action(false);
        }
        if let Some(tag_id) = self.artifact.as_ref().map(|a| a.data.tag_id) {
            debug!(tag_id, "unterminated artifact at end of stream");
            self.close_artifact(false);
        }

        self.report_prose();
        self.ended = true;
    }

    fn advance(&mut self) {
        loop {
            let progressed = if self.action.is_some() {
                self.advance_in_action()
            } else if self.artifact.is_some() {
                self.advance_in_artifact()
            } else {
                self.advance_in_text()
            };
            if !progressed {
                break;
            }
        }
    }

    /// Returns true when a state transition happened and scanning should continue.
    fn advance_in_action(&mut self) -> bool {
        match self.pending.find(CLOSE_ACTION) {
            Some(idx) => {
                let text: String = self.pending.drain(..idx + CLOSE_ACTION.len()).collect();
                self.push_element_text(&text[..idx]);
                if let Some(artifact) = self.artifact.as_mut() {
                    artifact.raw.push_str(CLOSE_ACTION);
                }
                self.close_action(true);
                true
            }
            None => {
                let keep = partial_suffix_len(&self.pending, CLOSE_ACTION);
                let take = self.pending.len() - keep;
                let text: String = self.pending.drain(..take).collect();
                self.push_element_text(&text);
                false
            }
        }
    }

    fn advance_in_artifact(&mut self) -> bool {
        let mut from = 0;
        while let Some(offset) = self.pending[from..].find('<') {
            let idx = from + offset;
            let at = &self.pending[idx..];

            if at.starts_with(CLOSE_ARTIFACT) {
                let text: String = self.pending.drain(..idx + CLOSE_ARTIFACT.len()).collect();
                self.push_artifact_text(&text[..idx]);
                self.close_artifact(true);
                return true;
            }
            if at.len() < CLOSE_ARTIFACT.len() && CLOSE_ARTIFACT.starts_with(at) {
                self.hold_from(idx, TagKind::Artifact);
                return false;
            }

            match scan_open_tag(at) {
                OpenTagScan::Tag {
                    kind: TagKind::Action,
                    tag_type,
                    attributes,
                    len,
                } => {
                    let text: String = self.pending.drain(..idx + len).collect();
                    self.push_artifact_text(&text);
                    self.open(TagKind::Action, tag_type, attributes);
                    return true;
                }
                OpenTagScan::Partial => {
                    self.hold_from(idx, TagKind::Artifact);
                    return false;
                }
                // Artifacts do not nest; anything else is content
                OpenTagScan::Tag { .. } | OpenTagScan::NotATag => from = idx + 1,
            }
        }

        let text = std::mem::take(&mut self.pending);
        self.push_artifact_text(&text);
        false
    }

    fn advance_in_text(&mut self) -> bool {
        let mut from = 0;
        while let Some(offset) = self.pending[from..].find('<') {
            let idx = from + offset;

            match scan_open_tag(&self.pending[idx..]) {
                OpenTagScan::Tag {
                    kind,
                    tag_type,
                    attributes,
                    len,
                } => {
                    let text: String = self.pending.drain(..idx + len).collect();
                    self.prose.push_str(&text[..idx]);
                    self.open(kind, tag_type, attributes);
                    return true;
                }
                OpenTagScan::Partial => {
                    self.hold_from(idx, TagKind::Action);
                    return false;
                }
                OpenTagScan::NotATag => from = idx + 1,
            }
        }

        let text = std::mem::take(&mut self.pending);
        self.prose.push_str(&text);
        false
    }

    /// Consume everything before `idx` and keep the rest pending.
    ///
    /// `scope` tells where the consumed text belongs: artifact content when an
    /// artifact is open, prose otherwise.
    fn hold_from(&mut self, idx: usize, scope: TagKind) {
        let text: String = self.pending.drain(..idx).collect();
        match scope {
            TagKind::Artifact => self.push_artifact_text(&text),
            TagKind::Action => self.prose.push_str(&text),
        }
    }

    fn push_artifact_text(&mut self, text: &str) {
        if let Some(artifact) = self.artifact.as_mut() {
            artifact.raw.push_str(text);
        }
    }

    /// Action content also belongs to the enclosing artifact's raw content.
    fn push_element_text(&mut self, text: &str) {
        if let Some(action) = self.action.as_mut() {
            action.raw.push_str(text);
        }
        self.push_artifact_text(text);
    }

    fn open(
        &mut self,
        kind: TagKind,
        tag_type: String,
        attributes: indexmap::IndexMap<String, String>,
    ) {
        let tag_id = self.next_tag_id;
        self.next_tag_id += 1;

        let parent = match kind {
            TagKind::Action => self.artifact.as_ref().map(|a| a.data.tag_id),
            TagKind::Artifact => None,
        };

        debug!(tag_id, %kind, tag_type = %tag_type, "tag opened");

        let element = OpenElement {
            data: TagData {
                tag_id,
                kind,
                tag_type,
                attributes,
                content: String::new(),
                parent,
                closed: false,
            },
            raw: String::new(),
            announced: false,
            reported: String::new(),
        };

        match kind {
            TagKind::Artifact => self.artifact = Some(element),
            TagKind::Action => self.action = Some(element),
        }
    }

    fn announce_artifact(&mut self) {
        if let Some(artifact) = self.artifact.as_mut()
            && !artifact.announced
        {
            let data = artifact.snapshot();
            artifact.announced = true;
            artifact.reported = data.content.clone();
            self.callbacks.on_artifact_open(&data);
        }
    }

    fn announce_action(&mut self) {
        if self.action.as_ref().is_some_and(|a| !a.announced) {
            self.announce_artifact();
        }
        if let Some(action) = self.action.as_mut()
            && !action.announced
        {
            let data = action.snapshot();
            action.announced = true;
            action.reported = data.content.clone();
            self.callbacks.on_action_open(&data);
        }
    }

    fn close_action(&mut self, closed: bool) {
        self.announce_action();
        if let Some(action) = self.action.take() {
            let mut data = action.snapshot();
            data.closed = closed;
            debug!(tag_id = data.tag_id, closed, "action closed");
            self.callbacks.on_action_close(&data);
        }
    }

    fn close_artifact(&mut self, closed: bool) {
        if self.action.is_some() {
            self.close_action(false);
        }
        self.announce_artifact();
        if let Some(artifact) = self.artifact.take() {
            let mut data = artifact.snapshot();
            data.closed = closed;
            debug!(tag_id = data.tag_id, closed, "artifact closed");
            self.callbacks.on_artifact_close(&data);
        }
    }

    /// Announce elements opened during this feed and stream grown content.
    fn report_progress(&mut self) {
        self.announce_artifact();

        let Some(action) = self.action.as_mut() else {
            return;
        };
        if !action.announced {
            self.announce_action();
            return;
        }

        let data = action.snapshot();
        if data.content != action.reported {
            action.reported = data.content.clone();
            self.callbacks.on_action_stream(&data);
        }
    }

    fn report_prose(&mut self) {
        let text = self.prose.trim();
        if !text.is_empty() {
            self.callbacks.on_stream(text);
        }
    }
}

/// Parse a complete message in one pass and return it unchanged.
pub fn parse_message<C: ParserCallbacks>(message: &str, callbacks: C) -> String {
    let mut parser = StreamingMessageParser::new(callbacks);
    parser.feed(message);
    parser.end();
    message.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::types::{EventCollector, ParserEvent};

    fn run(chunks: &[&str]) -> EventCollector {
        let mut parser = StreamingMessageParser::new(EventCollector::new());
        for chunk in chunks {
            parser.feed(chunk);
        }
        parser.end();
        parser.into_callbacks()
    }

    fn opens(c: &EventCollector, kind: TagKind) -> Vec<TagData> {
        c.events
            .iter()
            .filter_map(|e| match (e, kind) {
                (ParserEvent::ArtifactOpen(d), TagKind::Artifact) => Some(d.clone()),
                (ParserEvent::ActionOpen(d), TagKind::Action) => Some(d.clone()),
                _ => None,
            })
            .collect()
    }

    fn closes(c: &EventCollector, kind: TagKind) -> Vec<TagData> {
        c.events
            .iter()
            .filter_map(|e| match (e, kind) {
                (ParserEvent::ArtifactClose(d), TagKind::Artifact) => Some(d.clone()),
                (ParserEvent::ActionClose(d), TagKind::Action) => Some(d.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_parse_message_artifact_and_action() {
        let message = r#"
            Here's a test message with an artifact:
            <artifact type="file" name="test.txt">
            Test content
            </artifact>
            And here's an action:
            <action type="command">
            echo "Hello, world!"
            </action>
        "#;

        let mut collector = EventCollector::new();
        let result = parse_message(message, &mut collector);
        assert_eq!(result, message);

        let artifacts = opens(&collector, TagKind::Artifact);
        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].tag_type, "file");
        assert_eq!(artifacts[0].content, "Test content");
        assert_eq!(artifacts[0].attribute("name"), Some("test.txt"));

        let actions = opens(&collector, TagKind::Action);
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].tag_type, "command");
        assert_eq!(actions[0].content, r#"echo "Hello, world!""#);
        assert_eq!(actions[0].parent, None);
    }

    #[test]
    fn test_single_feed_then_end_fires_open_exactly_once() {
        let c = run(&[r#"<action type="X">C</action>"#]);
        let actions = opens(&c, TagKind::Action);
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].tag_type, "X");
        assert_eq!(actions[0].content, "C");
        assert_eq!(closes(&c, TagKind::Action).len(), 1);
    }

    #[test]
    fn test_every_split_point_fires_each_event_once() {
        let text = r#"intro <action type="shell">npm install</action> outro"#;
        for split in 1..text.len() {
            let c = run(&[&text[..split], &text[split..]]);

            let open = opens(&c, TagKind::Action);
            assert_eq!(open.len(), 1, "split at {}", split);
            assert_eq!(open[0].tag_type, "shell");

            let close = closes(&c, TagKind::Action);
            assert_eq!(close.len(), 1, "split at {}", split);
            assert_eq!(close[0].content, "npm install", "split at {}", split);
            assert!(close[0].closed);
        }
    }

    #[test]
    fn test_later_feeds_do_not_refire_completed_tags() {
        let c = run(&[
            r#"<artifact type="file">a</artifact>"#,
            " more text",
            " and more",
        ]);
        assert_eq!(opens(&c, TagKind::Artifact).len(), 1);
        assert_eq!(closes(&c, TagKind::Artifact).len(), 1);
    }

    #[test]
    fn test_split_mid_tag_round_trip() {
        let c = run(&["prefix <artif", r#"act type="file">hello</artifact> suffix"#]);

        let artifacts = opens(&c, TagKind::Artifact);
        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].tag_type, "file");
        assert_eq!(artifacts[0].content, "hello");

        let prose = c.last_stream().unwrap();
        assert!(prose.contains("prefix"));
        assert!(prose.contains("suffix"));
        assert!(!prose.contains("artifact"));
        assert!(!prose.contains("hello"));
    }

    #[test]
    fn test_open_fires_before_close_tag_arrives() {
        let mut parser = StreamingMessageParser::new(EventCollector::new());
        parser.feed(r#"<action type="shell">npm "#);

        let c = parser.callbacks();
        let open = opens(c, TagKind::Action);
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].content, "npm");
        assert!(closes(c, TagKind::Action).is_empty());

        parser.feed("run dev");
        let streams: Vec<_> = parser
            .callbacks()
            .events
            .iter()
            .filter_map(|e| match e {
                ParserEvent::ActionStream(d) => Some(d.content.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(streams, vec!["npm run dev".to_string()]);

        parser.feed("</action>");
        parser.end();
        let close = closes(parser.callbacks(), TagKind::Action);
        assert_eq!(close.len(), 1);
        assert_eq!(close[0].content, "npm run dev");
    }

    #[test]
    fn test_no_stream_event_when_content_unchanged() {
        let mut parser = StreamingMessageParser::new(EventCollector::new());
        parser.feed(r#"<action type="shell">ls"#);
        parser.feed("   ");
        parser.feed("</act");
        let c = parser.callbacks();
        assert_eq!(c.count(|e| matches!(e, ParserEvent::ActionStream(_))), 0);
    }

    #[test]
    fn test_actions_inside_artifact() {
        let text = r#"<artifact type="project" title="Todo">
<action type="file" filePath="index.js">console.log(1)</action>
<action type="shell">node index.js</action>
</artifact>"#;
        let c = run(&[text]);

        let artifact_open = opens(&c, TagKind::Artifact);
        assert_eq!(artifact_open.len(), 1);
        let artifact_id = artifact_open[0].tag_id;

        let actions = closes(&c, TagKind::Action);
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[0].attribute("filePath"), Some("index.js"));
        assert_eq!(actions[0].content, "console.log(1)");
        assert_eq!(actions[1].content, "node index.js");
        assert!(actions.iter().all(|a| a.parent == Some(artifact_id)));

        // Artifact content keeps the raw inner text
        let artifact_close = closes(&c, TagKind::Artifact);
        assert!(artifact_close[0].content.contains(r#"<action type="shell">node index.js</action>"#));

        // Artifact open precedes nested action open
        let first_open = c
            .events
            .iter()
            .position(|e| matches!(e, ParserEvent::ArtifactOpen(_)))
            .unwrap();
        let first_action = c
            .events
            .iter()
            .position(|e| matches!(e, ParserEvent::ActionOpen(_)))
            .unwrap();
        assert!(first_open < first_action);
    }

    #[test]
    fn test_identical_content_gets_distinct_tag_ids() {
        let c = run(&[r#"<action type="shell">ls</action><action type="shell">ls</action>"#]);
        let actions = closes(&c, TagKind::Action);
        assert_eq!(actions.len(), 2);
        assert_ne!(actions[0].tag_id, actions[1].tag_id);
    }

    #[test]
    fn test_malformed_tags_are_prose() {
        let c = run(&["see <div>this</div> and <action>no type</action> ok"]);
        assert!(opens(&c, TagKind::Action).is_empty());
        let prose = c.last_stream().unwrap();
        assert!(prose.contains("<div>this</div>"));
        assert!(prose.contains("<action>no type</action>"));
    }

    #[test]
    fn test_unterminated_action_closes_unfinished_at_end() {
        let c = run(&[r#"<action type="shell">npm run bu"#]);
        let close = closes(&c, TagKind::Action);
        assert_eq!(close.len(), 1);
        assert!(!close[0].closed);
        assert_eq!(close[0].content, "npm run bu");
    }

    #[test]
    fn test_dangling_partial_tag_flushed_as_prose_on_end() {
        let c = run(&["hello <acti"]);
        assert!(opens(&c, TagKind::Action).is_empty());
        assert_eq!(c.last_stream(), Some("hello <acti"));
    }

    #[test]
    fn test_stream_callback_fires_once_per_feed() {
        let mut parser = StreamingMessageParser::new(EventCollector::new());
        parser.feed("one");
        parser.feed(" two");
        let texts: Vec<_> = parser
            .callbacks()
            .events
            .iter()
            .filter_map(|e| match e {
                ParserEvent::Stream { text } => Some(text.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(texts, vec!["one".to_string(), "one two".to_string()]);
    }

    #[test]
    fn test_no_stream_event_for_whitespace_only_prose() {
        let c = run(&["   ", r#"<action type="a">b</action>"#, "\n"]);
        assert_eq!(c.count(|e| matches!(e, ParserEvent::Stream { .. })), 0);
    }

    #[test]
    fn test_feed_after_end_is_ignored() {
        let mut parser = StreamingMessageParser::new(EventCollector::new());
        parser.feed("x");
        parser.end();
        let before = parser.callbacks().events.len();
        parser.feed(r#"<action type="a">b</action>"#);
        parser.end();
        assert!(parser.is_ended());
        assert_eq!(parser.callbacks().events.len(), before);
    }

    #[test]
    fn test_close_tag_split_across_feeds() {
        let c = run(&[r#"<action type="shell">echo hi</ac"#, "tion>done"]);
        let close = closes(&c, TagKind::Action);
        assert_eq!(close.len(), 1);
        assert_eq!(close[0].content, "echo hi");
        assert_eq!(c.last_stream(), Some("done"));
    }

    #[test]
    fn test_multibyte_text_around_tags() {
        let c = run(&["héllo ", r#"<action type="shell">echo ✓</action>"#, " wörld"]);
        let close = closes(&c, TagKind::Action);
        assert_eq!(close[0].content, "echo ✓");
        assert_eq!(c.last_stream(), Some("héllo  wörld"));
    }
}
