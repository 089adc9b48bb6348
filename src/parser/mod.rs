//! Streaming parser for structured directives embedded in model output.
//!
//! Two non-nesting tag families are recognized while text is still arriving:
//!
//! - `<artifact type="T" ...>CONTENT</artifact>` - a bundle of generated output
//! - `<action type="T" ...>CONTENT</action>` - one effect (file write, shell command)
//!
//! Events fire exactly once per element: open on first sight of the opening
//! tag, stream as an action's content grows, close when the closing tag
//! arrives. Text outside both tag families is reported as prose.

mod streaming;
mod tag;
mod types;

pub use streaming::{StreamingMessageParser, parse_message};
pub use types::{
    ActionData, ArtifactData, EventCollector, ParserCallbacks, ParserEvent, TagData, TagKind,
};
