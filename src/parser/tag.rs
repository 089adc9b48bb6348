//! Opening-tag recognition for `<artifact ...>` and `<action ...>`.
//!
//! The scanner works on a slice that starts at a `<` and answers whether that
//! position is a complete opening tag, could still become one once more input
//! arrives, or is plain text.

use indexmap::IndexMap;
use regex::Regex;
use std::sync::LazyLock;

use super::types::TagKind;

pub(crate) const CLOSE_ARTIFACT: &str = "</artifact>";
pub(crate) const CLOSE_ACTION: &str = "</action>";

/// An opening tag longer than this without a `>` is treated as text.
const MAX_OPEN_TAG_LEN: usize = 4096;

static ATTRIBUTE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([A-Za-z_][A-Za-z0-9_:.-]*)\s*=\s*"([^"]*)""#).expect("valid attribute regex")
});

/// Result of scanning at a `<`.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum OpenTagScan {
    /// Could still become an opening tag; hold the input back.
    Partial,
    /// Definitely not an opening tag we care about.
    NotATag,
    Tag {
        kind: TagKind,
        tag_type: String,
        attributes: IndexMap<String, String>,
        /// Byte length of the whole opening tag including `>`
        len: usize,
    },
}

/// Classify `input`, which must start with `<`.
pub(crate) fn scan_open_tag(input: &str) -> OpenTagScan {
    let mut partial = false;

    for (kind, head) in [(TagKind::Artifact, "<artifact"), (TagKind::Action, "<action")] {
        if input.len() < head.len() {
            if head.starts_with(input) {
                partial = true;
            }
            continue;
        }
        if !input.starts_with(head) {
            continue;
        }

        let rest = &input[head.len()..];
        match rest.chars().next() {
            None => partial = true,
            Some(c) if c == '>' || c.is_whitespace() => match rest.find('>') {
                Some(end) => {
                    let (tag_type, attributes) = parse_attributes(&rest[..end]);
                    return match tag_type {
                        Some(tag_type) => OpenTagScan::Tag {
                            kind,
                            tag_type,
                            attributes,
                            len: head.len() + end + 1,
                        },
                        None => OpenTagScan::NotATag,
                    };
                }
                None if input.len() > MAX_OPEN_TAG_LEN => return OpenTagScan::NotATag,
                None => partial = true,
            },
            // `<actions`, `<artifactual` ...
            Some(_) => {}
        }
    }

    if partial {
        OpenTagScan::Partial
    } else {
        OpenTagScan::NotATag
    }
}

/// Split attribute text into the mandatory `type` value and the rest.
fn parse_attributes(text: &str) -> (Option<String>, IndexMap<String, String>) {
    let mut tag_type = None;
    let mut attributes = IndexMap::new();

    for cap in ATTRIBUTE_REGEX.captures_iter(text) {
        let name = &cap[1];
        let value = cap[2].to_string();
        if name == "type" {
            if tag_type.is_none() && !value.is_empty() {
                tag_type = Some(value);
            }
        } else {
            attributes.insert(name.to_string(), value);
        }
    }

    (tag_type, attributes)
}

/// Length of the longest proper prefix of `needle` that `haystack` ends with.
///
/// `needle` is ASCII, so the returned split point is always a char boundary.
pub(crate) fn partial_suffix_len(haystack: &str, needle: &str) -> usize {
    let max = needle.len().saturating_sub(1).min(haystack.len());
    (1..=max)
        .rev()
        .find(|&k| haystack.ends_with(&needle[..k]))
        .unwrap_or(0)
}
