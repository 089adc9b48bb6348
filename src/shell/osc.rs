//! Out-of-band control sequences emitted by the shell prompt hook.
//!
//! Format: `ESC ] 654 ; <name> [= <session> : <code>] BEL`. The shell emits
//! `interactive` once when it is ready for input, then
//! `exit=<pid>:<status>` after every command.

use regex::Regex;
use std::sync::LazyLock;

static OSC_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\x1b\]654;([^=\x07]+)(?:=(-?\d+):(\d+))?\x07").expect("valid OSC regex")
});

/// A pending sequence longer than this is not ours; release it as text.
const MAX_PENDING_LEN: usize = 64;

pub const READY_EVENT: &str = "interactive";
pub const EXIT_EVENT: &str = "exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OscEvent {
    pub name: String,
    pub session: Option<i64>,
    pub code: Option<i32>,
}

/// Splits shell output into visible text and sentinel events.
///
/// A sequence cut between two chunks is held back until it completes.
#[derive(Debug, Default)]
pub struct OscScanner {
    pending: String,
    output: String,
}

impl OscScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume one chunk. Returns the events found and the text that became
    /// visible, with sentinel sequences removed.
    pub fn push(&mut self, chunk: &str) -> (Vec<OscEvent>, String) {
        let mut buf = std::mem::take(&mut self.pending);
        buf.push_str(chunk);

        let mut events = Vec::new();
        let mut text = String::new();
        let mut last = 0;
        for caps in OSC_REGEX.captures_iter(&buf) {
            let Some(m) = caps.get(0) else { continue };
            text.push_str(&buf[last..m.start()]);
            last = m.end();
            events.push(OscEvent {
                name: caps[1].to_string(),
                session: caps.get(2).and_then(|s| s.as_str().parse().ok()),
                code: caps.get(3).and_then(|c| c.as_str().parse().ok()),
            });
        }

        let tail = &buf[last..];
        match tail.rfind('\x1b') {
            Some(esc) if could_be_sentinel(&tail[esc..]) => {
                text.push_str(&tail[..esc]);
                self.pending = tail[esc..].to_string();
            }
            _ => text.push_str(tail),
        }

        self.output.push_str(&text);
        (events, text)
    }

    /// Release any held-back bytes as text.
    pub fn flush(&mut self) {
        let pending = std::mem::take(&mut self.pending);
        self.output.push_str(&pending);
    }

    pub fn output(&self) -> &str {
        &self.output
    }

    /// Take the visible output. Held-back bytes stay pending.
    pub fn take_output(&mut self) -> String {
        std::mem::take(&mut self.output)
    }
}

const SENTINEL_PREFIX: &str = "\x1b]654;";

/// Whether `tail`, starting at ESC, may still grow into a sentinel.
fn could_be_sentinel(tail: &str) -> bool {
    if tail.len() <= SENTINEL_PREFIX.len() {
        SENTINEL_PREFIX.starts_with(tail)
    } else {
        tail.starts_with(SENTINEL_PREFIX) && !tail.contains('\x07') && tail.len() < MAX_PENDING_LEN
    }
}

/// Byte offset just past the first complete sentinel named `name`.
pub fn sentinel_end(text: &str, name: &str) -> Option<usize> {
    OSC_REGEX
        .captures_iter(text)
        .find(|caps| &caps[1] == name)
        .and_then(|caps| caps.get(0))
        .map(|m| m.end())
}

/// Remove complete sentinel sequences from `text`.
pub fn strip_osc(text: &str) -> String {
    OSC_REGEX.replace_all(text, "").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ready_event() {
        let mut scanner = OscScanner::new();
        let (events, text) = scanner.push("welcome\x1b]654;interactive\x07");
        assert_eq!(text, "welcome");
        assert_eq!(
            events,
            vec![OscEvent {
                name: "interactive".to_string(),
                session: None,
                code: None,
            }]
        );
    }

    #[test]
    fn test_exit_code_is_number_after_colon() {
        let mut scanner = OscScanner::new();
        let (events, text) = scanner.push("boom\n\x1b]654;exit=4242:127\x07");
        assert_eq!(text, "boom\n");
        assert_eq!(events[0].name, "exit");
        assert_eq!(events[0].session, Some(4242));
        assert_eq!(events[0].code, Some(127));
    }

    #[test]
    fn test_sequence_split_across_chunks() {
        let mut scanner = OscScanner::new();
        let (events, text) = scanner.push("out\x1b]654;ex");
        assert!(events.is_empty());
        assert_eq!(text, "out");

        let (events, text) = scanner.push("it=1:0\x07");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].code, Some(0));
        assert_eq!(text, "");
        assert_eq!(scanner.output(), "out");
    }

    #[test]
    fn test_foreign_escape_sequences_pass_through() {
        let mut scanner = OscScanner::new();
        let (events, text) = scanner.push("\x1b[32mgreen\x1b[0m");
        assert!(events.is_empty());
        assert_eq!(text, "\x1b[32mgreen\x1b[0m");

        let (_, text) = scanner.push("tail\x1b]65");
        assert_eq!(text, "tail");
        scanner.flush();
        assert_eq!(scanner.output(), "\x1b[32mgreen\x1b[0mtail\x1b]65");
    }

    #[test]
    fn test_take_output_resets() {
        let mut scanner = OscScanner::new();
        scanner.push("a");
        assert_eq!(scanner.take_output(), "a");
        assert_eq!(scanner.output(), "");
    }

    #[test]
    fn test_sentinel_end_finds_named_sequence() {
        let raw = "x\x1b]654;interactive\x07yy\x1b]654;exit=1:2\x07zz";
        let end = sentinel_end(raw, "exit").unwrap();
        assert_eq!(&raw[..end], "x\x1b]654;interactive\x07yy\x1b]654;exit=1:2\x07");
        assert_eq!(sentinel_end("\x1b]654;exi", "exit"), None);
    }

    #[test]
    fn test_strip_osc() {
        assert_eq!(strip_osc("a\x1b]654;exit=1:2\x07b"), "ab");
    }
}
