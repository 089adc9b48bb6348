//! Offline parsing of a saved response — `scaffold parse <file>`.

use anyhow::{Context, Result};
use std::path::Path;

use scaffold::parser::{EventCollector, ParserEvent, StreamingMessageParser, TagData};

pub fn cmd_parse(file: &Path, chunk_size: usize, json: bool) -> Result<()> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read response file: {}", file.display()))?;

    let mut parser = StreamingMessageParser::new(EventCollector::new());
    for chunk in chunks(&text, chunk_size) {
        parser.feed(chunk);
    }
    parser.end();
    let events = parser.into_callbacks().events;

    if json {
        for event in &events {
            println!("{}", serde_json::to_string(event)?);
        }
        return Ok(());
    }

    for event in &events {
        println!("{}", describe(event));
    }
    Ok(())
}

/// Split `text` into pieces of at most `size` bytes on char boundaries.
fn chunks(text: &str, size: usize) -> Vec<&str> {
    if size == 0 || text.len() <= size {
        return vec![text];
    }

    let mut out = Vec::new();
    let mut start = 0;
    while start < text.len() {
        let mut end = (start + size).min(text.len());
        while !text.is_char_boundary(end) {
            end += 1;
        }
        out.push(&text[start..end]);
        start = end;
    }
    out
}

fn describe(event: &ParserEvent) -> String {
    let tag = |label: &str, data: &TagData| {
        let mut line = format!(
            "{} #{} {}",
            console::style(label).cyan().bold(),
            data.tag_id,
            data.tag_type
        );
        for (key, value) in &data.attributes {
            line.push_str(&format!(" {}={:?}", key, value));
        }
        if !data.content.is_empty() {
            line.push_str(&format!("\n    {}", data.content.replace('\n', "\n    ")));
        }
        if label.ends_with("close") && !data.closed {
            line.push_str(&format!(" {}", console::style("(unterminated)").yellow()));
        }
        line
    };

    match event {
        ParserEvent::ArtifactOpen(data) => tag("artifact open", data),
        ParserEvent::ArtifactClose(data) => tag("artifact close", data),
        ParserEvent::ActionOpen(data) => tag("action open", data),
        ParserEvent::ActionStream(data) => tag("action stream", data),
        ParserEvent::ActionClose(data) => tag("action close", data),
        ParserEvent::Stream { text } => {
            format!("{} {}", console::style("text").dim(), text)
        }
    }
}
