//! Consuming a model response body as it streams in.

mod client;

pub use client::{ChatClient, ChatMessage, ChatRequest};

use futures::{Stream, StreamExt};
use tracing::{debug, warn};

use crate::errors::StreamError;
use crate::parser::{ParserCallbacks, StreamingMessageParser};
use crate::util::Utf8Decoder;

/// Feeds a byte stream into a [`StreamingMessageParser`] in arrival order.
///
/// A consumer handles one message; the parser is ended when the stream is
/// exhausted or fails.
pub struct MessageStreamConsumer<C: ParserCallbacks> {
    parser: StreamingMessageParser<C>,
}

impl<C: ParserCallbacks> MessageStreamConsumer<C> {
    pub fn new(callbacks: C) -> Self {
        Self {
            parser: StreamingMessageParser::new(callbacks),
        }
    }

    pub fn parser(&self) -> &StreamingMessageParser<C> {
        &self.parser
    }

    pub fn into_callbacks(self) -> C {
        self.parser.into_callbacks()
    }

    /// Pull chunks until the stream ends and return the full message text.
    ///
    /// A transport error ends the parser (unterminated elements are closed as
    /// such) and is returned as [`StreamError::Transport`].
    pub async fn consume<S, B, E>(&mut self, stream: S) -> Result<String, StreamError>
    where
        S: Stream<Item = Result<B, E>>,
        B: AsRef<[u8]>,
        E: std::fmt::Display,
    {
        let mut stream = std::pin::pin!(stream);
        let mut decoder = Utf8Decoder::new();
        let mut message = String::new();
        let mut chunks = 0usize;

        while let Some(item) = stream.next().await {
            match item {
                Ok(bytes) => {
                    chunks += 1;
                    let text = decoder.decode(bytes.as_ref());
                    if !text.is_empty() {
                        self.parser.feed(&text);
                        message.push_str(&text);
                    }
                }
                Err(e) => {
                    warn!(error = %e, chunks, "response stream failed");
                    self.finish(&mut decoder, &mut message);
                    return Err(StreamError::Transport(e.to_string()));
                }
            }
        }

        self.finish(&mut decoder, &mut message);
        debug!(chunks, bytes = message.len(), "response stream complete");
        Ok(message)
    }

    fn finish(&mut self, decoder: &mut Utf8Decoder, message: &mut String) {
        let rest = decoder.finish();
        if !rest.is_empty() {
            self.parser.feed(&rest);
            message.push_str(&rest);
        }
        self.parser.end();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{EventCollector, ParserEvent};
    use futures::stream;

    fn chunks(parts: &[&[u8]]) -> Vec<Result<Vec<u8>, String>> {
        parts.iter().map(|p| Ok(p.to_vec())).collect()
    }

    #[tokio::test]
    async fn test_consume_feeds_parser_and_returns_text() {
        let body = r#"Hi <action type="shell">ls -la</action> done"#.as_bytes();
        let parts: Vec<&[u8]> = body.chunks(5).collect();

        let mut consumer = MessageStreamConsumer::new(EventCollector::new());
        let message = consumer.consume(stream::iter(chunks(&parts))).await.unwrap();
        assert_eq!(message.as_bytes(), body);
        assert!(consumer.parser().is_ended());

        let collector = consumer.into_callbacks();
        let closes: Vec<_> = collector
            .events
            .iter()
            .filter_map(|e| match e {
                ParserEvent::ActionClose(data) => Some(data),
                _ => None,
            })
            .collect();
        assert_eq!(closes.len(), 1);
        assert_eq!(closes[0].content, "ls -la");
        assert!(closes[0].closed);
    }

    #[tokio::test]
    async fn test_multibyte_split_across_chunks() {
        let body = "<action type=\"file\">caf\u{e9} \u{1F600}</action>".as_bytes();
        let parts: Vec<&[u8]> = body.chunks(1).collect();

        let mut consumer = MessageStreamConsumer::new(EventCollector::new());
        let message = consumer.consume(stream::iter(chunks(&parts))).await.unwrap();
        assert!(message.contains("caf\u{e9} \u{1F600}"));
    }

    #[tokio::test]
    async fn test_transport_error_ends_parser() {
        let items: Vec<Result<Vec<u8>, String>> = vec![
            Ok(br#"<action type="shell">npm in"#.to_vec()),
            Err("connection reset".to_string()),
            Ok(b"stall</action>".to_vec()),
        ];

        let mut consumer = MessageStreamConsumer::new(EventCollector::new());
        let err = consumer.consume(stream::iter(items)).await.unwrap_err();
        assert!(matches!(err, StreamError::Transport(ref m) if m == "connection reset"));
        assert!(consumer.parser().is_ended());

        let collector = consumer.into_callbacks();
        let close = collector
            .events
            .iter()
            .find_map(|e| match e {
                ParserEvent::ActionClose(data) => Some(data),
                _ => None,
            })
            .unwrap();
        assert!(!close.closed);
        assert_eq!(close.content, "npm in");
    }

    #[tokio::test]
    async fn test_empty_stream() {
        let mut consumer = MessageStreamConsumer::new(EventCollector::new());
        let message = consumer
            .consume(stream::iter(Vec::<Result<Vec<u8>, String>>::new()))
            .await
            .unwrap();
        assert!(message.is_empty());
        assert!(consumer.into_callbacks().events.is_empty());
    }
}
