//! Incremental parser for `text/event-stream` chat replies.
//!
//! Bytes are buffered until a newline; each complete line is handled on
//! its own, so the output does not depend on how the transport chunked
//! the stream. A `data:` payload that is not valid JSON is held and joined
//! with the following continuation lines until it parses. A new `data:`
//! line or the end of the stream abandons a held fragment.

use serde_json::Value;
use tracing::warn;

/// Upper bound on a held, not-yet-parseable payload.
pub const MAX_PENDING_BYTES: usize = 64 * 1024;

const DATA_PREFIX: &str = "data: ";
const DONE_SENTINEL: &str = "[DONE]";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    Delta(String),
    Done,
}

#[derive(Debug, Default)]
pub struct SseParser {
    buffer: Vec<u8>,
    pending: Option<String>,
    done: bool,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feed a chunk and return the events completed by it.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        let mut events = Vec::new();
        if self.done {
            return events;
        }
        self.buffer.extend_from_slice(chunk);

        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            self.handle_line(&line[..line.len() - 1], &mut events);
            if self.done {
                self.buffer.clear();
                break;
            }
        }
        events
    }

    /// Flush a trailing line without a newline and drop any held fragment.
    pub fn finish(&mut self) -> Vec<SseEvent> {
        let mut events = Vec::new();
        if !self.done && !self.buffer.is_empty() {
            let line = std::mem::take(&mut self.buffer);
            self.handle_line(&line, &mut events);
        }
        if let Some(fragment) = self.pending.take() {
            warn!(bytes = fragment.len(), "stream ended with an incomplete payload, dropping it");
        }
        events
    }

    fn handle_line(&mut self, raw: &[u8], events: &mut Vec<SseEvent>) {
        let line = String::from_utf8_lossy(raw);
        let line = line.strip_suffix('\r').unwrap_or(&line);

        // A held fragment takes any non-`data:` line, including one that
        // happens to start with `:`.
        if !line.is_empty() && !line.starts_with(DATA_PREFIX) {
            if let Some(mut fragment) = self.pending.take() {
                fragment.push_str(line);
                self.try_parse(fragment, events);
                return;
            }
        }

        if line.is_empty() || line.starts_with(':') {
            return;
        }

        if let Some(payload) = line.strip_prefix(DATA_PREFIX) {
            if let Some(fragment) = self.pending.take() {
                warn!(bytes = fragment.len(), "incomplete payload superseded, dropping it");
            }
            if payload.trim() == DONE_SENTINEL {
                self.done = true;
                events.push(SseEvent::Done);
                return;
            }
            self.try_parse(payload.to_string(), events);
            return;
        }

        // Anything else without a held payload is ignored.
    }

    fn try_parse(&mut self, payload: String, events: &mut Vec<SseEvent>) {
        match serde_json::from_str::<Value>(&payload) {
            Ok(value) => {
                if let Some(delta) = delta_content(&value) {
                    events.push(SseEvent::Delta(delta.to_string()));
                }
            }
            Err(_) if payload.len() > MAX_PENDING_BYTES => {
                warn!(bytes = payload.len(), "unparseable payload exceeds limit, dropping it");
            }
            Err(_) => self.pending = Some(payload),
        }
    }
}

/// `choices[0].delta.content`, when present and non-empty.
fn delta_content(value: &Value) -> Option<&str> {
    value
        .pointer("/choices/0/delta/content")
        .and_then(|c| c.as_str())
        .filter(|c| !c.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    const STREAM: &str = "data: {\"choices\":[{\"delta\":{\"content\":\"A\"}}]}\n\n\
                          data: {\"choices\":[{\"delta\":{\"content\":\"B\"}}]}\n\n\
                          data: [DONE]\n\n";

    fn collect(parser: &mut SseParser, chunks: &[&[u8]]) -> String {
        let mut out = String::new();
        for chunk in chunks {
            for event in parser.feed(chunk) {
                if let SseEvent::Delta(d) = event {
                    out.push_str(&d);
                }
            }
        }
        for event in parser.finish() {
            if let SseEvent::Delta(d) = event {
                out.push_str(&d);
            }
        }
        out
    }

    #[test]
    fn output_is_independent_of_split_points() {
        let bytes = STREAM.as_bytes();
        for i in 0..=bytes.len() {
            for j in i..=bytes.len() {
                let mut parser = SseParser::new();
                let text = collect(&mut parser, &[&bytes[..i], &bytes[i..j], &bytes[j..]]);
                assert_eq!(text, "AB", "split at {} and {}", i, j);
                assert!(parser.is_done());
            }
        }
    }

    #[test]
    fn skips_comments_blank_and_foreign_lines() {
        let mut parser = SseParser::new();
        let input = ": keep-alive\r\n\r\nevent: message\r\n\
                     data: {\"choices\":[{\"delta\":{\"content\":\"hi\"}}]}\r\n";
        assert_eq!(parser.feed(input.as_bytes()), vec![SseEvent::Delta("hi".into())]);
    }

    #[test]
    fn nothing_after_done_is_applied() {
        let mut parser = SseParser::new();
        let input = "data: [DONE]\ndata: {\"choices\":[{\"delta\":{\"content\":\"late\"}}]}\n";
        assert_eq!(parser.feed(input.as_bytes()), vec![SseEvent::Done]);
        assert!(parser.feed(b"data: {}\n").is_empty());
    }

    #[test]
    fn payload_broken_across_lines_is_rebuffered() {
        let mut parser = SseParser::new();
        let input = "data: {\"choices\":[{\"delta\":{\"con\ntent\":\"joined\"}}]}\n";
        assert_eq!(
            parser.feed(input.as_bytes()),
            vec![SseEvent::Delta("joined".into())]
        );
    }

    #[test]
    fn continuation_starting_with_colon_is_not_a_comment() {
        let mut parser = SseParser::new();
        let input = "data: {\"choices\":[{\"delta\":{\"content\"\n:\"X\"}}]}\n";
        let mut events = parser.feed(input.as_bytes());
        events.extend(parser.finish());
        assert_eq!(events, vec![SseEvent::Delta("X".into())]);
    }

    #[test]
    fn comment_without_held_fragment_is_still_skipped() {
        let mut parser = SseParser::new();
        assert!(parser.feed(b":{\"choices\":[]}\n").is_empty());
    }

    #[test]
    fn abandoned_fragment_does_not_block_later_events() {
        let mut parser = SseParser::new();
        let input = "data: {\"choices\":[\n\
                     data: {\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}\n";
        assert_eq!(parser.feed(input.as_bytes()), vec![SseEvent::Delta("ok".into())]);
        assert!(parser.finish().is_empty());
    }

    #[test]
    fn role_only_and_empty_deltas_emit_nothing() {
        let mut parser = SseParser::new();
        let input = "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\
                     data: {\"choices\":[{\"delta\":{\"content\":\"\"}}]}\n";
        assert!(parser.feed(input.as_bytes()).is_empty());
    }

    #[test]
    fn trailing_line_without_newline_is_flushed() {
        let mut parser = SseParser::new();
        assert!(parser
            .feed(b"data: {\"choices\":[{\"delta\":{\"content\":\"tail\"}}]}")
            .is_empty());
        assert_eq!(parser.finish(), vec![SseEvent::Delta("tail".into())]);
    }

    #[test]
    fn multibyte_text_split_mid_character() {
        let line = "data: {\"choices\":[{\"delta\":{\"content\":\"¿Qué?\"}}]}\n".as_bytes();
        let split = line.iter().position(|b| *b == 0xC2).unwrap() + 1;
        let mut parser = SseParser::new();
        assert_eq!(collect(&mut parser, &[&line[..split], &line[split..]]), "¿Qué?");
    }
}
