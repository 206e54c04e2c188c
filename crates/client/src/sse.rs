//! Server-Sent-Events decoding for the relayed completion stream
//!
//! Network chunks are buffered as raw bytes and only complete lines are
//! decoded, so a UTF-8 sequence split across chunks is reassembled before
//! it reaches the text layer.

use serde::Deserialize;

/// One decoded event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    /// Incremental assistant text
    Delta(String),
    /// `data: [DONE]`
    Done,
}

#[derive(Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Default, Deserialize)]
struct ChunkDelta {
    content: Option<String>,
}

/// Line-oriented SSE decoder with carry-over between chunks
#[derive(Debug, Default)]
pub struct SseDecoder {
    carry: Vec<u8>,
    done: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once `[DONE]` has been seen
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feed one network chunk, returning the events from every line it completed
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        if self.done {
            return Vec::new();
        }
        self.carry.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(newline) = self.carry.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.carry.drain(..=newline).collect();
            if let Some(event) = self.decode_line(&line[..newline]) {
                events.push(event);
            }
            if self.done {
                self.carry.clear();
                break;
            }
        }
        events
    }

    /// Decode whatever is left once the body has ended
    pub fn finish(&mut self) -> Vec<SseEvent> {
        if self.done || self.carry.is_empty() {
            self.carry.clear();
            return Vec::new();
        }
        let line = std::mem::take(&mut self.carry);
        self.decode_line(&line).into_iter().collect()
    }

    fn decode_line(&mut self, raw: &[u8]) -> Option<SseEvent> {
        let line = String::from_utf8_lossy(raw);
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        let data = line.strip_prefix("data:")?.trim_start();
        if data == "[DONE]" {
            self.done = true;
            return Some(SseEvent::Done);
        }

        match serde_json::from_str::<CompletionChunk>(data) {
            Ok(chunk) => chunk
                .choices
                .into_iter()
                .next()
                .and_then(|choice| choice.delta.content)
                .filter(|content| !content.is_empty())
                .map(SseEvent::Delta),
            Err(e) => {
                tracing::debug!(error = %e, "Skipping malformed SSE line");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(events: &[SseEvent]) -> String {
        events
            .iter()
            .filter_map(|e| match e {
                SseEvent::Delta(t) => Some(t.as_str()),
                SseEvent::Done => None,
            })
            .collect()
    }

    #[test]
    fn test_three_chunks_accumulate_hello() {
        let mut decoder = SseDecoder::new();
        let mut events = Vec::new();
        events.extend(decoder.push(b"data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n"));
        events.extend(decoder.push(b"data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n"));
        events.extend(decoder.push(b"data: [DONE]\n"));

        assert_eq!(text(&events), "Hello");
        assert_eq!(events.last(), Some(&SseEvent::Done));
        assert!(decoder.is_done());
    }

    #[test]
    fn test_line_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: {\"choices\":[{\"delta\":").is_empty());
        let events = decoder.push(b"{\"content\":\"Hi\"}}]}\n\n");
        assert_eq!(events, vec![SseEvent::Delta("Hi".to_string())]);
    }

    #[test]
    fn test_multibyte_char_split_across_chunks() {
        let line = "data: {\"choices\":[{\"delta\":{\"content\":\"café 📄\"}}]}\n".as_bytes();
        let split = line.len() - 8;
        let mut decoder = SseDecoder::new();
        let mut events = decoder.push(&line[..split]);
        events.extend(decoder.push(&line[split..]));
        assert_eq!(text(&events), "café 📄");
    }

    #[test]
    fn test_malformed_line_is_skipped() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(
            b"data: {not json\ndata: {\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}\n",
        );
        assert_eq!(events, vec![SseEvent::Delta("ok".to_string())]);
    }

    #[test]
    fn test_nothing_after_done() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(
            b"data: [DONE]\ndata: {\"choices\":[{\"delta\":{\"content\":\"late\"}}]}\n",
        );
        assert_eq!(events, vec![SseEvent::Done]);
        assert!(decoder.push(b"data: {\"choices\":[{\"delta\":{\"content\":\"x\"}}]}\n").is_empty());
        assert!(decoder.finish().is_empty());
    }

    #[test]
    fn test_finish_decodes_trailing_line() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: {\"choices\":[{\"delta\":{\"content\":\"end\"}}]}").is_empty());
        assert_eq!(decoder.finish(), vec![SseEvent::Delta("end".to_string())]);
    }

    #[test]
    fn test_role_only_and_comment_lines_ignored() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(
            b": keep-alive\ndata: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
        );
        assert!(events.is_empty());
    }
}
