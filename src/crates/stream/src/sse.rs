//! SSE framing for the client wire format
//!
//! Frames are `event: <name>\ndata: <json>\n\n`. The decoder is
//! incremental: feed it byte chunks as they arrive and collect whole
//! events; partial frames stay buffered.

use crate::event::StreamEvent;

/// Encode one event as an SSE frame.
pub fn encode(event: &StreamEvent) -> String {
    format!("event: {}\ndata: {}\n\n", event.name(), event.data())
}

/// Incremental SSE decoder
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: String,
}

impl SseDecoder {
    pub fn new() -> SseDecoder {
        SseDecoder::default()
    }

    /// Feed a chunk; returns every complete event it finished. Frames that
    /// do not parse are dropped.
    pub fn feed(&mut self, chunk: &str) -> Vec<StreamEvent> {
        self.buffer.push_str(chunk);
        let mut out = Vec::new();
        while let Some(end) = self.buffer.find("\n\n") {
            let frame: String = self.buffer.drain(..end + 2).collect();
            if let Some(event) = parse_frame(&frame) {
                out.push(event);
            }
        }
        out
    }
}

fn parse_frame(frame: &str) -> Option<StreamEvent> {
    let mut name = None;
    let mut data_lines = Vec::new();
    for line in frame.lines() {
        if let Some(rest) = line.strip_prefix("event:") {
            name = Some(rest.trim().to_string());
        } else if let Some(rest) = line.strip_prefix("data:") {
            data_lines.push(rest.trim_start().to_string());
        }
    }
    let name = name?;
    let data = serde_json::from_str(&data_lines.join("\n")).ok()?;
    StreamEvent::from_parts(&name, &data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::PhaseMark;

    #[test]
    fn test_encode_decode_round_trip() {
        let events = vec![
            StreamEvent::SearchPhase {
                status: PhaseMark::Start,
            },
            StreamEvent::Content {
                text: "Alice lives in London".into(),
            },
            StreamEvent::Done,
        ];
        let wire: String = events.iter().map(encode).collect();

        let mut decoder = SseDecoder::new();
        let decoded = decoder.feed(&wire);
        assert_eq!(decoded, events);
    }

    #[test]
    fn test_partial_frames_stay_buffered() {
        let frame = encode(&StreamEvent::Content { text: "hi".into() });
        let (head, tail) = frame.split_at(10);

        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(head).is_empty());
        let decoded = decoder.feed(tail);
        assert_eq!(decoded.len(), 1);
    }

    #[test]
    fn test_malformed_frames_dropped() {
        let mut decoder = SseDecoder::new();
        let decoded = decoder.feed("event: content\ndata: {not json}\n\nevent: done\ndata: {}\n\n");
        assert_eq!(decoded, vec![StreamEvent::Done]);
    }
}
