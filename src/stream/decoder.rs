//! Line-oriented SSE decoder for streaming runs.

use futures::{Stream, StreamExt};
use serde::Deserialize;

use super::events::AssistantStreamEvent;
use crate::error::VoxError;
use crate::transport::EventStream;

const DONE_SENTINEL: &str = "[DONE]";

/// Envelope form: a single `data:` line carrying both kind and payload.
#[derive(Deserialize)]
struct Envelope {
    event: String,
    #[serde(default)]
    data: serde_json::Value,
}

/// Stateful decoder turning SSE lines into [`AssistantStreamEvent`]s.
///
/// Understands both `event:` + `data:` framing and single-line
/// `{"event": .., "data": ..}` envelopes. Malformed lines are logged and
/// skipped.
#[derive(Debug, Default)]
pub struct SseDecoder {
    pending_kind: Option<String>,
    skipped: usize,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of malformed lines skipped so far.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Feed one line (without its terminator).
    pub fn decode_line(&mut self, line: &str) -> Option<AssistantStreamEvent> {
        let line = line.trim_end_matches('\r');

        if line.is_empty() {
            self.pending_kind = None;
            return None;
        }
        if line.starts_with(':') {
            return None;
        }
        if let Some(kind) = field_value(line, "event") {
            self.pending_kind = Some(kind.trim().to_string());
            return None;
        }
        let Some(data) = field_value(line, "data") else {
            tracing::trace!(line, "ignoring non-data SSE field");
            return None;
        };

        let data = data.trim();
        if data == DONE_SENTINEL {
            self.pending_kind = None;
            return Some(AssistantStreamEvent::Done);
        }

        let decoded = match self.pending_kind.take() {
            Some(kind) => parse_payload(data)
                .and_then(|payload| AssistantStreamEvent::from_parts(&kind, payload)),
            None => serde_json::from_str::<Envelope>(data)
                .map_err(|e| VoxError::InvalidResponse(format!("Malformed stream envelope: {e}")))
                .and_then(|env| AssistantStreamEvent::from_parts(&env.event, env.data)),
        };

        match decoded {
            Ok(event) => Some(event),
            Err(err) => {
                self.skipped += 1;
                tracing::warn!(error = %err, data, "skipping malformed stream line");
                None
            }
        }
    }
}

fn field_value<'a>(line: &'a str, field: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(field)?.strip_prefix(':')?;
    Some(rest.strip_prefix(' ').unwrap_or(rest))
}

fn parse_payload(data: &str) -> Result<serde_json::Value, VoxError> {
    if data.is_empty() {
        return Ok(serde_json::Value::Null);
    }
    serde_json::from_str(data)
        .map_err(|e| VoxError::InvalidResponse(format!("Malformed stream payload: {e}")))
}

/// Decode a chunked byte stream into run events.
///
/// Lines are re-assembled across chunk boundaries before decoding, so a
/// multi-byte character or a `\r\n` split between chunks is handled. A
/// transport error ends the stream after being yielded.
pub fn decode_stream<S, B, E>(input: S) -> EventStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<VoxError> + Send + 'static,
{
    let stream = async_stream::stream! {
        let mut decoder = SseDecoder::new();
        let mut buffer: Vec<u8> = Vec::new();
        futures::pin_mut!(input);

        while let Some(chunk) = input.next().await {
            match chunk {
                Ok(chunk) => buffer.extend_from_slice(chunk.as_ref()),
                Err(err) => {
                    yield Err(err.into());
                    return;
                }
            }

            while let Some(newline) = buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=newline).collect();
                let line = String::from_utf8_lossy(&line[..line.len() - 1]);
                if let Some(event) = decoder.decode_line(&line) {
                    yield Ok(event);
                }
            }
        }

        if !buffer.is_empty() {
            let line = String::from_utf8_lossy(&buffer).into_owned();
            if let Some(event) = decoder.decode_line(&line) {
                yield Ok(event);
            }
        }
    };

    Box::pin(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run::RunStatus;
    use pretty_assertions::assert_eq;

    fn delta_line(text: &str) -> String {
        format!(
            r#"data: {{"event":"thread.message.delta","data":{{"id":"msg_1","delta":{{"content":[{{"index":0,"type":"text","text":{{"value":"{text}"}}}}]}}}}}}"#
        )
    }

    fn texts(events: &[AssistantStreamEvent]) -> String {
        events
            .iter()
            .filter_map(|e| match e {
                AssistantStreamEvent::MessageDelta(d) => Some(d.text()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn envelope_lines_decode_and_malformed_lines_are_skipped() {
        let mut decoder = SseDecoder::new();
        let lines = [
            delta_line("Hel"),
            "data: {not json".to_string(),
            delta_line("lo"),
            r#"data: {"event":"thread.run.completed","data":null}"#.to_string(),
        ];

        let events: Vec<_> = lines
            .iter()
            .filter_map(|line| decoder.decode_line(line))
            .collect();

        assert_eq!(texts(&events), "Hello");
        assert_eq!(events.last(), Some(&AssistantStreamEvent::RunCompleted(None)));
        assert_eq!(decoder.skipped(), 1);
    }

    #[test]
    fn event_field_framing_is_supported() {
        let mut decoder = SseDecoder::new();
        assert_eq!(decoder.decode_line("event: thread.run.queued"), None);
        let event = decoder
            .decode_line(r#"data: {"id":"run_1","status":"queued"}"#)
            .unwrap();
        match event {
            AssistantStreamEvent::RunStatus(run) => assert_eq!(run.status, RunStatus::Queued),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn done_sentinel_and_comments() {
        let mut decoder = SseDecoder::new();
        assert_eq!(decoder.decode_line(": keep-alive"), None);
        assert_eq!(decoder.decode_line(""), None);
        assert_eq!(
            decoder.decode_line("data: [DONE]"),
            Some(AssistantStreamEvent::Done)
        );
    }

    #[test]
    fn blank_line_resets_pending_kind() {
        let mut decoder = SseDecoder::new();
        decoder.decode_line("event: thread.run.queued");
        decoder.decode_line("");
        // Without a pending kind the data line must be an envelope; this one is not.
        assert_eq!(decoder.decode_line(r#"data: {"id":"run_1","status":"queued"}"#), None);
        assert_eq!(decoder.skipped(), 1);
    }

    #[tokio::test]
    async fn chunk_boundaries_do_not_split_lines() {
        let wire = format!(
            "event: thread.message.delta\r\ndata: {}\r\n\r\n{}\ndata: [DONE]\n",
            r#"{"delta":{"content":[{"type":"text","text":{"value":"Grüße "}}]}}"#,
            delta_line("ok"),
        );
        let bytes = wire.into_bytes();
        // Split in the middle of the two-byte 'ü'.
        let split = bytes.iter().position(|b| *b == 0xC3).unwrap() + 1;
        let chunks = vec![
            Ok::<_, VoxError>(bytes[..split].to_vec()),
            Ok(bytes[split..].to_vec()),
        ];

        let events: Vec<_> = decode_stream(futures::stream::iter(chunks))
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(texts(&events), "Grüße ok");
        assert_eq!(events.last(), Some(&AssistantStreamEvent::Done));
    }

    #[tokio::test]
    async fn transport_error_is_yielded_and_ends_stream() {
        let chunks = vec![
            Ok(delta_line("a").into_bytes()),
            Ok(b"\n".to_vec()),
            Err(VoxError::Timeout(10)),
            Ok(delta_line("b").into_bytes()),
        ];
        let items: Vec<_> = decode_stream(futures::stream::iter(chunks)).collect().await;
        assert_eq!(items.len(), 2);
        assert!(matches!(items[1], Err(VoxError::Timeout(10))));
    }
}
