//! SSE line splitting, data-line classification and output framing.
//!
//! Upstream chat-completion streams are line oriented: every event is a
//! single `data: <json>` line. The transcoder works one line at a time, so
//! this module splits the body into lines instead of assembling multi-line
//! events.
use bytes::{Bytes, BytesMut};
use futures_util::Stream;
use memchr::memchr;

use crate::error::StreamError;

const DATA_PREFIX: &[u8] = b"data:";
const DONE_SENTINEL: &[u8] = b"[DONE]";
const DONE_FRAME: &str = "data: [DONE]\n\n";

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// What a single upstream line means to the transcoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineKind {
    /// Not a `data:` line (keep-alive, comment, `event:` field, blank line).
    Ignored,
    /// The `[DONE]` sentinel.
    Done,
    /// The trimmed payload of a `data:` line, sharing the line's buffer.
    Data(Bytes),
}

/// Classify one raw line.
///
/// The `data:` prefix is matched literally at the start of the line; the
/// payload is trimmed of surrounding ASCII whitespace.
#[must_use]
pub fn classify_line(line: &Bytes) -> LineKind {
    if !line.starts_with(DATA_PREFIX) {
        return LineKind::Ignored;
    }

    let rest = &line[DATA_PREFIX.len()..];
    let start = DATA_PREFIX.len() + rest.iter().take_while(|b| b.is_ascii_whitespace()).count();
    let end = line.len()
        - line[start..]
            .iter()
            .rev()
            .take_while(|b| b.is_ascii_whitespace())
            .count();

    let payload = &line[start..end];
    if payload == DONE_SENTINEL {
        return LineKind::Done;
    }
    LineKind::Data(line.slice(start..end))
}

// ---------------------------------------------------------------------------
// Output framing
// ---------------------------------------------------------------------------

/// Format an OpenAI-style SSE frame (no event type, just data).
#[must_use]
pub fn openai_sse_frame(json: &[u8]) -> Bytes {
    let mut out = BytesMut::with_capacity(8 + json.len());
    out.extend_from_slice(b"data: ");
    out.extend_from_slice(json);
    out.extend_from_slice(b"\n\n");
    out.freeze()
}

/// The terminating `data: [DONE]` frame.
#[must_use]
pub fn done_frame() -> Bytes {
    Bytes::from_static(DONE_FRAME.as_bytes())
}

// ---------------------------------------------------------------------------
// Line splitting
// ---------------------------------------------------------------------------

#[inline]
fn strip_line_ending(mut line: Bytes) -> Bytes {
    if line.last() == Some(&b'\n') {
        line.truncate(line.len() - 1);
    }
    if line.last() == Some(&b'\r') {
        line.truncate(line.len() - 1);
    }
    line
}

/// Split an upstream body into lines.
///
/// Lines may span chunk boundaries; `\n` and `\r\n` endings are both
/// stripped. A trailing line without a newline is flushed when the body ends.
/// A transport error is yielded once as [`StreamError::Transport`] and ends
/// the stream.
pub fn sse_line_stream<S, E>(byte_stream: S) -> impl Stream<Item = Result<Bytes, StreamError>> + Send
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    use futures_util::StreamExt;

    futures_util::stream::unfold(
        (
            Box::pin(byte_stream),
            BytesMut::with_capacity(4096),
            0usize,
            false,
        ),
        |(mut stream, mut buffer, mut scan_from, finished)| async move {
            if finished {
                return None;
            }
            loop {
                if let Some(rel) = memchr(b'\n', &buffer[scan_from..]) {
                    let split = scan_from + rel + 1;
                    let line = strip_line_ending(buffer.split_to(split).freeze());
                    return Some((Ok(line), (stream, buffer, 0, false)));
                }
                scan_from = buffer.len();

                match stream.as_mut().next().await {
                    Some(Ok(bytes)) => buffer.extend_from_slice(&bytes),
                    Some(Err(err)) => {
                        let err = StreamError::Transport(err.to_string());
                        return Some((Err(err), (stream, buffer, 0, true)));
                    }
                    None => {
                        if buffer.is_empty() {
                            return None;
                        }
                        let line = strip_line_ending(buffer.split().freeze());
                        return Some((Ok(line), (stream, buffer, 0, true)));
                    }
                }
            }
        },
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
