use std::sync::Arc;

use bytes::Bytes;
use smallvec::SmallVec;

use crate::error::StreamError;
use crate::observability::token_counter::{HeuristicTokenCounter, TokenCounter};
use crate::protocol::error_shapes::upstream_error_from_body;
use crate::protocol::openai_chat::{ChatStreamChunk, ChatUsage};

use super::sse::{classify_line, LineKind};
use super::think::{ThinkOutput, ThinkState, ThinkTransformer};
use super::usage::{UsageReconciler, UsageVerdict};

/// Status attached to an error object that arrives inside a stream frame.
const STREAM_ERROR_STATUS: u16 = 500;

/// Chunks emitted for a single input line; at most three (opening frame plus
/// marker, or the two closing markers).
pub type LineFrames = SmallVec<[Bytes; 3]>;

/// Result of feeding one line to [`ChatStreamHandler::process_line`].
#[derive(Debug)]
pub enum LineAction {
    Continue,
    /// `[DONE]` was received.
    Finished,
    /// A stream-fatal error; nothing was emitted for the line.
    Failed(StreamError),
}

/// Per-stream transcoding state.
///
/// Owned by exactly one stream task; usage is handed back through
/// [`ChatStreamHandler::into_usage`] once the stream has ended.
pub struct ChatStreamHandler {
    model: String,
    usage: UsageReconciler,
    think: ThinkTransformer,
    think_to_content: bool,
    reencode_json: bool,
    counter: Arc<dyn TokenCounter>,
}

impl ChatStreamHandler {
    #[must_use]
    pub fn new(model: impl Into<String>, prompt_tokens: u64) -> Self {
        Self {
            model: model.into(),
            usage: UsageReconciler::new(prompt_tokens),
            think: ThinkTransformer::new(),
            think_to_content: false,
            reencode_json: false,
            counter: Arc::new(HeuristicTokenCounter),
        }
    }

    /// Rewrite `reasoning_content` into `<think>`-wrapped `content`.
    #[must_use]
    pub fn with_think_to_content(mut self, enabled: bool) -> Self {
        self.think_to_content = enabled;
        self
    }

    /// Re-encode every frame instead of forwarding upstream bytes verbatim.
    #[must_use]
    pub fn with_reencode_json(mut self, enabled: bool) -> Self {
        self.reencode_json = enabled;
        self
    }

    #[must_use]
    pub fn with_token_counter(mut self, counter: Arc<dyn TokenCounter>) -> Self {
        self.counter = counter;
        self
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    #[must_use]
    pub fn think_to_content(&self) -> bool {
        self.think_to_content
    }

    #[must_use]
    pub fn think_state(&self) -> ThinkState {
        self.think.state()
    }

    #[must_use]
    pub fn usage(&self) -> &ChatUsage {
        self.usage.usage()
    }

    #[must_use]
    pub fn into_usage(self) -> ChatUsage {
        self.usage.into_usage()
    }

    /// Process one raw upstream line, appending client-bound chunks to `out`.
    pub fn process_line(&mut self, line: &Bytes, out: &mut LineFrames) -> LineAction {
        let payload = match classify_line(line) {
            LineKind::Ignored => return LineAction::Continue,
            LineKind::Done => return LineAction::Finished,
            LineKind::Data(payload) => payload,
        };

        let chunk: ChatStreamChunk = match serde_json::from_slice(&payload) {
            Ok(chunk) => chunk,
            Err(err) => return LineAction::Failed(StreamError::from(err)),
        };

        if let Some(err) = chunk
            .error
            .as_ref()
            .and_then(|body| upstream_error_from_body(body, STREAM_ERROR_STATUS))
        {
            return LineAction::Failed(err);
        }

        if self.usage.observe(&chunk, &self.model, self.counter.as_ref()) == UsageVerdict::Suppress {
            return LineAction::Continue;
        }

        if self.think_to_content {
            match self.think.apply(chunk) {
                ThinkOutput::Opened { original, marker } => {
                    push_encoded(&original, out);
                    push_encoded(&marker, out);
                }
                ThinkOutput::Closed { marker, separator } => {
                    push_encoded(&marker, out);
                    push_encoded(&separator, out);
                }
                ThinkOutput::Relay(chunk) => push_encoded(&chunk, out),
            }
            return LineAction::Continue;
        }

        if self.reencode_json {
            push_encoded(&chunk, out);
        } else {
            out.push(payload);
        }
        LineAction::Continue
    }
}

/// Serialize a chunk for the client.
///
/// `serde_json` never HTML-escapes, so `<think>` markers and `&` in model
/// output pass through literally.
pub fn encode_chunk(chunk: &ChatStreamChunk) -> Result<Bytes, StreamError> {
    serde_json::to_vec(chunk)
        .map(Bytes::from)
        .map_err(|err| StreamError::Internal(format!("Failed to encode stream chunk: {err}")))
}

fn push_encoded(chunk: &ChatStreamChunk, out: &mut LineFrames) {
    match encode_chunk(chunk) {
        Ok(bytes) => out.push(bytes),
        Err(err) => tracing::debug!("dropping stream frame {}: {err}", chunk.id),
    }
}
