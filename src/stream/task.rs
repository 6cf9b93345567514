use std::time::Instant;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::StreamError;
use crate::observability::token_counter::log_stream_usage;
use crate::protocol::error_shapes::upstream_error_from_response_body;
use crate::protocol::openai_chat::ChatUsage;

use super::handler::{ChatStreamHandler, LineAction, LineFrames};
use super::sse::sse_line_stream;

/// Default capacity of the client-bound chunk queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// The single terminal signal of a stream, carrying its final usage.
#[derive(Debug)]
pub enum StreamOutcome {
    /// `[DONE]` received or the upstream closed the body.
    Done(ChatUsage),
    Failed { error: StreamError, usage: ChatUsage },
}

impl StreamOutcome {
    #[must_use]
    pub fn usage(&self) -> &ChatUsage {
        match self {
            StreamOutcome::Done(usage) | StreamOutcome::Failed { usage, .. } => usage,
        }
    }

    #[must_use]
    pub fn error(&self) -> Option<&StreamError> {
        match self {
            StreamOutcome::Done(_) => None,
            StreamOutcome::Failed { error, .. } => Some(error),
        }
    }
}

/// Receiving ends of a spawned transcode task.
///
/// All chunks arrive on `chunks` before `outcome` resolves: the task drops
/// its chunk sender before it reports the outcome.
pub struct TranscodeHandle {
    pub chunks: mpsc::Receiver<Bytes>,
    pub outcome: oneshot::Receiver<StreamOutcome>,
    pub task: JoinHandle<()>,
}

/// Drive `handler` over an upstream body until a terminal condition.
///
/// Blocks on `chunks` when the consumer is slow. A dropped consumer ends the
/// stream as a transport failure.
pub async fn run_transcode<S, E>(
    byte_stream: S,
    mut handler: ChatStreamHandler,
    chunks: mpsc::Sender<Bytes>,
) -> StreamOutcome
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let started = Instant::now();
    let mut lines = Box::pin(sse_line_stream(byte_stream));
    let mut frames = LineFrames::new();

    let error = loop {
        let line = match lines.next().await {
            None => break None,
            Some(Ok(line)) => line,
            Some(Err(err)) => break Some(err),
        };

        let action = handler.process_line(&line, &mut frames);
        let mut consumer_gone = false;
        for frame in frames.drain(..) {
            if chunks.send(frame).await.is_err() {
                consumer_gone = true;
                break;
            }
        }
        if consumer_gone {
            break Some(StreamError::Transport(
                "client stream receiver dropped".to_string(),
            ));
        }

        match action {
            LineAction::Continue => {}
            LineAction::Finished => break None,
            LineAction::Failed(err) => break Some(err),
        }
    };

    drop(chunks);
    let model = handler.model().to_owned();
    let usage = handler.into_usage();
    log_stream_usage(&model, &usage, started.elapsed());

    match error {
        None => StreamOutcome::Done(usage),
        Some(error) => {
            tracing::warn!(model = %model, "stream ended with error: {error}");
            StreamOutcome::Failed { error, usage }
        }
    }
}

/// Spawn a transcode task for one upstream body.
#[must_use]
pub fn spawn_transcode<S, E>(
    byte_stream: S,
    handler: ChatStreamHandler,
    capacity: usize,
) -> TranscodeHandle
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let (chunk_tx, chunk_rx) = mpsc::channel(capacity.max(1));
    let (outcome_tx, outcome_rx) = oneshot::channel();

    let task = tokio::spawn(async move {
        let outcome = run_transcode(byte_stream, handler, chunk_tx).await;
        if outcome_tx.send(outcome).is_err() {
            tracing::debug!("stream outcome receiver dropped");
        }
    });

    TranscodeHandle {
        chunks: chunk_rx,
        outcome: outcome_rx,
        task,
    }
}

/// Pass a successful upstream response through, or read a failed one into
/// [`StreamError::Upstream`] before any stream is started.
///
/// # Errors
///
/// Returns [`StreamError::Upstream`] for a non-2xx status and
/// [`StreamError::Transport`] when the error body cannot be read.
pub async fn ensure_upstream_success(
    response: reqwest::Response,
) -> Result<reqwest::Response, StreamError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .bytes()
        .await
        .map_err(|err| StreamError::Transport(format!("Failed to read upstream error body: {err}")))?;
    let err = upstream_error_from_response_body(status.as_u16(), &body);
    tracing::warn!("upstream rejected stream request: {err}");
    Err(err)
}

/// Spawn a transcode task reading a `reqwest` response body.
#[must_use]
pub fn spawn_transcode_response(
    response: reqwest::Response,
    handler: ChatStreamHandler,
    capacity: usize,
) -> TranscodeHandle {
    spawn_transcode(response.bytes_stream(), handler, capacity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;

    fn body(parts: &[&'static str]) -> impl Stream<Item = Result<Bytes, Infallible>> + Send {
        let parts: Vec<Result<Bytes, Infallible>> = parts
            .iter()
            .map(|part| Ok(Bytes::from_static(part.as_bytes())))
            .collect();
        futures_util::stream::iter(parts)
    }

    async fn collect(handle: TranscodeHandle) -> (Vec<Bytes>, StreamOutcome) {
        let TranscodeHandle {
            mut chunks,
            outcome,
            task,
        } = handle;
        let mut out = Vec::new();
        while let Some(chunk) = chunks.recv().await {
            out.push(chunk);
        }
        let outcome = outcome.await.expect("outcome");
        task.await.expect("task");
        (out, outcome)
    }

    #[tokio::test]
    async fn test_done_ends_stream_and_ignores_trailing_lines() {
        let handle = spawn_transcode(
            body(&[
                "data: {\"id\":\"a\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"hi\"}}]}\n\n",
                "data: [DONE]\n\n",
                "data: {\"id\":\"late\",\"choices\":[]}\n\n",
            ]),
            ChatStreamHandler::new("m", 1),
            4,
        );
        let (chunks, outcome) = collect(handle).await;
        assert_eq!(chunks.len(), 1);
        assert!(matches!(outcome, StreamOutcome::Done(_)));
        assert_eq!(outcome.usage().completion_tokens, 1);
        assert_eq!(outcome.usage().total_tokens, 2);
    }

    #[tokio::test]
    async fn test_upstream_close_without_done_is_done() {
        let handle = spawn_transcode(
            body(&["data: {\"id\":\"a\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"x\"}}]}"]),
            ChatStreamHandler::new("m", 0),
            1,
        );
        let (chunks, outcome) = collect(handle).await;
        assert_eq!(chunks.len(), 1);
        assert!(outcome.error().is_none());
    }

    #[tokio::test]
    async fn test_decode_error_is_single_terminal_signal() {
        let handle = spawn_transcode(
            body(&[
                "data: {\"id\":\"a\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"x\"}}]}\n",
                "data: {oops\n",
                "data: {\"id\":\"b\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"y\"}}]}\n",
            ]),
            ChatStreamHandler::new("m", 0),
            4,
        );
        let (chunks, outcome) = collect(handle).await;
        assert_eq!(chunks.len(), 1);
        assert!(matches!(outcome.error(), Some(StreamError::Decode(_))));
    }

    #[tokio::test]
    async fn test_dropped_consumer_ends_task() {
        let handle = spawn_transcode(
            body(&[
                "data: {\"id\":\"a\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"x\"}}]}\n",
                "data: {\"id\":\"b\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"y\"}}]}\n",
            ]),
            ChatStreamHandler::new("m", 0),
            1,
        );
        let TranscodeHandle {
            chunks,
            outcome,
            task,
        } = handle;
        drop(chunks);
        let outcome = outcome.await.expect("outcome");
        task.await.expect("task");
        assert!(matches!(outcome.error(), Some(StreamError::Transport(_))));
    }
}
