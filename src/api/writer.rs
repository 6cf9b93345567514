use std::convert::Infallible;

use axum::body::Body;
use axum::response::Response;
use bytes::Bytes;
use futures_util::Stream;
use tokio::sync::{mpsc, oneshot};

use crate::error::StreamError;
use crate::stream::sse::{done_frame, openai_sse_frame};
use crate::stream::{StreamOutcome, TranscodeHandle};

enum WriterState {
    Chunks(mpsc::Receiver<Bytes>, oneshot::Receiver<StreamOutcome>),
    Trailer(Bytes),
    Finished,
}

/// Client-facing SSE body for a transcode task.
///
/// Every chunk is framed as `data: <chunk>\n\n`. After the last chunk a
/// failed stream gets one `data: {"error":...}` frame, and every stream ends
/// with `data: [DONE]\n\n`.
pub fn sse_body_stream(
    chunks: mpsc::Receiver<Bytes>,
    outcome: oneshot::Receiver<StreamOutcome>,
) -> impl Stream<Item = Result<Bytes, Infallible>> + Send {
    futures_util::stream::unfold(
        WriterState::Chunks(chunks, outcome),
        |state| async move {
            match state {
                WriterState::Chunks(mut chunks, outcome) => match chunks.recv().await {
                    Some(chunk) => Some((
                        Ok(openai_sse_frame(&chunk)),
                        WriterState::Chunks(chunks, outcome),
                    )),
                    None => next_after_chunks(outcome).await,
                },
                WriterState::Trailer(frame) => Some((Ok(frame), WriterState::Finished)),
                WriterState::Finished => None,
            }
        },
    )
}

async fn next_after_chunks(
    outcome: oneshot::Receiver<StreamOutcome>,
) -> Option<(Result<Bytes, Infallible>, WriterState)> {
    match outcome.await {
        Ok(StreamOutcome::Failed { error, .. }) => Some((
            Ok(error_frame(&error)),
            WriterState::Trailer(done_frame()),
        )),
        Ok(StreamOutcome::Done(_)) => Some((Ok(done_frame()), WriterState::Finished)),
        Err(_) => {
            tracing::debug!("transcode task ended without reporting an outcome");
            Some((Ok(done_frame()), WriterState::Finished))
        }
    }
}

/// The `data: {"error":...}` frame reported to the client for a failed stream.
#[must_use]
pub fn error_frame(error: &StreamError) -> Bytes {
    openai_sse_frame(error.to_payload().to_string().as_bytes())
}

/// Build an `axum` streaming response from a spawned transcode task.
///
/// Usage is not observable through the response; callers that need it should
/// use [`sse_body_stream`] with their own outcome handling.
#[must_use]
pub fn sse_response(handle: TranscodeHandle) -> Response {
    let TranscodeHandle {
        chunks, outcome, ..
    } = handle;
    Response::builder()
        .header(http::header::CONTENT_TYPE, "text/event-stream")
        .header(http::header::CACHE_CONTROL, "no-cache")
        .body(Body::from_stream(sse_body_stream(chunks, outcome)))
        .unwrap_or_else(|err| {
            tracing::error!("failed to build SSE response: {err}");
            Response::new(Body::empty())
        })
}
