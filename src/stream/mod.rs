pub mod handler;
pub mod sse;
pub mod task;
pub mod think;
pub mod usage;

pub use handler::{encode_chunk, ChatStreamHandler, LineAction, LineFrames};
pub use sse::{classify_line, sse_line_stream, LineKind};
pub use task::{
    ensure_upstream_success, run_transcode, spawn_transcode, spawn_transcode_response,
    StreamOutcome, TranscodeHandle, DEFAULT_QUEUE_CAPACITY,
};
pub use think::{ThinkOutput, ThinkState, ThinkTransformer};
pub use usage::{UsageReconciler, UsageVerdict};
