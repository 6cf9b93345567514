pub mod flags;
pub mod session;
pub mod writer;

pub use flags::{parse_bool_flag, resolve_think_to_content, THINK_TO_CONTENT_HEADER};
pub use session::ChatStreamSession;
pub use writer::{error_frame, sse_body_stream, sse_response};
