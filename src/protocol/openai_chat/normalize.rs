//! Per-request parameter adaptation applied before the upstream call.

use super::{ChatCompletionRequest, OpenAiStreamOptions};

/// Rename and drop parameters the `o1`/`o3` reasoning families reject.
///
/// - `o1*` / `o3*` with a positive `max_tokens`: the value moves to
///   `max_completion_tokens` and `max_tokens` is cleared.
/// - `o3*` additionally loses `temperature`, and gets `reasoning_effort` set
///   from `effort` when it is non-empty.
pub fn normalize_reasoning_model_params(request: &mut ChatCompletionRequest, effort: &str) {
    let is_o1 = request.model.starts_with("o1");
    let is_o3 = request.model.starts_with("o3");
    if !(is_o1 || is_o3) {
        return;
    }
    let Some(max_tokens) = request.max_tokens.filter(|&n| n > 0) else {
        return;
    };

    request.max_completion_tokens = Some(max_tokens);
    request.max_tokens = None;

    if is_o3 {
        request.temperature = None;
        if !effort.is_empty() {
            request.reasoning_effort = Some(effort.to_owned());
        }
    }
}

/// Set `stream_options` for the upstream call.
///
/// Channels that understand `stream_options` are asked to append a usage
/// frame; for the rest the field is removed so a client-supplied value cannot
/// trigger an upstream rejection.
pub fn prepare_stream_options(request: &mut ChatCompletionRequest, supports_stream_options: bool) {
    request.stream_options = if supports_stream_options {
        Some(OpenAiStreamOptions {
            include_usage: Some(true),
        })
    } else {
        None
    };
}

/// Produce the upstream-ready copy of a streaming request.
///
/// The caller's request is left as it was received.
#[must_use]
pub fn prepare_upstream_stream_request(
    request: &ChatCompletionRequest,
    effort: &str,
    supports_stream_options: bool,
) -> ChatCompletionRequest {
    let mut upstream = request.clone();
    normalize_reasoning_model_params(&mut upstream, effort);
    prepare_stream_options(&mut upstream, supports_stream_options);
    upstream.stream = Some(true);
    upstream
}
