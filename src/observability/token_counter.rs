use crate::protocol::openai_chat::{ChatCompletionRequest, ChatUsage};
use std::time::Duration;
use tracing::info;

/// Tokenizer used when the upstream does not report usage.
///
/// Implementations are keyed by model name so a caller can plug in a real
/// BPE table per model family.
pub trait TokenCounter: Send + Sync {
    fn count_text(&self, text: &str, model: &str) -> u64;
}

/// Lightweight `bytes / 4` heuristic; needs no model tables.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicTokenCounter;

impl TokenCounter for HeuristicTokenCounter {
    fn count_text(&self, text: &str, model: &str) -> u64 {
        estimate_tokens(text, model)
    }
}

/// Estimate the number of tokens in `text` for the given model.
#[must_use]
pub fn estimate_tokens(text: &str, _model: &str) -> u64 {
    (text.len() as u64).div_ceil(4)
}

/// Estimate the prompt tokens of a chat request from its message text.
#[must_use]
pub fn estimate_prompt_tokens(request: &ChatCompletionRequest, counter: &dyn TokenCounter) -> u64 {
    request
        .messages
        .iter()
        .map(|message| counter.count_text(&message.text(), &request.model))
        .sum()
}

/// Log final token usage for a finished stream at INFO level.
pub fn log_stream_usage(model: &str, usage: &ChatUsage, duration: Duration) {
    info!(
        model = model,
        prompt_tokens = usage.prompt_tokens,
        completion_tokens = usage.completion_tokens,
        total_tokens = usage.total_tokens,
        duration_seconds = duration.as_secs_f64(),
        "stream completed"
    );
}
