use serde::{Deserialize, Serialize};

use crate::error::StreamError;
use crate::observability::token_counter::TokenCounter;
use crate::protocol::error_shapes::upstream_error_from_body;

use super::{null_as_default, ChatUsage, OpenAiErrorBody, OpenAiMessage};

/// Status reported for an error embedded in a single-shot response body.
const EMBEDDED_ERROR_STATUS: u16 = 400;

/// `OpenAI` Chat Completion response wire type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub object: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<u64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub model: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub choices: Vec<ChatChoice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<ChatUsage>,
    #[serde(default, skip_serializing)]
    pub error: Option<OpenAiErrorBody>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A single choice in the response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatChoice {
    #[serde(default, deserialize_with = "null_as_default")]
    pub index: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub message: OpenAiMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ChatCompletionResponse {
    #[must_use]
    pub fn content_text(&self) -> String {
        let mut out = String::new();
        for choice in &self.choices {
            out.push_str(&choice.message.text());
        }
        out
    }
}

/// Settle usage for a single-shot completion.
///
/// Upstream usage with a positive completion count is trusted as-is.
/// Otherwise usage is rebuilt from `prompt_tokens` plus an estimate of the
/// returned text, and written back into the response.
///
/// # Errors
///
/// Returns [`StreamError::Upstream`] when the body carries an error object.
pub fn reconcile_completion_usage(
    response: &mut ChatCompletionResponse,
    prompt_tokens: u64,
    counter: &dyn TokenCounter,
) -> Result<ChatUsage, StreamError> {
    if let Some(err) = response
        .error
        .as_ref()
        .and_then(|body| upstream_error_from_body(body, EMBEDDED_ERROR_STATUS))
    {
        return Err(err);
    }

    let reported = response
        .usage
        .as_ref()
        .filter(|usage| usage.completion_tokens > 0);
    if let Some(usage) = reported {
        return Ok(usage.clone());
    }

    let completion_tokens = counter.count_text(&response.content_text(), &response.model);
    let usage = ChatUsage {
        prompt_tokens,
        completion_tokens,
        total_tokens: prompt_tokens.saturating_add(completion_tokens),
        ..ChatUsage::default()
    };
    response.usage = Some(usage.clone());
    Ok(usage)
}
