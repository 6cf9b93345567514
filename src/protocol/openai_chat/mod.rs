pub mod completion;
pub mod normalize;

use serde::{Deserialize, Deserializer, Serialize};

type ExtraFields = serde_json::Map<String, serde_json::Value>;

/// Decode an explicit `null` the same as a missing field.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// `OpenAI` Chat Completion request wire type.
///
/// Only the fields the normalizer touches are typed; everything else rides in
/// `extra` and is forwarded untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    #[serde(default)]
    pub messages: Vec<OpenAiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_options: Option<OpenAiStreamOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_completion_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning_effort: Option<String>,
    #[serde(flatten)]
    pub extra: ExtraFields,
}

/// Stream options for `include_usage`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OpenAiStreamOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_usage: Option<bool>,
}

/// `OpenAI` message wire type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OpenAiMessage {
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_content: Option<String>,
    #[serde(flatten)]
    pub extra: ExtraFields,
}

impl OpenAiMessage {
    /// Plain text of the message: a string body, or the concatenated `text`
    /// parts of a multi-part body.
    #[must_use]
    pub fn text(&self) -> String {
        match &self.content {
            Some(serde_json::Value::String(text)) => text.clone(),
            Some(serde_json::Value::Array(parts)) => {
                let mut out = String::new();
                for part in parts {
                    if let Some(text) = part.get("text").and_then(serde_json::Value::as_str) {
                        out.push_str(text);
                    }
                }
                out
            }
            _ => String::new(),
        }
    }
}

/// Token usage as reported by the upstream (or reconstructed locally).
///
/// Missing counters decode as zero so an empty `"usage": {}` object still
/// parses. Provider extensions such as `prompt_tokens_details` are kept.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatUsage {
    #[serde(default, deserialize_with = "null_as_default")]
    pub prompt_tokens: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub completion_tokens: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub total_tokens: u64,
    #[serde(flatten)]
    pub extra: ExtraFields,
}

impl ChatUsage {
    #[must_use]
    pub fn with_prompt_tokens(prompt_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            ..Self::default()
        }
    }
}

/// Error object some providers embed in an otherwise well-formed payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OpenAiErrorBody {
    #[serde(default, deserialize_with = "null_as_default")]
    pub message: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub param: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<serde_json::Value>,
}

/// A streaming chunk (`chat.completion.chunk`).
///
/// `error` is read but never written back out: a frame carrying an error is
/// routed to the error path instead of being re-encoded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatStreamChunk {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub object: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<u64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub model: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub choices: Vec<ChatStreamChoice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<ChatUsage>,
    #[serde(default, skip_serializing)]
    pub error: Option<OpenAiErrorBody>,
    #[serde(flatten)]
    pub extra: ExtraFields,
}

/// A choice within a stream chunk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatStreamChoice {
    #[serde(default, deserialize_with = "null_as_default")]
    pub index: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub delta: ChatDelta,
    #[serde(default)]
    pub finish_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<ChatUsage>,
    #[serde(flatten)]
    pub extra: ExtraFields,
}

/// Delta content within a stream choice.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_content: Option<String>,
    #[serde(flatten)]
    pub extra: ExtraFields,
}

impl ChatDelta {
    #[must_use]
    pub fn content_str(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }

    #[must_use]
    pub fn reasoning_str(&self) -> &str {
        self.reasoning_content.as_deref().unwrap_or("")
    }

    /// A delta that carries only `content`.
    #[must_use]
    pub fn content_only(content: &str) -> Self {
        Self {
            content: Some(content.to_owned()),
            ..Self::default()
        }
    }
}

impl ChatStreamChunk {
    /// Text this frame contributes to the completion, used for local token
    /// estimation when the upstream reports no usage.
    #[must_use]
    pub fn response_text(&self) -> String {
        let mut out = String::new();
        for choice in &self.choices {
            out.push_str(choice.delta.reasoning_str());
            out.push_str(choice.delta.content_str());
        }
        out
    }

    /// Build a new frame with the same metadata as `self` whose every choice
    /// delta is replaced by a content-only delta holding `content`.
    ///
    /// `self` is left untouched, so several variants can be derived from the
    /// same source frame.
    #[must_use]
    pub fn with_delta_content(&self, content: &str) -> Self {
        self.derive_choices(|_| ChatDelta::content_only(content))
    }

    /// Like [`ChatStreamChunk::with_delta_content`], but each delta keeps its
    /// `role` and extra fields; only `content` is set and
    /// `reasoning_content` cleared.
    #[must_use]
    pub fn with_content_override(&self, content: &str) -> Self {
        self.derive_choices(|delta| ChatDelta {
            content: Some(content.to_owned()),
            reasoning_content: None,
            ..delta.clone()
        })
    }

    fn derive_choices(&self, delta: impl Fn(&ChatDelta) -> ChatDelta) -> Self {
        Self {
            id: self.id.clone(),
            object: self.object.clone(),
            created: self.created,
            model: self.model.clone(),
            choices: self
                .choices
                .iter()
                .map(|choice| ChatStreamChoice {
                    index: choice.index,
                    delta: delta(&choice.delta),
                    finish_reason: choice.finish_reason.clone(),
                    usage: choice.usage.clone(),
                    extra: choice.extra.clone(),
                })
                .collect(),
            usage: self.usage.clone(),
            error: None,
            extra: self.extra.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_stream_chunk_keeps_unknown_fields() {
        let raw = json!({
            "id": "chatcmpl-1",
            "object": "chat.completion.chunk",
            "created": 1_727_000_000_u64,
            "model": "deepseek-r1",
            "system_fingerprint": "fp_1",
            "choices": [{
                "index": 0,
                "delta": {"role": "assistant", "reasoning_content": "hmm"},
                "logprobs": null,
                "finish_reason": null
            }]
        });
        let chunk: ChatStreamChunk = serde_json::from_value(raw).unwrap();
        assert_eq!(chunk.choices[0].delta.reasoning_str(), "hmm");
        let back = serde_json::to_value(&chunk).unwrap();
        assert_eq!(back["system_fingerprint"], "fp_1");
        assert!(back["choices"][0]["logprobs"].is_null());
        assert!(back["choices"][0]["finish_reason"].is_null());
        assert!(back.get("error").is_none());
    }

    #[test]
    fn test_empty_usage_object_decodes_as_zero() {
        let chunk: ChatStreamChunk =
            serde_json::from_str(r#"{"id":"x","choices":[],"usage":{}}"#).unwrap();
        assert_eq!(chunk.usage, Some(ChatUsage::default()));
    }

    #[test]
    fn test_with_delta_content_does_not_alias_source() {
        let source: ChatStreamChunk = serde_json::from_value(json!({
            "id": "chatcmpl-2",
            "object": "chat.completion.chunk",
            "model": "m",
            "choices": [
                {"index": 0, "delta": {"reasoning_content": "a"}},
                {"index": 1, "delta": {"content": "b", "role": "assistant"}}
            ]
        }))
        .unwrap();

        let open = source.with_delta_content("<think>\n");
        let close = source.with_delta_content("\n</think>");

        assert_eq!(source.choices[0].delta.reasoning_str(), "a");
        assert_eq!(source.choices[1].delta.content_str(), "b");
        for choice in &open.choices {
            assert_eq!(choice.delta, ChatDelta::content_only("<think>\n"));
        }
        for choice in &close.choices {
            assert_eq!(choice.delta, ChatDelta::content_only("\n</think>"));
        }
        assert_eq!(open.id, "chatcmpl-2");
        assert_eq!(close.choices[1].index, 1);
    }

    #[test]
    fn test_content_override_keeps_role_and_extra_delta_fields() {
        let source: ChatStreamChunk = serde_json::from_value(json!({
            "id": "chatcmpl-3",
            "choices": [{
                "index": 0,
                "delta": {"role": "assistant", "content": "answer", "reasoning_content": "r", "tool_calls": []}
            }]
        }))
        .unwrap();

        let close = source.with_content_override("\n</think>");
        let delta = &close.choices[0].delta;
        assert_eq!(delta.content_str(), "\n</think>");
        assert_eq!(delta.reasoning_content, None);
        assert_eq!(delta.role.as_deref(), Some("assistant"));
        assert_eq!(delta.extra["tool_calls"], json!([]));
        assert_eq!(source.choices[0].delta.content_str(), "answer");
    }

    #[test]
    fn test_null_fields_decode_as_defaults() {
        let chunk: ChatStreamChunk = serde_json::from_value(json!({
            "id": null,
            "object": null,
            "model": null,
            "choices": [{"index": null, "delta": null, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 3, "completion_tokens": null, "total_tokens": null}
        }))
        .unwrap();
        assert_eq!(chunk.id, "");
        assert_eq!(chunk.choices[0].index, 0);
        assert_eq!(chunk.choices[0].delta, ChatDelta::default());
        assert_eq!(chunk.usage.as_ref().map(|u| u.completion_tokens), Some(0));

        let trailer: ChatStreamChunk =
            serde_json::from_str(r#"{"id":"x","choices":null,"usage":{"completion_tokens":2}}"#)
                .unwrap();
        assert!(trailer.choices.is_empty());
    }

    #[test]
    fn test_message_text_from_parts() {
        let message: OpenAiMessage = serde_json::from_value(json!({
            "role": "user",
            "content": [
                {"type": "text", "text": "hello "},
                {"type": "image_url", "image_url": {"url": "https://x"}},
                {"type": "text", "text": "world"}
            ]
        }))
        .unwrap();
        assert_eq!(message.text(), "hello world");
    }
}
