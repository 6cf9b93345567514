use std::sync::Arc;

use bytes::Bytes;
use futures_util::Stream;
use http::HeaderMap;

use crate::config::ChannelConfig;
use crate::observability::token_counter::{HeuristicTokenCounter, TokenCounter};
use crate::protocol::openai_chat::normalize::prepare_upstream_stream_request;
use crate::protocol::openai_chat::ChatCompletionRequest;
use crate::stream::{spawn_transcode, ChatStreamHandler, TranscodeHandle};

use super::flags::{resolve_think_to_content, THINK_TO_CONTENT_HEADER};

/// Everything needed to run one streaming chat completion against a channel:
/// the request to send upstream and the handler for its response body.
pub struct ChatStreamSession {
    pub upstream_request: ChatCompletionRequest,
    pub handler: ChatStreamHandler,
}

impl ChatStreamSession {
    /// Prepare a streaming request.
    ///
    /// `prompt_tokens` seeds the usage record so locally estimated totals
    /// include the prompt.
    #[must_use]
    pub fn prepare(
        request: &ChatCompletionRequest,
        channel: Option<&ChannelConfig>,
        inbound_headers: &HeaderMap,
        prompt_tokens: u64,
    ) -> Self {
        Self::prepare_with_counter(
            request,
            channel,
            inbound_headers,
            prompt_tokens,
            Arc::new(HeuristicTokenCounter),
        )
    }

    #[must_use]
    pub fn prepare_with_counter(
        request: &ChatCompletionRequest,
        channel: Option<&ChannelConfig>,
        inbound_headers: &HeaderMap,
        prompt_tokens: u64,
        counter: Arc<dyn TokenCounter>,
    ) -> Self {
        let effort = channel.map_or("", |channel| channel.other_arg.as_str());
        let supports_stream_options = channel.is_some_and(|channel| channel.support_stream_options);
        let reencode_json = channel.is_some_and(|channel| channel.stream_escape_json);

        let upstream_request =
            prepare_upstream_stream_request(request, effort, supports_stream_options);

        let think_to_content = resolve_think_to_content(inbound_headers, channel);
        tracing::info!(
            model = %request.model,
            "Header {THINK_TO_CONTENT_HEADER}: {think_to_content}"
        );

        let handler = ChatStreamHandler::new(request.model.clone(), prompt_tokens)
            .with_think_to_content(think_to_content)
            .with_reencode_json(reencode_json)
            .with_token_counter(counter);

        Self {
            upstream_request,
            handler,
        }
    }

    /// Start transcoding an upstream body.
    #[must_use]
    pub fn spawn<S, E>(self, byte_stream: S, capacity: usize) -> TranscodeHandle
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: std::fmt::Display + Send + 'static,
    {
        spawn_transcode(byte_stream, self.handler, capacity)
    }
}
