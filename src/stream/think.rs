//! Reasoning-to-content rewriting.
//!
//! Providers that stream chain-of-thought in `reasoning_content` are turned
//! into a single `content` stream shaped like
//! `<think>\n` … reasoning … `\n</think>` `\n\n` … answer, for clients that
//! only render `content`.

use crate::protocol::openai_chat::ChatStreamChunk;

pub const THINK_OPEN: &str = "<think>\n";
pub const THINK_CLOSE: &str = "\n</think>";
pub const THINK_SEPARATOR: &str = "\n\n";

/// Position of the stream relative to the `<think>` wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThinkState {
    /// No choice-bearing frame seen yet.
    #[default]
    Init,
    /// `<think>` sent; reasoning is being relayed as content.
    Open,
    /// `</think>` sent; the answer is streaming.
    Closed,
}

impl ThinkState {
    #[must_use]
    fn open(self) -> Self {
        match self {
            ThinkState::Init => ThinkState::Open,
            other => other,
        }
    }

    #[must_use]
    fn close(self) -> Self {
        match self {
            ThinkState::Open => ThinkState::Closed,
            other => other,
        }
    }
}

/// Frames produced for one input frame, in emission order.
#[derive(Debug, Clone, PartialEq)]
pub enum ThinkOutput {
    /// First choice-bearing frame: the frame as received, then the opening
    /// marker frame.
    Opened {
        original: ChatStreamChunk,
        marker: ChatStreamChunk,
    },
    /// First frame with answer content: the closing marker and separator
    /// frames replace the input frame.
    Closed {
        marker: ChatStreamChunk,
        separator: ChatStreamChunk,
    },
    /// The input frame with reasoning moved into content.
    Relay(ChatStreamChunk),
}

#[derive(Debug, Clone, Default)]
pub struct ThinkTransformer {
    state: ThinkState,
}

impl ThinkTransformer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn state(&self) -> ThinkState {
        self.state
    }

    pub fn apply(&mut self, mut chunk: ChatStreamChunk) -> ThinkOutput {
        if self.state == ThinkState::Init && !chunk.choices.is_empty() {
            self.state = self.state.open();
            let marker = chunk.with_delta_content(THINK_OPEN);
            return ThinkOutput::Opened {
                original: chunk,
                marker,
            };
        }

        // Only the first choice with answer content is considered; it closes
        // reasoning for every choice of the frame.
        if self.state == ThinkState::Open
            && chunk
                .choices
                .iter()
                .any(|choice| !choice.delta.content_str().is_empty())
        {
            self.state = self.state.close();
            return ThinkOutput::Closed {
                marker: chunk.with_content_override(THINK_CLOSE),
                separator: chunk.with_content_override(THINK_SEPARATOR),
            };
        }

        for choice in &mut chunk.choices {
            if !choice.delta.reasoning_str().is_empty() {
                choice.delta.content = choice.delta.reasoning_content.take();
            }
        }
        ThinkOutput::Relay(chunk)
    }
}
