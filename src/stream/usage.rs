use crate::observability::token_counter::TokenCounter;
use crate::protocol::openai_chat::{ChatStreamChunk, ChatUsage};

/// Whether a frame should continue down the pipeline after usage accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageVerdict {
    Forward,
    /// A usage-only trailer frame (top-level usage, no choices).
    Suppress,
}

/// Folds whichever usage convention the upstream uses into one record.
///
/// Priority per frame:
/// 1. top-level `usage` with a positive completion count replaces the record;
/// 2. otherwise the first choice's `usage` with a positive completion count;
/// 3. with no usage anywhere, the frame's text is counted locally and added
///    to the running completion and total counts.
#[derive(Debug, Clone)]
pub struct UsageReconciler {
    usage: ChatUsage,
}

impl UsageReconciler {
    #[must_use]
    pub fn new(prompt_tokens: u64) -> Self {
        Self {
            usage: ChatUsage::with_prompt_tokens(prompt_tokens),
        }
    }

    pub fn observe(
        &mut self,
        chunk: &ChatStreamChunk,
        model: &str,
        counter: &dyn TokenCounter,
    ) -> UsageVerdict {
        if let Some(usage) = chunk.usage.as_ref() {
            if usage.completion_tokens > 0 {
                self.usage = usage.clone();
            }
            if chunk.choices.is_empty() {
                return UsageVerdict::Suppress;
            }
            return UsageVerdict::Forward;
        }

        if let Some(usage) = chunk.choices.first().and_then(|choice| choice.usage.as_ref()) {
            if usage.completion_tokens > 0 {
                self.usage = usage.clone();
            }
            return UsageVerdict::Forward;
        }

        if self.usage.total_tokens == 0 {
            self.usage.total_tokens = self.usage.prompt_tokens;
        }
        let counted = counter.count_text(&chunk.response_text(), model);
        self.usage.completion_tokens = self.usage.completion_tokens.saturating_add(counted);
        self.usage.total_tokens = self.usage.total_tokens.saturating_add(counted);
        UsageVerdict::Forward
    }

    #[must_use]
    pub fn usage(&self) -> &ChatUsage {
        &self.usage
    }

    #[must_use]
    pub fn into_usage(self) -> ChatUsage {
        self.usage
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::token_counter::HeuristicTokenCounter;
    use serde_json::json;

    fn chunk(value: serde_json::Value) -> ChatStreamChunk {
        serde_json::from_value(value).expect("chunk")
    }

    fn observe(reconciler: &mut UsageReconciler, value: serde_json::Value) -> UsageVerdict {
        reconciler.observe(&chunk(value), "gpt-4o", &HeuristicTokenCounter)
    }

    #[test]
    fn test_top_level_usage_replaces_record() {
        let mut r = UsageReconciler::new(7);
        let verdict = observe(
            &mut r,
            json!({"choices": [{"delta": {"content": "hi"}}],
                   "usage": {"prompt_tokens": 11, "completion_tokens": 3, "total_tokens": 14}}),
        );
        assert_eq!(verdict, UsageVerdict::Forward);
        assert_eq!(r.usage().prompt_tokens, 11);
        assert_eq!(r.usage().completion_tokens, 3);
        assert_eq!(r.usage().total_tokens, 14);
    }

    #[test]
    fn test_usage_only_trailer_is_suppressed() {
        let mut r = UsageReconciler::new(0);
        let verdict = observe(
            &mut r,
            json!({"choices": [], "usage": {"prompt_tokens": 4, "completion_tokens": 9, "total_tokens": 13}}),
        );
        assert_eq!(verdict, UsageVerdict::Suppress);
        assert_eq!(r.usage().total_tokens, 13);

        let mut r = UsageReconciler::new(0);
        assert_eq!(
            observe(&mut r, json!({"choices": [], "usage": {}})),
            UsageVerdict::Suppress
        );
        assert_eq!(r.usage(), &ChatUsage::default());
    }

    #[test]
    fn test_per_choice_usage_replaces_record() {
        let mut r = UsageReconciler::new(2);
        observe(
            &mut r,
            json!({"choices": [{"delta": {"content": "x"},
                                "usage": {"prompt_tokens": 2, "completion_tokens": 5, "total_tokens": 7}}]}),
        );
        assert_eq!(r.usage().completion_tokens, 5);
        assert_eq!(r.usage().total_tokens, 7);
    }

    #[test]
    fn test_estimation_accumulates_from_prompt() {
        let mut r = UsageReconciler::new(10);
        observe(&mut r, json!({"choices": [{"delta": {"reasoning_content": "abcd"}}]}));
        observe(&mut r, json!({"choices": [{"delta": {"content": "abcdefgh"}}]}));
        assert_eq!(r.usage().prompt_tokens, 10);
        assert_eq!(r.usage().completion_tokens, 3);
        assert_eq!(r.usage().total_tokens, 13);
    }

    #[test]
    fn test_estimation_saturates_on_huge_reported_counts() {
        let mut r = UsageReconciler::new(0);
        observe(
            &mut r,
            json!({"choices": [{"delta": {"content": "a"}}],
                   "usage": {"prompt_tokens": 1, "completion_tokens": u64::MAX, "total_tokens": u64::MAX}}),
        );
        observe(&mut r, json!({"choices": [{"delta": {"content": "abcdefgh"}}]}));
        assert_eq!(r.usage().completion_tokens, u64::MAX);
        assert_eq!(r.usage().total_tokens, u64::MAX);
    }

    #[test]
    fn test_zero_usage_after_positive_never_decreases() {
        let mut r = UsageReconciler::new(0);
        observe(
            &mut r,
            json!({"choices": [{"delta": {"content": "a"}}],
                   "usage": {"prompt_tokens": 3, "completion_tokens": 8, "total_tokens": 11}}),
        );
        observe(
            &mut r,
            json!({"choices": [{"delta": {"content": "b"}}],
                   "usage": {"prompt_tokens": 0, "completion_tokens": 0, "total_tokens": 0}}),
        );
        observe(
            &mut r,
            json!({"choices": [{"delta": {"content": "c"},
                                "usage": {"completion_tokens": 0}}]}),
        );
        let usage = r.into_usage();
        assert_eq!(usage.completion_tokens, 8);
        assert_eq!(usage.total_tokens, 11);
    }
}
