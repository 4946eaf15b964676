//! LLM transport layer - provider trait, HTTP client, and cost accounting
//!
//! The core only depends on the [`LlmClient`] trait; the bundled
//! OpenRouter-compatible client is one implementation of it. Providers
//! are responsible for their own wire formatting.

mod client;
mod cost;
pub(crate) mod types;

pub use client::{LlmClient, LlmFactory, OpenRouterClient, OpenRouterConfig, OpenRouterFactory};
pub use cost::{CostEstimator, CostLookup};
pub use types::*;

/// Scripted LLM fake for tests.
#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::error::Result;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Returns queued replies in order; repeats the last one when drained.
    pub struct ScriptedLlm {
        replies: Mutex<VecDeque<LlmReply>>,
        last: Mutex<Option<LlmReply>>,
        pub calls: AtomicUsize,
    }

    impl ScriptedLlm {
        pub fn new(replies: Vec<LlmReply>) -> Arc<Self> {
            Arc::new(ScriptedLlm {
                replies: Mutex::new(replies.into()),
                last: Mutex::new(None),
                calls: AtomicUsize::new(0),
            })
        }

        /// A reply with plain text and token usage.
        pub fn text_reply(content: &str, prompt: u64, completion: u64) -> LlmReply {
            LlmReply {
                content: content.to_string(),
                tool_calls: vec![],
                usage: Some(Usage {
                    prompt_tokens: prompt,
                    completion_tokens: completion,
                    total_tokens: prompt + completion,
                }),
            }
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn invoke(
            &self,
            _messages: &[ChatMessage],
            _tools: &[ToolDefinition],
        ) -> Result<LlmReply> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut queue = self.replies.lock().unwrap();
            if let Some(reply) = queue.pop_front() {
                *self.last.lock().unwrap() = Some(reply.clone());
                Ok(reply)
            } else if let Some(last) = self.last.lock().unwrap().clone() {
                Ok(last)
            } else {
                Ok(LlmReply::default())
            }
        }
    }

    /// Factory that always hands out the same scripted client.
    pub struct ScriptedFactory(pub Arc<ScriptedLlm>);

    impl LlmFactory for ScriptedFactory {
        fn client(&self, _model: &str) -> Result<Arc<dyn LlmClient>> {
            Ok(self.0.clone())
        }

        fn client_with_options(
            &self,
            _model: &str,
            _options: GenerationOptions,
        ) -> Result<Arc<dyn LlmClient>> {
            Ok(self.0.clone())
        }
    }
}
