//! The LLM transport port. Concrete adapters (OpenAI-compatible chat
//! completion, local Ollama-style completion) live in the gateway crate;
//! the pipeline only ever depends on this trait.

use async_trait::async_trait;

use crate::error::CompleterError;
use crate::types::{CompletionOptions, TokenUsage};

#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub text: String,
    pub usage: TokenUsage,
}

#[async_trait]
pub trait Completer: Send + Sync {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        options: CompletionOptions,
    ) -> Result<CompletionResponse, CompleterError>;
}

#[cfg(test)]
pub mod test_support {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// A `Completer` that returns a fixed sequence of canned responses,
    /// one per call, cycling back to the last one once exhausted. Used
    /// across the stage unit tests.
    pub struct FakeCompleter {
        responses: Mutex<Vec<String>>,
        calls: AtomicUsize,
    }

    impl FakeCompleter {
        pub fn new(responses: Vec<&str>) -> Self {
            FakeCompleter {
                responses: Mutex::new(responses.into_iter().map(|s| s.to_string()).collect()),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Completer for FakeCompleter {
        async fn complete(
            &self,
            _system_prompt: &str,
            _user_prompt: &str,
            _options: CompletionOptions,
        ) -> Result<CompletionResponse, CompleterError> {
            let idx = self.calls.fetch_add(1, Ordering::SeqCst);
            let responses = self.responses.lock().unwrap();
            let text = responses[idx.min(responses.len() - 1)].clone();
            Ok(CompletionResponse {
                text,
                usage: TokenUsage::new(10, 10),
            })
        }
    }
}
