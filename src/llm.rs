//! LLM provider contract (§6 "Upstream collaborators"): chat-completion
//! style, `(model, max_tokens, system_text, user_text) -> text`. Errors are
//! recoverable; every caller in this crate (Capturer, ConflictDetector,
//! EntityExtractor, Reasoner) degrades rather than propagates a hard failure.

use crate::error::Result;

pub trait LlmProvider: Send + Sync {
    fn complete(&self, model: &str, max_tokens: u32, system_text: &str, user_text: &str) -> Result<String>;
}

#[cfg(feature = "openai")]
pub mod openai {
    use super::LlmProvider;
    use crate::error::{MemoriaError, Result};

    pub struct OpenAiChatProvider {
        client: reqwest::Client,
        api_key: String,
        base_url: String,
    }

    impl OpenAiChatProvider {
        pub fn new(api_key: String) -> Self {
            Self {
                client: reqwest::Client::new(),
                api_key,
                base_url: "https://api.openai.com/v1".to_string(),
            }
        }

        pub fn with_base_url(mut self, base_url: String) -> Self {
            self.base_url = base_url;
            self
        }

        async fn complete_async(
            &self,
            model: &str,
            max_tokens: u32,
            system_text: &str,
            user_text: &str,
        ) -> Result<String> {
            let response = self
                .client
                .post(format!("{}/chat/completions", self.base_url))
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(&serde_json::json!({
                    "model": model,
                    "max_tokens": max_tokens,
                    "messages": [
                        {"role": "system", "content": system_text},
                        {"role": "user", "content": user_text},
                    ],
                }))
                .send()
                .await?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(MemoriaError::LlmDegraded(format!(
                    "llm provider returned {status}: {body}"
                )));
            }

            let data: serde_json::Value = response.json().await?;
            data["choices"][0]["message"]["content"]
                .as_str()
                .map(|s| s.to_string())
                .ok_or_else(|| MemoriaError::LlmDegraded("malformed completion response".to_string()))
        }
    }

    impl LlmProvider for OpenAiChatProvider {
        fn complete(&self, model: &str, max_tokens: u32, system_text: &str, user_text: &str) -> Result<String> {
            tokio::task::block_in_place(|| {
                tokio::runtime::Handle::current()
                    .block_on(self.complete_async(model, max_tokens, system_text, user_text))
            })
        }
    }
}

#[cfg(feature = "openai")]
pub use openai::OpenAiChatProvider;

/// Gated on `test-util` (not just `cfg(test)`) so `tests/*.rs` integration
/// crates — which link this library built without `cfg(test)` — can still
/// reach `ScriptedLlm`. The `test-util` feature is enabled for the dev
/// build via the self-referential `[dev-dependencies]` entry in
/// `Cargo.toml`.
#[cfg(any(test, feature = "test-util"))]
pub mod test_support {
    //! A scriptable in-memory `LlmProvider` for unit tests of the Capturer /
    //! ConflictDetector / EntityExtractor / Reasoner, so their degrade-on-error
    //! paths can be exercised without a live network call.
    use super::LlmProvider;
    use crate::error::{MemoriaError, Result};
    use parking_lot::Mutex;

    pub struct ScriptedLlm {
        responses: Mutex<Vec<Result<String>>>,
        pub last_user_text: Mutex<Option<String>>,
    }

    impl ScriptedLlm {
        pub fn new(responses: Vec<Result<String>>) -> Self {
            Self {
                responses: Mutex::new(responses),
                last_user_text: Mutex::new(None),
            }
        }

        pub fn ok(text: impl Into<String>) -> Self {
            Self::new(vec![Ok(text.into())])
        }

        pub fn erroring() -> Self {
            Self::new(vec![Err(MemoriaError::LlmDegraded("simulated failure".into()))])
        }
    }

    impl LlmProvider for ScriptedLlm {
        fn complete(&self, _model: &str, _max_tokens: u32, _system_text: &str, user_text: &str) -> Result<String> {
            *self.last_user_text.lock() = Some(user_text.to_string());
            let mut responses = self.responses.lock();
            if responses.is_empty() {
                return Err(MemoriaError::LlmDegraded("no scripted response left".into()));
            }
            responses.remove(0)
        }
    }
}
