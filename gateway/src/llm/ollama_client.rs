//! Local Ollama completion adapter, speaking the `/api/chat` endpoint.
//!
//! Ollama's JSON mode is coarser than OpenAI's: it accepts `"format":
//! "json"` but doesn't guarantee schema adherence the way a
//! `response_format` contract does, so a JSON-output instruction is also
//! appended to the system prompt as a second line of defense. Ollama has
//! no native `thinking` flag on the chat endpoint for most models, so
//! `CompletionOptions::thinking` is only honored when `true` is
//! explicitly requested.

use async_trait::async_trait;
use deliberation_core::completer::{CompletionResponse, Completer};
use deliberation_core::error::CompleterError;
use deliberation_core::types::{CompletionOptions, TokenUsage};
use serde::{Deserialize, Serialize};

const JSON_OUTPUT_INSTRUCTION: &str =
    "Respond with JSON only. Do not include any prose outside of the JSON payload.";

pub struct OllamaCompleter {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaCompleter {
    pub fn new(base_url: String, model: String) -> Self {
        OllamaCompleter {
            client: reqwest::Client::new(),
            base_url,
            model,
        }
    }
}

#[derive(Debug, Serialize)]
struct OllamaMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: Vec<OllamaMessage<'a>>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    think: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: OllamaResponseMessage,
    #[serde(default)]
    prompt_eval_count: u32,
    #[serde(default)]
    eval_count: u32,
}

#[derive(Debug, Deserialize)]
struct OllamaResponseMessage {
    content: String,
}

#[async_trait]
impl Completer for OllamaCompleter {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        options: CompletionOptions,
    ) -> Result<CompletionResponse, CompleterError> {
        let system_prompt = if options.json_mode {
            format!("{system_prompt}\n\n{JSON_OUTPUT_INSTRUCTION}")
        } else {
            system_prompt.to_string()
        };

        let request = OllamaChatRequest {
            model: &self.model,
            messages: vec![
                OllamaMessage { role: "system", content: &system_prompt },
                OllamaMessage { role: "user", content: user_prompt },
            ],
            stream: false,
            format: options.json_mode.then_some("json"),
            think: options.thinking.then_some(true),
        };

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| CompleterError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(CompleterError::Transport(format!(
                "ollama returned {status}: {body}"
            )));
        }

        let parsed: OllamaChatResponse = response
            .json()
            .await
            .map_err(|e| CompleterError::Transport(e.to_string()))?;

        Ok(CompletionResponse {
            text: parsed.message.content,
            usage: TokenUsage::new(parsed.prompt_eval_count, parsed.eval_count),
        })
    }
}
