use crate::config::ModelConfig;
use crate::types::{DigestError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

/// The chat-completion seam every model-backed stage goes through.
/// Production uses [`OpenAiClient`]; tests script responses with
/// [`ScriptedModel`].
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, system: &str, user: &str) -> Result<String>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

/// OpenAI-compatible chat-completions client. One blocking call per
/// request, no retries: a failed call degrades the stage that issued it
/// and is attempted again on the next scheduled run.
pub struct OpenAiClient {
    client: Client,
    config: ModelConfig,
}

impl OpenAiClient {
    pub fn new(config: ModelConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .expect("Failed to create HTTP client");
        Self { client, config }
    }
}

#[async_trait]
impl ChatModel for OpenAiClient {
    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            temperature: 0.3,
        };

        debug!("chat request to {} ({} chars)", self.config.model, user.len());
        let response = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DigestError::Model(format!("HTTP {status}: {body}")));
        }

        let parsed: ChatResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content.trim().to_string())
            .ok_or_else(|| DigestError::Model("response contained no choices".to_string()))
    }
}

/// Deterministic model for tests: pops one canned response per call.
pub struct ScriptedModel {
    responses: Mutex<VecDeque<Result<String>>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
        }
    }

    pub fn push_ok(&self, text: &str) {
        self.responses
            .lock()
            .expect("scripted model lock")
            .push_back(Ok(text.to_string()));
    }

    pub fn push_err(&self, reason: &str) {
        self.responses
            .lock()
            .expect("scripted model lock")
            .push_back(Err(DigestError::Model(reason.to_string())));
    }
}

impl Default for ScriptedModel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn complete(&self, _system: &str, _user: &str) -> Result<String> {
        self.responses
            .lock()
            .expect("scripted model lock")
            .pop_front()
            .unwrap_or_else(|| Err(DigestError::Model("script exhausted".to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_model_replays_in_order() {
        let model = ScriptedModel::new();
        model.push_ok("first");
        model.push_err("down");

        assert_eq!(model.complete("s", "u").await.unwrap(), "first");
        assert!(model.complete("s", "u").await.is_err());
        assert!(model.complete("s", "u").await.is_err());
    }
}
