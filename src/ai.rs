use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::error;

use crate::config::AppConfig;

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("completion request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("completion API returned status {status}: {body}")]
    Upstream { status: u16, body: String },
    #[error("completion API returned no content")]
    MissingContent,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Upstream chat-completions seam. One implementation talks to the hosted
/// API; tests script responses through a fake. No retries anywhere: an
/// upstream failure is returned to the caller as-is.
#[async_trait]
pub trait CompletionClient: Send + Sync + 'static {
    async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionError>;
}

pub struct HttpCompletionClient {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl HttpCompletionClient {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            endpoint: config.completion_endpoint.trim_end_matches('/').to_string(),
            api_key: config.completion_api_key.clone(),
            model: config.completion_model.clone(),
        }
    }
}

#[derive(Serialize)]
struct CompletionPayload<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: Option<ChoiceMessage>,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[async_trait]
impl CompletionClient for HttpCompletionClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionError> {
        let url = format!("{}/chat/completions", self.endpoint);
        let payload = CompletionPayload {
            model: &self.model,
            messages: &request.messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            error!(%status, body = %body, "completion API request failed");
            return Err(CompletionError::Upstream { status, body });
        }

        let parsed: CompletionResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message)
            .and_then(|message| message.content)
            .filter(|content| !content.is_empty())
            .ok_or(CompletionError::MissingContent)
    }
}
