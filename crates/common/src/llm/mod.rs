//! Language model client
//!
//! Chat completions against an OpenAI-compatible `/chat/completions`
//! endpoint. The model name and API key travel with each request so one
//! client serves every tenant.

use crate::config::LlmConfig;
use async_trait::async_trait;
use backoff::ExponentialBackoffBuilder;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;

/// Failures of a completion call
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    #[error("Provider rejected credentials (HTTP {status})")]
    Authentication { status: u16 },

    #[error("Provider error (HTTP {status}): {message}")]
    Provider { status: u16, message: String },

    #[error("Transport error: {message}")]
    Transport { message: String },

    #[error("Provider returned an empty completion")]
    EmptyResponse,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".to_string(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".to_string(), content: content.into() }
    }
}

/// One completion call
#[derive(Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub api_key: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl fmt::Debug for CompletionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionRequest")
            .field("model", &self.model)
            .field("api_key", &"***")
            .field("messages", &self.messages)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .finish()
    }
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Return the completion text for `request`
    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError>;
}

/// HTTP client for OpenAI-compatible chat completions
pub struct OpenAiChatClient {
    client: reqwest::Client,
    endpoint: String,
    connect_retry: Duration,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    content: Option<String>,
}

impl OpenAiChatClient {
    pub fn new(config: &LlmConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.api_base.trim_end_matches('/')),
            connect_retry: Duration::from_secs(config.connect_retry_secs),
        })
    }

    /// Send the request, retrying only while the connection cannot be
    /// established. Once a request has been dispatched it is never repeated.
    async fn send(&self, request: &CompletionRequest) -> Result<reqwest::Response, LlmError> {
        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(200))
            .with_max_elapsed_time(Some(self.connect_retry))
            .build();

        let body = ChatRequest {
            model: &request.model,
            messages: &request.messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };
        let (client, endpoint, body, key) = (&self.client, &self.endpoint, &body, &request.api_key);

        backoff::future::retry(policy, || async move {
            client
                .post(endpoint)
                .bearer_auth(key)
                .json(body)
                .send()
                .await
                .map_err(|e| {
                    if e.is_connect() {
                        tracing::debug!(error = %e, "Model endpoint unreachable, retrying");
                        backoff::Error::transient(e)
                    } else {
                        backoff::Error::permanent(e)
                    }
                })
        })
        .await
        .map_err(|e| LlmError::Transport { message: e.to_string() })
    }
}

#[async_trait]
impl LanguageModel for OpenAiChatClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError> {
        let response = self.send(&request).await?;

        let status = response.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(LlmError::Authentication { status: status.as_u16() });
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(LlmError::Provider { status: status.as_u16(), message });
        }

        let chat_response: ChatResponse = response.json().await.map_err(|e| LlmError::Provider {
            status: status.as_u16(),
            message: format!("Failed to parse completion: {}", e),
        })?;

        chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.is_empty())
            .ok_or(LlmError::EmptyResponse)
    }
}

/// Scripted model for tests: returns a fixed outcome and records every request
pub struct MockLanguageModel {
    outcome: Result<String, LlmError>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl MockLanguageModel {
    pub fn replying(text: impl Into<String>) -> Self {
        Self { outcome: Ok(text.into()), requests: Mutex::new(Vec::new()) }
    }

    pub fn failing(error: LlmError) -> Self {
        Self { outcome: Err(error), requests: Mutex::new(Vec::new()) }
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or_default()
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl LanguageModel for MockLanguageModel {
    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }
        self.outcome.clone()
    }
}
