//! Streaming chat-completion client
//!
//! Sends the system prompt plus the conversation to an OpenAI-compatible
//! chat-completions endpoint with `stream: true` and hands back the raw
//! response body. The bytes are relayed untouched; SSE framing is the
//! caller's concern.

use crate::chat::{ChatMessage, Role};
use crate::config::CompletionConfig;
use crate::errors::{AppError, Result};
use crate::metrics;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde::Serialize;
use std::pin::Pin;
use std::time::Duration;
use tracing::{debug, warn};

/// Raw upstream body chunks
pub type CompletionStream = Pin<Box<dyn Stream<Item = std::result::Result<Bytes, reqwest::Error>> + Send>>;

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    stream: bool,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: Role,
    content: &'a str,
}

/// Client for the chat-completion provider
#[derive(Clone)]
pub struct CompletionClient {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
    model: String,
}

impl CompletionClient {
    /// Build a client, failing when no API key is configured
    pub fn new(config: &CompletionConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| AppError::configuration("DEEPSEEK_API_KEY is not set"))?;

        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| AppError::Internal {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            api_key,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Open a streamed completion. The system prompt goes first, followed
    /// by `messages` in order.
    pub async fn stream_chat(&self, system_prompt: &str, messages: &[ChatMessage]) -> Result<CompletionStream> {
        let wire = std::iter::once(WireMessage {
            role: Role::System,
            content: system_prompt,
        })
        .chain(messages.iter().map(|m| WireMessage {
            role: m.role,
            content: &m.content,
        }))
        .collect();

        let request = CompletionRequest {
            model: &self.model,
            messages: wire,
            stream: true,
        };

        debug!(model = %self.model, messages = messages.len(), "Opening completion stream");

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, endpoint = %self.endpoint, "Completion API unreachable");
                AppError::CompletionUnavailable { message: e.to_string() }
            })?;

        let status = response.status();
        metrics::record_completion_stream(&self.model, status.as_u16());

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), body = %body, "Completion API rejected request");
            return Err(AppError::Completion {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.bytes_stream().boxed())
    }
}
