//! Gateway API client

use std::pin::Pin;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use vejovis_common::{
    chat::ChatMessage,
    db::{Paper, PaperId},
};

use crate::errors::{ClientError, Result};

/// Raw body of a chat response
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Paper detail as served by the gateway
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperDetail {
    #[serde(flatten)]
    pub paper: Paper,
    #[serde(default)]
    pub pdf_url: Option<String>,
}

#[derive(Serialize)]
struct ChatBody<'a> {
    messages: &'a [ChatMessage],
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Clone)]
pub struct GatewayClient {
    http: reqwest::Client,
    base_url: String,
}

impl GatewayClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("vejovis-chat/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Open a chat turn and return the event-stream body
    pub async fn open_chat(&self, messages: &[ChatMessage]) -> Result<ByteStream> {
        let response = self
            .http
            .post(format!("{}/v1/chat", self.base_url))
            .json(&ChatBody { messages })
            .send()
            .await?;

        let response = check(response).await?;
        tracing::debug!(history = messages.len(), "Chat stream opened");

        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(ClientError::from))
            .boxed())
    }

    /// Fetch one paper by id
    pub async fn paper(&self, id: PaperId) -> Result<PaperDetail> {
        let response = self
            .http
            .get(format!("{}/v1/papers/{}", self.base_url, id))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(ClientError::PaperNotFound(id));
        }

        Ok(check(response).await?.json().await?)
    }
}

/// Map a non-success response to a gateway error carrying its message
async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
        .map(|e| e.error)
        .unwrap_or(body);

    Err(ClientError::Gateway {
        status: status.as_u16(),
        message,
    })
}
