//! Chat handler
//!
//! Grounds the latest user message against the corpus, then relays the
//! completion provider's SSE body to the caller byte for byte.

use axum::{
    body::Body,
    extract::State,
    http::header,
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::Deserialize;
use validator::Validate;

use crate::middleware::guard::ClientIp;
use crate::AppState;
use vejovis_common::{
    chat::{latest_message, ChatMessage},
    errors::{AppError, Result},
};

/// Chat request: the full conversation so far, newest message last
#[derive(Debug, Deserialize, Validate)]
pub struct ChatRequest {
    #[validate(length(min = 1, max = 200, message = "messages must contain 1 to 200 entries"))]
    pub messages: Vec<ChatMessage>,
}

/// Stream a grounded answer for the conversation
pub async fn chat(
    State(state): State<AppState>,
    Extension(client_ip): Extension<ClientIp>,
    Json(request): Json<ChatRequest>,
) -> Result<Response> {
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: Some("messages".to_string()),
    })?;

    let pipeline = state.pipeline()?;
    let completion = state.completion()?;

    let message = latest_message(&request.messages).unwrap_or_default();
    tracing::info!(
        client_ip = %client_ip.0,
        history = request.messages.len(),
        "Chat turn received"
    );

    let grounding = pipeline.ground(message).await;
    let stream = completion
        .stream_chat(&grounding.system_prompt, &request.messages)
        .await?;

    tracing::info!(
        client_ip = %client_ip.0,
        tools = ?grounding.tools_invoked,
        "Streaming completion"
    );

    Ok((
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(stream),
    )
        .into_response())
}
