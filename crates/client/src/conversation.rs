//! Conversation state
//!
//! Turn lifecycle: `Idle -> AwaitingResponse -> Streaming -> Settled`, with
//! `Error` reachable from either in-flight state. A settled or failed turn
//! accepts the next send.

use chrono::{DateTime, Utc};
use uuid::Uuid;
use vejovis_common::chat::{ChatMessage, Role};

use crate::accumulator::RenderUpdate;
use crate::errors::{ClientError, Result};

/// Opening assistant message of every conversation
pub const GREETING: &str = "Hello! I'm your research assistant. Ask me about the papers in the corpus: \
topics, trends over time, research gaps, or specific findings.";

/// Shown in place of the answer when the stream fails
pub const STREAM_ERROR_MESSAGE: &str = "Sorry, I encountered an error connecting to the AI.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Idle,
    AwaitingResponse,
    Streaming,
    Settled,
    Error,
}

impl TurnState {
    pub fn is_in_flight(self) -> bool {
        matches!(self, TurnState::AwaitingResponse | TurnState::Streaming)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: Uuid,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// A started turn: the placeholder to fill and the history to send
#[derive(Debug, Clone)]
pub struct Turn {
    pub placeholder_id: Uuid,
    pub history: Vec<ChatMessage>,
}

#[derive(Debug)]
pub struct Conversation {
    messages: Vec<Message>,
    state: TurnState,
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

impl Conversation {
    pub fn new() -> Self {
        Self {
            messages: vec![Message::new(Role::Assistant, GREETING)],
            state: TurnState::Idle,
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    pub fn is_in_flight(&self) -> bool {
        self.state.is_in_flight()
    }

    pub fn message(&self, id: Uuid) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    /// Append the user message and an empty assistant placeholder.
    ///
    /// The returned history covers everything before the placeholder.
    pub fn begin_turn(&mut self, text: &str) -> Result<Turn> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ClientError::EmptyMessage);
        }
        if self.is_in_flight() {
            return Err(ClientError::TurnInProgress);
        }

        self.messages.push(Message::new(Role::User, text));
        let history = self
            .messages
            .iter()
            .map(|m| ChatMessage {
                role: m.role,
                content: m.content.clone(),
            })
            .collect();

        let placeholder = Message::new(Role::Assistant, "");
        let placeholder_id = placeholder.id;
        self.messages.push(placeholder);
        self.state = TurnState::AwaitingResponse;

        Ok(Turn {
            placeholder_id,
            history,
        })
    }

    /// Apply an accumulator snapshot to its message
    pub fn apply(&mut self, update: &RenderUpdate) {
        let Some(message) = self.messages.iter_mut().find(|m| m.id == update.message_id) else {
            tracing::warn!(message_id = %update.message_id, "Update for unknown message");
            return;
        };
        message.content.clone_from(&update.text);

        self.state = if update.is_final {
            TurnState::Settled
        } else {
            TurnState::Streaming
        };
    }

    /// Replace the placeholder with the visible error text
    pub fn fail(&mut self, placeholder_id: Uuid, error: &ClientError) {
        tracing::error!(error = %error, "Chat turn failed");
        if let Some(message) = self.messages.iter_mut().find(|m| m.id == placeholder_id) {
            message.content = STREAM_ERROR_MESSAGE.to_string();
        }
        self.state = TurnState::Error;
    }
}
