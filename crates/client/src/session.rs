//! One chat session against the gateway
//!
//! A turn runs two things concurrently: a pump that reads the event stream
//! into the accumulator, and the update loop that applies accumulator
//! snapshots to the conversation.

use std::time::Duration;

use futures::StreamExt;
use uuid::Uuid;

use crate::accumulator::{Accumulator, RenderUpdate, FLUSH_INTERVAL};
use crate::api::GatewayClient;
use crate::conversation::{Conversation, TurnState};
use crate::errors::Result;
use crate::sse::{SseDecoder, SseEvent};

pub struct ChatSession {
    client: GatewayClient,
    conversation: Conversation,
    flush_interval: Duration,
}

impl ChatSession {
    pub fn new(client: GatewayClient) -> Self {
        Self {
            client,
            conversation: Conversation::new(),
            flush_interval: FLUSH_INTERVAL,
        }
    }

    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    pub fn client(&self) -> &GatewayClient {
        &self.client
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Send `text` and stream the answer, calling `on_update` for every
    /// snapshot applied to the conversation. Returns the final answer text.
    ///
    /// On failure the placeholder shows the error message and the error is
    /// returned; the session stays usable.
    pub async fn send<F>(&mut self, text: &str, mut on_update: F) -> Result<String>
    where
        F: FnMut(&RenderUpdate),
    {
        let turn = self.conversation.begin_turn(text)?;
        let (accumulator, mut updates) =
            Accumulator::with_interval(turn.placeholder_id, self.flush_interval);

        let client = &self.client;
        let conversation = &mut self.conversation;

        let outcome = {
            let pump = pump(client, &turn.history, &accumulator);
            tokio::pin!(pump);

            loop {
                tokio::select! {
                    result = &mut pump => break result,
                    Some(update) = updates.recv() => {
                        conversation.apply(&update);
                        on_update(&update);
                    }
                }
            }
        };
        // Closing the handle stops the task after a failed turn
        drop(accumulator);

        while let Some(update) = updates.recv().await {
            conversation.apply(&update);
            on_update(&update);
        }

        match outcome {
            Ok(text) => {
                if conversation.state() != TurnState::Settled {
                    let update = final_update(turn.placeholder_id, &text);
                    conversation.apply(&update);
                    on_update(&update);
                }
                Ok(text)
            }
            Err(e) => {
                conversation.fail(turn.placeholder_id, &e);
                Err(e)
            }
        }
    }
}

fn final_update(message_id: Uuid, text: &str) -> RenderUpdate {
    RenderUpdate {
        message_id,
        text: text.to_string(),
        is_final: true,
    }
}

/// Read the chat body into the accumulator until `[DONE]` or end of body
async fn pump(
    client: &GatewayClient,
    history: &[vejovis_common::chat::ChatMessage],
    accumulator: &Accumulator,
) -> Result<String> {
    let mut stream = client.open_chat(history).await?;
    let mut decoder = SseDecoder::new();

    let mut forward = |events: Vec<SseEvent>| -> Result<()> {
        for event in events {
            if let SseEvent::Delta(text) = event {
                accumulator.append(text)?;
            }
        }
        Ok(())
    };

    while let Some(chunk) = stream.next().await {
        forward(decoder.push(&chunk?))?;
        if decoder.is_done() {
            break;
        }
    }
    forward(decoder.finish())?;

    accumulator.end().await
}
