//! Streaming text accumulator
//!
//! A task owns the text buffer for one assistant message. Deltas arrive as
//! commands over a channel and a fixed interval emits snapshots, so the
//! render rate is independent of how small the network chunks are.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

use crate::errors::{ClientError, Result};

/// Interval between partial snapshots
pub const FLUSH_INTERVAL: Duration = Duration::from_millis(100);

/// Snapshot of the message being streamed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderUpdate {
    pub message_id: Uuid,
    pub text: String,
    pub is_final: bool,
}

#[derive(Debug)]
enum Command {
    Append(String),
    Flush,
    End(oneshot::Sender<String>),
}

/// Handle to the accumulator task
#[derive(Debug, Clone)]
pub struct Accumulator {
    commands: mpsc::UnboundedSender<Command>,
}

impl Accumulator {
    /// Spawn with the default interval, returning the handle and the update stream
    pub fn spawn(message_id: Uuid) -> (Self, mpsc::UnboundedReceiver<RenderUpdate>) {
        Self::with_interval(message_id, FLUSH_INTERVAL)
    }

    pub fn with_interval(
        message_id: Uuid,
        interval: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<RenderUpdate>) {
        let (commands, inbox) = mpsc::unbounded_channel();
        let (updates, receiver) = mpsc::unbounded_channel();

        tokio::spawn(run(message_id, interval, inbox, updates));

        (Self { commands }, receiver)
    }

    pub fn append(&self, delta: impl Into<String>) -> Result<()> {
        self.send(Command::Append(delta.into()))
    }

    /// Emit a snapshot now if anything changed since the last one
    pub fn flush(&self) -> Result<()> {
        self.send(Command::Flush)
    }

    /// Stop the timer, emit the final snapshot and return the full text
    pub async fn end(&self) -> Result<String> {
        let (reply, response) = oneshot::channel();
        self.send(Command::End(reply))?;
        response.await.map_err(|_| ClientError::AccumulatorClosed)
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| ClientError::AccumulatorClosed)
    }
}

async fn run(
    message_id: Uuid,
    interval: Duration,
    mut inbox: mpsc::UnboundedReceiver<Command>,
    updates: mpsc::UnboundedSender<RenderUpdate>,
) {
    let mut buffer = String::new();
    let mut dirty = false;
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let emit = |text: &str, is_final: bool| {
        // The receiver going away only means nobody renders any more
        let _ = updates.send(RenderUpdate {
            message_id,
            text: text.to_string(),
            is_final,
        });
    };

    loop {
        tokio::select! {
            command = inbox.recv() => match command {
                Some(Command::Append(delta)) => {
                    buffer.push_str(&delta);
                    dirty = true;
                }
                Some(Command::Flush) => {
                    if dirty {
                        emit(&buffer, false);
                        dirty = false;
                    }
                }
                Some(Command::End(reply)) => {
                    emit(&buffer, true);
                    let _ = reply.send(buffer);
                    return;
                }
                None => return,
            },
            _ = ticker.tick() => {
                if dirty {
                    emit(&buffer, false);
                    dirty = false;
                }
            }
        }
    }
}
