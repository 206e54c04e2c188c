//! Client error types

use thiserror::Error;
use vejovis_common::db::PaperId;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success status from the gateway, with its `error` message when present
    #[error("Gateway error {status}: {message}")]
    Gateway { status: u16, message: String },

    #[error("Paper not found: {0}")]
    PaperNotFound(PaperId),

    #[error("Message is empty")]
    EmptyMessage,

    #[error("A response is still streaming")]
    TurnInProgress,

    #[error("Accumulator task stopped")]
    AccumulatorClosed,
}

pub type Result<T> = std::result::Result<T, ClientError>;
