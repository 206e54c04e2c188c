//! Vejovis Client Library
//!
//! Consumer side of the research chat:
//! - Gateway API client (chat stream, paper detail)
//! - Byte-level SSE decoding of the relayed completion stream
//! - An accumulator task that batches deltas into render snapshots
//! - Conversation state machine and auto-scroll policy
//! - Citation rewriting and inline segment rendering
//! - Cancellable-by-replacement paper detail loading

pub mod accumulator;
pub mod api;
pub mod citation;
pub mod conversation;
pub mod detail;
pub mod errors;
pub mod scroll;
pub mod session;
pub mod sse;

pub use api::{GatewayClient, PaperDetail};
pub use conversation::{Conversation, Message, TurnState};
pub use errors::{ClientError, Result};
pub use session::ChatSession;
