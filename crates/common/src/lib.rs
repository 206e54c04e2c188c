//! Vejovis Common Library
//!
//! Shared code for the Vejovis services including:
//! - Corpus access (database models, stored-procedure calls, repository)
//! - Embedding client abstraction
//! - Streaming chat-completion client
//! - Chat orchestration: tools, intent routing, context assembly, prompt building
//! - Error types and handling
//! - Configuration management
//! - Metrics and observability

pub mod chat;
pub mod completion;
pub mod config;
pub mod db;
pub mod embeddings;
pub mod errors;
pub mod metrics;

// Re-export commonly used types
pub use errors::{AppError, Result};
pub use config::AppConfig;
pub use db::{Corpus, Repository};
pub use embeddings::Embedder;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default embedding model
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// Default embedding dimension
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 1536;

/// Default chat-completion model
pub const DEFAULT_COMPLETION_MODEL: &str = "deepseek-chat";
