//! Retrieval-augmented chat orchestration
//!
//! One chat turn flows through:
//! 1. [`router::route`] picks tool calls from the latest user message
//! 2. [`ToolExecutor`] runs them sequentially against the corpus
//! 3. [`assembler::assemble`] joins their outputs into the grounding context
//! 4. [`prompt::system_prompt`] wraps the context into the system instruction
//!
//! The resulting prompt and the caller's message history are then handed to
//! the completion streamer. Nothing is kept between turns.

pub mod assembler;
pub mod prompt;
pub mod router;
pub mod tools;

pub use router::{route, RoutedCall};
pub use tools::{ToolCall, ToolExecutor, UnknownTool};

use crate::db::{Corpus, CorpusSize};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Conversation role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One conversation message as exchanged with the completion provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// The text the router inspects: the content of the last message
pub fn latest_message(messages: &[ChatMessage]) -> Option<&str> {
    messages.last().map(|m| m.content.as_str())
}

/// Result of grounding one turn
#[derive(Debug, Clone)]
pub struct Grounding {
    pub system_prompt: String,
    pub context: String,
    pub tools_invoked: Vec<&'static str>,
    pub corpus: CorpusSize,
}

/// Routes, executes and assembles the grounding for a chat turn
#[derive(Clone)]
pub struct ChatPipeline {
    corpus: Arc<dyn Corpus>,
    executor: ToolExecutor,
}

impl ChatPipeline {
    pub fn new(corpus: Arc<dyn Corpus>, executor: ToolExecutor) -> Self {
        Self { corpus, executor }
    }

    pub fn executor(&self) -> &ToolExecutor {
        &self.executor
    }

    /// Build the system prompt for `message`. Tool failures are folded into
    /// the context, so this never fails.
    pub async fn ground(&self, message: &str) -> Grounding {
        let start = Instant::now();

        let corpus = match self.corpus.corpus_size().await {
            Ok(size) => size,
            Err(e) => {
                warn!(error = %e, "Failed to count corpus, reporting zero");
                CorpusSize::default()
            }
        };

        let calls = route(message);
        let mut outputs = Vec::with_capacity(calls.len());
        let mut tools_invoked = Vec::with_capacity(calls.len());

        // Sequential on purpose: latency is the sum of the triggered tools
        for routed in &calls {
            let output = self.executor.execute(&routed.call, message).await;
            tools_invoked.push(routed.call.name());
            outputs.push(routed.render(output));
        }

        let context = assembler::assemble(&outputs);
        let system_prompt = prompt::system_prompt(corpus, &context);

        let elapsed = start.elapsed().as_secs_f64();
        crate::metrics::record_chat(elapsed, tools_invoked.len(), "grounded");
        info!(
            tools = ?tools_invoked,
            context_len = context.len(),
            duration_ms = (elapsed * 1000.0) as u64,
            "Grounded chat turn"
        );

        Grounding {
            system_prompt,
            context,
            tools_invoked,
            corpus,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetrievalConfig;
    use crate::db::{InMemoryCorpus, Paper};
    use crate::embeddings::MockEmbedder;

    fn pipeline(corpus: InMemoryCorpus) -> ChatPipeline {
        let corpus: Arc<dyn Corpus> = Arc::new(corpus);
        let executor = ToolExecutor::new(
            corpus.clone(),
            Arc::new(MockEmbedder::new(8)),
            RetrievalConfig::default(),
        );
        ChatPipeline::new(corpus, executor)
    }

    fn paper(id: i64, title: &str, entities: &[&str]) -> Paper {
        Paper {
            id,
            filename: None,
            title: title.to_string(),
            pub_year: Some(2001),
            summary: Some(format!("About {}", title)),
            findings: None,
            hypothesis: None,
            entities: entities.iter().map(|e| e.to_string()).collect(),
        }
    }

    #[test]
    fn test_role_serialization() {
        let msg = ChatMessage::assistant("hi");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "assistant");

        let parsed: ChatMessage = serde_json::from_str(r#"{"role":"user","content":"x"}"#).unwrap();
        assert_eq!(parsed, ChatMessage::user("x"));
    }

    #[tokio::test]
    async fn test_unmatched_message_grounds_with_fallback_searches() {
        let pipeline = pipeline(
            InMemoryCorpus::new()
                .with_paper(paper(7, "Spider silk proteins", &["silk"]))
                .with_chunk(7, "Silk is strong"),
        );

        let grounding = pipeline.ground("tell me about silk").await;
        assert_eq!(grounding.tools_invoked, vec!["search_papers", "search_content"]);
        assert!(grounding.context.starts_with("SEMANTIC SEARCH RESULTS:\n"));
        assert!(grounding.context.contains("FULL TEXT SEARCH:\n"));
        assert!(grounding.context.contains("(paper:7)"));
        assert!(grounding.system_prompt.starts_with(
            "You are a Research Oracle for 1 scientific papers (1 text segments)."
        ));
    }

    #[tokio::test]
    async fn test_tool_failure_does_not_abort_turn() {
        let pipeline = pipeline(InMemoryCorpus::failing("relation \"papers\" does not exist"));

        let grounding = pipeline.ground("what are the topics").await;
        assert_eq!(grounding.corpus, CorpusSize::default());
        assert!(grounding.context.starts_with("Error: "));
        assert!(grounding.system_prompt.contains("## DATA PROVIDED:\nError: "));
    }

    #[tokio::test]
    async fn test_multiple_groups_keep_rule_order() {
        let pipeline = pipeline(
            InMemoryCorpus::new()
                .with_paper(paper(1, "A", &["DNA"]))
                .with_paper(paper(2, "B", &["DNA"])),
        );

        let grounding = pipeline.ground("Give me a database overview and hidden connections").await;
        assert_eq!(grounding.tools_invoked, vec!["database_stats", "find_connections"]);
        let overview = grounding.context.find("## DATABASE OVERVIEW").unwrap();
        let connections = grounding.context.find("**Connections via shared topics:**").unwrap();
        assert!(overview < connections);
    }

    #[test]
    fn test_latest_message() {
        let history = vec![ChatMessage::user("first"), ChatMessage::assistant("reply"), ChatMessage::user("second")];
        assert_eq!(latest_message(&history), Some("second"));
        assert_eq!(latest_message(&[]), None);
    }
}
