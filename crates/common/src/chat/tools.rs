//! Tool executor
//!
//! Every tool is one bounded read against the corpus that renders a short
//! markdown summary. Paper references use the `[📄 Open](paper:<id>)` link
//! scheme the client turns into citation controls.
//!
//! [`ToolExecutor::execute`] never fails: corpus and embedding errors come
//! back as `"Error: <message>"` text so a broken tool only thins the context.

use crate::config::RetrievalConfig;
use crate::db::{
    ChunkMatch, Corpus, CountFilter, EntityStat, Paper, PaperConnection, PaperMatch, YearCount,
};
use crate::embeddings::Embedder;
use crate::errors::Result;
use crate::metrics;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Upper bound on any result count a caller can ask a tool for
pub const MAX_TOOL_LIMIT: usize = 50;

const DEFAULT_TOPIC_LIMIT: usize = 10;
const DEFAULT_TREND_TOPIC: &str = "DNA";
const GAP_MIN_PAPERS: i64 = 1;
const GAP_MAX_PAPERS: i64 = 5;
const GAPS_REPORTED: usize = 10;
const DEFAULT_RANDOM_COUNT: usize = 5;
const CONNECTION_SAMPLE_SIZE: usize = 50;
const CONNECTIONS_REPORTED: usize = 5;
const OVERVIEW_TOPICS: usize = 10;

const EXCERPT_CHARS: usize = 200;
const RANDOM_SUMMARY_CHARS: usize = 150;
const CONNECTION_TITLE_CHARS: usize = 50;

const AVAILABLE_TOOLS: &str = "search_papers, search_content, count_papers, list_topics, analyze_trends, find_gaps, random_explore, find_connections, database_stats";

/// Arguments shared by the two similarity searches
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchArgs {
    /// Text to embed; the user's message when absent
    pub query: Option<String>,
    /// Result count; the configured default when absent
    pub limit: Option<usize>,
}

/// A tool invocation with typed arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolCall {
    SearchPapers(SearchArgs),
    SearchContent(SearchArgs),
    CountPapers(CountFilter),
    ListTopics { limit: usize },
    AnalyzeTrends { topic: String },
    FindGaps,
    RandomExplore { count: usize },
    FindConnections,
    DatabaseStats,
}

/// A tool name that matches no tool or alias
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownTool(pub String);

impl fmt::Display for UnknownTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Unknown tool: {}. Available: {}", self.0, AVAILABLE_TOOLS)
    }
}

impl std::error::Error for UnknownTool {}

impl ToolCall {
    /// Canonical tool name
    pub fn name(&self) -> &'static str {
        match self {
            ToolCall::SearchPapers(_) => "search_papers",
            ToolCall::SearchContent(_) => "search_content",
            ToolCall::CountPapers(_) => "count_papers",
            ToolCall::ListTopics { .. } => "list_topics",
            ToolCall::AnalyzeTrends { .. } => "analyze_trends",
            ToolCall::FindGaps => "find_gaps",
            ToolCall::RandomExplore { .. } => "random_explore",
            ToolCall::FindConnections => "find_connections",
            ToolCall::DatabaseStats => "database_stats",
        }
    }

    /// Parse a named invocation with a loose JSON argument bag.
    ///
    /// Accepts the alias names older clients used. Missing, empty, zero or
    /// mistyped arguments fall back to the tool's default. Counts are capped
    /// at [`MAX_TOOL_LIMIT`].
    pub fn from_invocation(name: &str, args: &Value) -> std::result::Result<Self, UnknownTool> {
        let call = match name {
            "search_papers" => ToolCall::SearchPapers(SearchArgs {
                query: str_arg(args, &["query", "topic"]),
                limit: usize_arg(args, "limit"),
            }),
            "search_content" | "search_paper_content" => ToolCall::SearchContent(SearchArgs {
                query: str_arg(args, &["query"]),
                limit: usize_arg(args, "limit"),
            }),
            "count_papers" => ToolCall::CountPapers(CountFilter {
                year: year_arg(args, "year"),
                year_min: year_arg(args, "year_min"),
                year_max: year_arg(args, "year_max"),
                entity: str_arg(args, &["entity", "topic"]),
            }),
            "list_topics" | "get_topics" => ToolCall::ListTopics {
                limit: usize_arg(args, "limit").unwrap_or(DEFAULT_TOPIC_LIMIT),
            },
            "analyze_trends" | "get_trends" => ToolCall::AnalyzeTrends {
                topic: str_arg(args, &["topic", "entity"])
                    .unwrap_or_else(|| DEFAULT_TREND_TOPIC.to_string()),
            },
            "find_gaps" | "research_gaps" => ToolCall::FindGaps,
            "random_explore" | "discover" | "random_exploration" => ToolCall::RandomExplore {
                count: usize_arg(args, "count").unwrap_or(DEFAULT_RANDOM_COUNT),
            },
            "find_connections" | "discover_connections" => ToolCall::FindConnections,
            "database_stats" | "overview" => ToolCall::DatabaseStats,
            other => return Err(UnknownTool(other.to_string())),
        };
        Ok(call)
    }
}

fn str_arg(args: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| args.get(*key))
        .filter_map(|value| match value {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .next()
}

/// Largest float that still converts to an integer exactly
const MAX_SAFE_FLOAT_INT: f64 = 9_007_199_254_740_992.0;

fn int_arg(args: &Value, key: &str) -> Option<i64> {
    let value = match args.get(key)? {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && f.abs() < MAX_SAFE_FLOAT_INT)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    value.filter(|v| *v != 0)
}

fn usize_arg(args: &Value, key: &str) -> Option<usize> {
    int_arg(args, key)
        .and_then(|v| usize::try_from(v).ok())
        .map(|v| v.min(MAX_TOOL_LIMIT))
}

fn year_arg(args: &Value, key: &str) -> Option<i32> {
    int_arg(args, key).and_then(|v| i32::try_from(v).ok())
}

/// First `max` characters of `text`
fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn year_label(year: Option<i32>) -> String {
    year.map_or_else(|| "?".to_string(), |y| y.to_string())
}

fn non_empty(text: &Option<String>) -> Option<&str> {
    text.as_deref().filter(|s| !s.is_empty())
}

/// Runs tool calls against a corpus
#[derive(Clone)]
pub struct ToolExecutor {
    corpus: Arc<dyn Corpus>,
    embedder: Arc<dyn Embedder>,
    retrieval: RetrievalConfig,
}

impl ToolExecutor {
    pub fn new(corpus: Arc<dyn Corpus>, embedder: Arc<dyn Embedder>, retrieval: RetrievalConfig) -> Self {
        Self {
            corpus,
            embedder,
            retrieval,
        }
    }

    /// Run one tool call. `user_message` stands in for a missing search query.
    pub async fn execute(&self, call: &ToolCall, user_message: &str) -> String {
        let name = call.name();
        debug!(tool = name, ?call, "Executing tool");

        let start = Instant::now();
        let result = self.run(call, user_message).await;
        metrics::record_tool(name, start.elapsed().as_secs_f64(), result.is_ok());

        match result {
            Ok(text) => text,
            Err(e) => {
                warn!(tool = name, error = %e, "Tool failed");
                format!("Error: {}", e)
            }
        }
    }

    /// Parse and run a named invocation. Unknown names return the list of
    /// valid tools instead of failing.
    pub async fn execute_named(&self, name: &str, args: &Value, user_message: &str) -> String {
        match ToolCall::from_invocation(name, args) {
            Ok(call) => self.execute(&call, user_message).await,
            Err(unknown) => {
                warn!(tool = name, "Unknown tool requested");
                unknown.to_string()
            }
        }
    }

    async fn run(&self, call: &ToolCall, user_message: &str) -> Result<String> {
        match call {
            ToolCall::SearchPapers(args) => {
                let query = args.query.as_deref().unwrap_or(user_message);
                let limit = args.limit.unwrap_or(self.retrieval.search_limit).min(MAX_TOOL_LIMIT);
                self.search_papers(query, limit).await
            }
            ToolCall::SearchContent(args) => {
                let query = args.query.as_deref().unwrap_or(user_message);
                let limit = args.limit.unwrap_or(self.retrieval.content_limit).min(MAX_TOOL_LIMIT);
                self.search_content(query, limit).await
            }
            ToolCall::CountPapers(filter) => self.count_papers(filter).await,
            ToolCall::ListTopics { limit } => self.list_topics((*limit).min(MAX_TOOL_LIMIT)).await,
            ToolCall::AnalyzeTrends { topic } => self.analyze_trends(topic).await,
            ToolCall::FindGaps => self.find_gaps().await,
            ToolCall::RandomExplore { count } => self.random_explore((*count).min(MAX_TOOL_LIMIT)).await,
            ToolCall::FindConnections => self.find_connections().await,
            ToolCall::DatabaseStats => self.database_stats().await,
        }
    }

    async fn search_papers(&self, query: &str, limit: usize) -> Result<String> {
        let embedding = self.embedder.embed(query).await?;
        let hits = self
            .corpus
            .match_papers(&embedding, self.retrieval.match_threshold, limit)
            .await?;

        if hits.is_empty() {
            return Ok("No papers found matching this query.".to_string());
        }
        Ok(hits.iter().map(format_paper_hit).collect::<Vec<_>>().join("\n\n"))
    }

    async fn search_content(&self, query: &str, limit: usize) -> Result<String> {
        let embedding = self.embedder.embed(query).await?;
        let hits = self
            .corpus
            .match_chunks(&embedding, self.retrieval.match_threshold, limit)
            .await?;

        if hits.is_empty() {
            return Ok("No matching content found in paper texts.".to_string());
        }
        Ok(hits.iter().map(format_chunk_hit).collect::<Vec<_>>().join("\n\n"))
    }

    async fn count_papers(&self, filter: &CountFilter) -> Result<String> {
        let count = self.corpus.count_papers(filter).await?;
        Ok(format!("{}: {}", describe_filter(filter), count))
    }

    async fn list_topics(&self, limit: usize) -> Result<String> {
        let stats = self.corpus.entity_stats().await?;
        let top = &stats[..limit.min(stats.len())];
        Ok(format!("Top {} research topics:\n{}", top.len(), numbered_topics(top)))
    }

    async fn analyze_trends(&self, topic: &str) -> Result<String> {
        let trend = self.corpus.topic_trend(topic).await?;
        if trend.is_empty() {
            return Ok(format!("No trend data found for \"{}\"", topic));
        }
        Ok(format!("Research trend for \"{}\":\n\n{}", topic, format_trend(&trend)))
    }

    async fn find_gaps(&self) -> Result<String> {
        let gaps = self.corpus.research_gaps(GAP_MIN_PAPERS, GAP_MAX_PAPERS).await?;
        if gaps.is_empty() {
            return Ok("No research gaps found.".to_string());
        }

        let lines = gaps
            .iter()
            .take(GAPS_REPORTED)
            .enumerate()
            .map(|(i, g)| format!("{}. \"{}\" - only {} paper(s)", i + 1, g.entity, g.paper_count))
            .collect::<Vec<_>>()
            .join("\n");
        Ok(format!("Understudied topics:\n\n{}", lines))
    }

    async fn random_explore(&self, count: usize) -> Result<String> {
        let papers = self.corpus.random_papers(count).await?;
        if papers.is_empty() {
            return Ok("No papers available.".to_string());
        }
        let lines = papers.iter().map(format_random_paper).collect::<Vec<_>>().join("\n\n");
        Ok(format!("Random papers:\n\n{}", lines))
    }

    async fn find_connections(&self) -> Result<String> {
        let pairs = self.corpus.shared_topic_pairs(CONNECTION_SAMPLE_SIZE).await?;
        if pairs.is_empty() {
            return Ok("No hidden connections found. Try again for different results.".to_string());
        }

        let lines = pairs
            .iter()
            .take(CONNECTIONS_REPORTED)
            .enumerate()
            .map(|(i, c)| format_connection(i + 1, c))
            .collect::<Vec<_>>()
            .join("\n\n");
        Ok(format!("**Connections via shared topics:**\n\n{}", lines))
    }

    async fn database_stats(&self) -> Result<String> {
        let size = self.corpus.corpus_size().await?;
        let topics = self.corpus.entity_stats().await?;
        let years = self.corpus.year_range().await?;
        let decades = self.corpus.papers_by_decade().await?;

        let (min_year, max_year) = match years {
            Some(range) => (range.min.to_string(), range.max.to_string()),
            None => ("unknown".to_string(), "unknown".to_string()),
        };

        let decade_breakdown = if decades.is_empty() {
            "N/A".to_string()
        } else {
            decades
                .iter()
                .map(|d| format!("{}s: {}", d.decade, d.count))
                .collect::<Vec<_>>()
                .join(", ")
        };

        let top = &topics[..OVERVIEW_TOPICS.min(topics.len())];

        Ok(format!(
            "## DATABASE OVERVIEW\n\n\
             **Total Papers:** {} research papers\n\
             **Text Chunks:** {} searchable text segments\n\
             **Publication Years:** {} to {}\n\n\
             **Papers by Decade:** {}\n\n\
             **Top Research Topics:**\n{}",
            size.papers,
            size.chunks,
            min_year,
            max_year,
            decade_breakdown,
            numbered_topics(top),
        ))
    }
}

fn describe_filter(filter: &CountFilter) -> String {
    let mut desc = match (filter.year, filter.year_min, filter.year_max) {
        (Some(year), _, _) => format!("Papers from {}", year),
        (None, None, None) => "Total papers in database".to_string(),
        (None, min, max) => format!(
            "Papers from {} to {}",
            min.map_or_else(|| "?".to_string(), |y| y.to_string()),
            max.map_or_else(|| "present".to_string(), |y| y.to_string()),
        ),
    };
    if let Some(ref entity) = filter.entity {
        desc.push_str(&format!(" about \"{}\"", entity));
    }
    desc
}

fn numbered_topics(topics: &[EntityStat]) -> String {
    topics
        .iter()
        .enumerate()
        .map(|(i, t)| format!("{}. {} ({} papers)", i + 1, t.entity, t.paper_count))
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_trend(trend: &[YearCount]) -> String {
    trend
        .iter()
        .map(|d| format!("{}: {} papers", d.year, d.paper_count))
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_paper_hit(hit: &PaperMatch) -> String {
    let snippet = non_empty(&hit.summary)
        .or_else(|| non_empty(&hit.findings))
        .unwrap_or("No summary");
    format!(
        "• **\"{}\"** ({}) [📄 Open](paper:{})\n  {}",
        hit.title,
        year_label(hit.pub_year),
        hit.id,
        snippet
    )
}

fn format_chunk_hit(hit: &ChunkMatch) -> String {
    format!(
        "From **\"{}\"** ({}) [📄 Open](paper:{}):\n> \"{}...\"",
        hit.paper_title,
        year_label(hit.pub_year),
        hit.paper_id,
        truncate_chars(&hit.chunk_content, EXCERPT_CHARS)
    )
}

fn format_random_paper(paper: &Paper) -> String {
    let summary = non_empty(&paper.summary)
        .map(|s| truncate_chars(s, RANDOM_SUMMARY_CHARS))
        .unwrap_or("No summary");
    format!(
        "• **\"{}\"** ({}) [📄 Open](paper:{})\n  {}...",
        paper.title,
        year_label(paper.pub_year),
        paper.id,
        summary
    )
}

fn format_connection(rank: usize, c: &PaperConnection) -> String {
    format!(
        "{}. Topic: **{}**\n   • [📄 {}...](paper:{}) ({})\n   • [📄 {}...](paper:{}) ({})",
        rank,
        c.shared_entity,
        truncate_chars(&c.paper_a_title, CONNECTION_TITLE_CHARS),
        c.paper_a_id,
        year_label(c.paper_a_year),
        truncate_chars(&c.paper_b_title, CONNECTION_TITLE_CHARS),
        c.paper_b_id,
        year_label(c.paper_b_year),
    )
}
