//! Read-only view of the paper corpus
//!
//! Every tool and read endpoint goes through [`Corpus`]. The Postgres
//! [`Repository`](super::Repository) is the production implementation;
//! `InMemoryCorpus` (behind the `test-support` feature) backs tests.

use crate::errors::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Paper identifier as stored in the `papers` table
pub type PaperId = i64;

/// A research paper
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paper {
    pub id: PaperId,
    pub filename: Option<String>,
    pub title: String,
    pub pub_year: Option<i32>,
    pub summary: Option<String>,
    pub findings: Option<String>,
    pub hypothesis: Option<String>,
    /// Topic labels in stored order
    #[serde(default)]
    pub entities: Vec<String>,
}

/// Paper-level similarity hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperMatch {
    pub id: PaperId,
    pub title: String,
    pub pub_year: Option<i32>,
    pub summary: Option<String>,
    pub findings: Option<String>,
    pub similarity: f64,
}

/// Chunk-level similarity hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMatch {
    pub paper_id: PaperId,
    pub paper_title: String,
    pub pub_year: Option<i32>,
    pub chunk_content: String,
    pub similarity: f64,
}

/// A topic label and how many papers carry it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityStat {
    pub entity: String,
    pub paper_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecadeCount {
    pub decade: i32,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearCount {
    pub year: i32,
    pub paper_count: i64,
}

/// Two papers that share a topic label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperConnection {
    pub shared_entity: String,
    pub paper_a_id: PaperId,
    pub paper_a_title: String,
    pub paper_a_year: Option<i32>,
    pub paper_b_id: PaperId,
    pub paper_b_title: String,
    pub paper_b_year: Option<i32>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusSize {
    pub papers: u64,
    pub chunks: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearRange {
    pub min: i32,
    pub max: i32,
}

/// Filters for counting papers. All present filters are combined with AND.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountFilter {
    pub year: Option<i32>,
    pub year_min: Option<i32>,
    pub year_max: Option<i32>,
    pub entity: Option<String>,
}

/// Paginated paper listing query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaperQuery {
    /// Case-insensitive substring of the title
    pub title_contains: Option<String>,
    /// Required topic label
    pub topic: Option<String>,
    pub year_min: Option<i32>,
    pub year_max: Option<i32>,
    /// Zero-based page index
    pub page: u64,
    pub per_page: u64,
}

impl Default for PaperQuery {
    fn default() -> Self {
        Self {
            title_contains: None,
            topic: None,
            year_min: None,
            year_max: None,
            page: 0,
            per_page: 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperPage {
    pub papers: Vec<Paper>,
    pub total: u64,
}

/// Read-only access to papers, chunks and the corpus stored procedures
#[async_trait]
pub trait Corpus: Send + Sync {
    /// Check connectivity
    async fn ping(&self) -> Result<()>;

    /// Row counts of the paper and chunk tables
    async fn corpus_size(&self) -> Result<CorpusSize>;

    /// Similarity search over paper-level vectors
    async fn match_papers(&self, embedding: &[f32], threshold: f64, count: usize) -> Result<Vec<PaperMatch>>;

    /// Similarity search over chunk-level vectors
    async fn match_chunks(&self, embedding: &[f32], threshold: f64, count: usize) -> Result<Vec<ChunkMatch>>;

    async fn count_papers(&self, filter: &CountFilter) -> Result<u64>;

    /// Topic labels ranked by paper count, descending
    async fn entity_stats(&self) -> Result<Vec<EntityStat>>;

    async fn papers_by_decade(&self) -> Result<Vec<DecadeCount>>;

    /// Paper counts per publication year, oldest year first. Undated papers are skipped.
    async fn papers_per_year(&self) -> Result<Vec<YearCount>>;

    /// Year-by-year paper counts for one topic label
    async fn topic_trend(&self, topic: &str) -> Result<Vec<YearCount>>;

    /// Topics carrying between `min_papers` and `max_papers` papers (inclusive)
    async fn research_gaps(&self, min_papers: i64, max_papers: i64) -> Result<Vec<EntityStat>>;

    async fn random_papers(&self, count: usize) -> Result<Vec<Paper>>;

    /// Pairs of papers sharing a topic, drawn from a random subsample
    async fn shared_topic_pairs(&self, sample_size: usize) -> Result<Vec<PaperConnection>>;

    /// Earliest and latest publication year, if any paper has one
    async fn year_range(&self) -> Result<Option<YearRange>>;

    async fn find_paper(&self, id: PaperId) -> Result<Option<Paper>>;

    /// Papers ordered by publication year, newest first
    async fn list_papers(&self, query: &PaperQuery) -> Result<PaperPage>;

    /// The `limit` papers most recently added to the corpus
    async fn recent_papers(&self, limit: usize) -> Result<Vec<Paper>>;
}
