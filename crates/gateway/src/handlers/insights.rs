//! Topic, statistics and direct tool handlers

use axum::{
    extract::{Path, Query, State},
    Json,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use validator::Validate;

use crate::AppState;
use vejovis_common::{
    db::{DecadeCount, EntityStat, Paper, PaperQuery, YearCount, YearRange},
    errors::{AppError, Result},
};

const DEFAULT_TOPIC_LIMIT: usize = 20;
const DEFAULT_TOPIC_PAPERS: u64 = 10;
const STATS_TOP_TOPICS: usize = 10;

#[derive(Debug, Deserialize, Validate)]
pub struct TopicsParams {
    #[validate(range(min = 1, max = 1000))]
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct TopicPapersParams {
    #[validate(range(min = 1, max = 100))]
    pub limit: Option<u64>,
}

#[derive(Serialize)]
pub struct TopicPapersResponse {
    pub topic: String,
    pub papers: Vec<Paper>,
    pub total: u64,
}

#[derive(Serialize)]
pub struct StatsResponse {
    pub papers: u64,
    pub chunks: u64,
    pub year_range: Option<YearRange>,
    pub decades: Vec<DecadeCount>,
    /// Per-year publication counts, oldest first
    pub by_year: Vec<YearCount>,
    pub top_topics: Vec<EntityStat>,
}

#[derive(Serialize)]
pub struct ToolResponse {
    pub tool: String,
    pub output: String,
}

fn invalid(e: validator::ValidationErrors) -> AppError {
    AppError::Validation {
        message: e.to_string(),
        field: Some("limit".to_string()),
    }
}

/// Topic labels ranked by paper count
pub async fn list_topics(
    State(state): State<AppState>,
    Query(params): Query<TopicsParams>,
) -> Result<Json<Vec<EntityStat>>> {
    params.validate().map_err(invalid)?;

    let mut stats = state.corpus.entity_stats().await?;
    stats.truncate(params.limit.unwrap_or(DEFAULT_TOPIC_LIMIT));
    Ok(Json(stats))
}

/// Papers carrying one topic label
pub async fn topic_papers(
    State(state): State<AppState>,
    Path(topic): Path<String>,
    Query(params): Query<TopicPapersParams>,
) -> Result<Json<TopicPapersResponse>> {
    params.validate().map_err(invalid)?;

    let query = PaperQuery {
        topic: Some(topic.clone()),
        per_page: params.limit.unwrap_or(DEFAULT_TOPIC_PAPERS),
        ..PaperQuery::default()
    };
    let page = state.corpus.list_papers(&query).await?;

    Ok(Json(TopicPapersResponse {
        topic,
        papers: page.papers,
        total: page.total,
    }))
}

/// Corpus overview
pub async fn stats(State(state): State<AppState>) -> Result<Json<StatsResponse>> {
    let size = state.corpus.corpus_size().await?;
    let year_range = state.corpus.year_range().await?;
    let decades = state.corpus.papers_by_decade().await?;
    let by_year = state.corpus.papers_per_year().await?;
    let mut top_topics = state.corpus.entity_stats().await?;
    top_topics.truncate(STATS_TOP_TOPICS);

    Ok(Json(StatsResponse {
        papers: size.papers,
        chunks: size.chunks,
        year_range,
        decades,
        by_year,
        top_topics,
    }))
}

/// Run one tool by name with a JSON argument bag. An empty body means no
/// arguments; unknown tool names are answered with the list of valid ones.
pub async fn invoke_tool(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Bytes,
) -> Result<Json<ToolResponse>> {
    let args: Value = if body.is_empty() {
        Value::Object(Default::default())
    } else {
        serde_json::from_slice(&body).map_err(|e| AppError::InvalidFormat {
            message: format!("tool arguments must be a JSON object: {}", e),
        })?
    };

    let executor = state.executor()?;
    let output = executor.execute_named(&name, &args, "").await;

    Ok(Json(ToolResponse { tool: name, output }))
}
