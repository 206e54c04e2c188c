//! Paper browsing handlers

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::AppState;
use vejovis_common::{
    db::{Paper, PaperId, PaperQuery},
    errors::{AppError, Result},
};

const DEFAULT_PER_PAGE: u64 = 20;
const DEFAULT_RECENT: usize = 4;

/// Query string for the paper list
#[derive(Debug, Default, Deserialize, Validate)]
pub struct ListPapersParams {
    /// Case-insensitive title search
    #[validate(length(max = 500))]
    pub q: Option<String>,

    /// Required topic label
    #[validate(length(max = 200))]
    pub topic: Option<String>,

    /// Decade start, e.g. 1990 for 1990-1999
    #[validate(range(min = 0, max = 9990))]
    pub decade: Option<i32>,

    pub year_min: Option<i32>,
    pub year_max: Option<i32>,

    /// One-based page number
    #[validate(range(min = 1))]
    pub page: Option<u64>,

    #[validate(range(min = 1, max = 100))]
    pub per_page: Option<u64>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct RecentPapersParams {
    #[validate(range(min = 1, max = 50))]
    pub limit: Option<usize>,
}

#[derive(Serialize)]
pub struct PaperListResponse {
    pub papers: Vec<Paper>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

/// Paper detail, the target of a citation click
#[derive(Serialize)]
pub struct PaperDetailResponse {
    #[serde(flatten)]
    pub paper: Paper,
    pub pdf_url: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Tighter of two optional bounds
fn narrow(a: Option<i32>, b: Option<i32>, pick: fn(i32, i32) -> i32) -> Option<i32> {
    match (a, b) {
        (Some(a), Some(b)) => Some(pick(a, b)),
        (a, b) => a.or(b),
    }
}

impl ListPapersParams {
    fn into_query(self) -> PaperQuery {
        let decade_start = self.decade;
        let decade_end = self.decade.map(|d| d + 9);
        let per_page = self.per_page.unwrap_or(DEFAULT_PER_PAGE);

        PaperQuery {
            title_contains: non_blank(self.q),
            topic: non_blank(self.topic),
            year_min: narrow(self.year_min, decade_start, i32::max),
            year_max: narrow(self.year_max, decade_end, i32::min),
            page: self.page.unwrap_or(1) - 1,
            per_page,
        }
    }
}

/// List papers, newest first
pub async fn list_papers(
    State(state): State<AppState>,
    Query(params): Query<ListPapersParams>,
) -> Result<Json<PaperListResponse>> {
    params.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: None,
    })?;

    let query = params.into_query();
    let page = state.corpus.list_papers(&query).await?;

    Ok(Json(PaperListResponse {
        papers: page.papers,
        total: page.total,
        page: query.page + 1,
        per_page: query.per_page,
    }))
}

/// Papers most recently added to the corpus
pub async fn recent_papers(
    State(state): State<AppState>,
    Query(params): Query<RecentPapersParams>,
) -> Result<Json<Vec<Paper>>> {
    params.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: Some("limit".to_string()),
    })?;

    let papers = state
        .corpus
        .recent_papers(params.limit.unwrap_or(DEFAULT_RECENT))
        .await?;
    Ok(Json(papers))
}

/// Get a paper by ID
pub async fn get_paper(
    State(state): State<AppState>,
    Path(paper_id): Path<PaperId>,
) -> Result<Json<PaperDetailResponse>> {
    let paper = state
        .corpus
        .find_paper(paper_id)
        .await?
        .ok_or_else(|| AppError::PaperNotFound {
            id: paper_id.to_string(),
        })?;

    let pdf_url = paper
        .filename
        .as_deref()
        .and_then(|filename| state.config.storage.pdf_url(filename));

    tracing::debug!(paper_id, has_pdf = pdf_url.is_some(), "Paper detail served");

    Ok(Json(PaperDetailResponse { paper, pdf_url }))
}
