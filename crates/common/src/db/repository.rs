//! Postgres implementation of [`Corpus`]
//!
//! Plain reads go through the SeaORM entities; vector search and the
//! aggregate views call the stored procedures installed alongside the
//! corpus (`match_papers`, `get_entity_stats`, ...) with raw statements.

use crate::db::corpus::*;
use crate::db::models::*;
use crate::db::DbPool;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use sea_orm::{
    sea_query::Expr, ColumnTrait, DatabaseConnection, DbBackend, DbErr, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, QueryResult, Select, Statement,
};

/// Repository for corpus reads
#[derive(Clone)]
pub struct Repository {
    pool: DbPool,
}

impl Repository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Get the read connection
    fn read_conn(&self) -> &DatabaseConnection {
        self.pool.read()
    }

    async fn query<T>(
        &self,
        sql: &str,
        values: Vec<sea_orm::Value>,
        map: impl Fn(&QueryResult) -> std::result::Result<T, DbErr>,
    ) -> Result<Vec<T>> {
        use sea_orm::ConnectionTrait;

        let stmt = Statement::from_sql_and_values(DbBackend::Postgres, sql, values);
        let rows = self.read_conn().query_all(stmt).await?;

        rows.iter()
            .map(map)
            .collect::<std::result::Result<Vec<_>, DbErr>>()
            .map_err(Into::into)
    }
}

/// Convert `Vec<f32>` to pgvector text format "[1.0,2.0,...]"
fn vector_literal(embedding: &[f32]) -> String {
    format!(
        "[{}]",
        embedding.iter()
            .map(|f| f.to_string())
            .collect::<Vec<_>>()
            .join(",")
    )
}

/// Row counts are passed to the stored procedures as `int4`
fn sql_count(count: impl TryInto<i32>, name: &str) -> Result<sea_orm::Value> {
    count
        .try_into()
        .map(Into::into)
        .map_err(|_| AppError::InvalidFormat {
            message: format!("{} is out of range", name),
        })
}

fn with_year_bounds(
    mut select: Select<PaperEntity>,
    year_min: Option<i32>,
    year_max: Option<i32>,
) -> Select<PaperEntity> {
    if let Some(min) = year_min {
        select = select.filter(PaperColumn::PubYear.gte(min));
    }
    if let Some(max) = year_max {
        select = select.filter(PaperColumn::PubYear.lte(max));
    }
    select
}

fn with_topic(select: Select<PaperEntity>, topic: Option<&str>) -> Select<PaperEntity> {
    match topic {
        Some(topic) => select.filter(Expr::cust_with_values("? = ANY(entities)", [topic.to_string()])),
        None => select,
    }
}

#[async_trait]
impl Corpus for Repository {
    async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }

    async fn corpus_size(&self) -> Result<CorpusSize> {
        let papers = PaperEntity::find().count(self.read_conn()).await?;
        let chunks = PaperChunkEntity::find().count(self.read_conn()).await?;
        Ok(CorpusSize { papers, chunks })
    }

    async fn match_papers(&self, embedding: &[f32], threshold: f64, count: usize) -> Result<Vec<PaperMatch>> {
        self.query(
            r#"
            SELECT id, title, pub_year, summary, findings, similarity::float8 AS similarity
            FROM match_papers($1::vector, $2, $3)
            "#,
            vec![vector_literal(embedding).into(), threshold.into(), sql_count(count, "match_count")?],
            |row| {
                Ok(PaperMatch {
                    id: row.try_get("", "id")?,
                    title: row.try_get("", "title")?,
                    pub_year: row.try_get("", "pub_year")?,
                    summary: row.try_get("", "summary")?,
                    findings: row.try_get("", "findings")?,
                    similarity: row.try_get("", "similarity")?,
                })
            },
        )
        .await
    }

    async fn match_chunks(&self, embedding: &[f32], threshold: f64, count: usize) -> Result<Vec<ChunkMatch>> {
        self.query(
            r#"
            SELECT paper_id, paper_title, pub_year, chunk_content, similarity::float8 AS similarity
            FROM match_chunks($1::vector, $2, $3)
            "#,
            vec![vector_literal(embedding).into(), threshold.into(), sql_count(count, "match_count")?],
            |row| {
                Ok(ChunkMatch {
                    paper_id: row.try_get("", "paper_id")?,
                    paper_title: row.try_get("", "paper_title")?,
                    pub_year: row.try_get("", "pub_year")?,
                    chunk_content: row.try_get("", "chunk_content")?,
                    similarity: row.try_get("", "similarity")?,
                })
            },
        )
        .await
    }

    async fn count_papers(&self, filter: &CountFilter) -> Result<u64> {
        let mut select = PaperEntity::find();

        if let Some(year) = filter.year {
            select = select.filter(PaperColumn::PubYear.eq(year));
        }
        select = with_year_bounds(select, filter.year_min, filter.year_max);
        select = with_topic(select, filter.entity.as_deref());

        Ok(select.count(self.read_conn()).await?)
    }

    async fn entity_stats(&self) -> Result<Vec<EntityStat>> {
        self.query(
            "SELECT entity, paper_count::int8 AS paper_count FROM get_entity_stats()",
            vec![],
            |row| {
                Ok(EntityStat {
                    entity: row.try_get("", "entity")?,
                    paper_count: row.try_get("", "paper_count")?,
                })
            },
        )
        .await
    }

    async fn papers_by_decade(&self) -> Result<Vec<DecadeCount>> {
        self.query(
            "SELECT decade::int4 AS decade, count::int8 AS count FROM get_papers_by_decade()",
            vec![],
            |row| {
                Ok(DecadeCount {
                    decade: row.try_get("", "decade")?,
                    count: row.try_get("", "count")?,
                })
            },
        )
        .await
    }

    async fn papers_per_year(&self) -> Result<Vec<YearCount>> {
        self.query(
            r#"
            SELECT pub_year::int4 AS year, COUNT(*)::int8 AS paper_count
            FROM papers
            WHERE pub_year IS NOT NULL
            GROUP BY pub_year
            ORDER BY pub_year
            "#,
            vec![],
            |row| {
                Ok(YearCount {
                    year: row.try_get("", "year")?,
                    paper_count: row.try_get("", "paper_count")?,
                })
            },
        )
        .await
    }

    async fn topic_trend(&self, topic: &str) -> Result<Vec<YearCount>> {
        self.query(
            "SELECT year::int4 AS year, paper_count::int8 AS paper_count FROM analyze_topic_trend($1)",
            vec![topic.into()],
            |row| {
                Ok(YearCount {
                    year: row.try_get("", "year")?,
                    paper_count: row.try_get("", "paper_count")?,
                })
            },
        )
        .await
    }

    async fn research_gaps(&self, min_papers: i64, max_papers: i64) -> Result<Vec<EntityStat>> {
        self.query(
            "SELECT entity, paper_count::int8 AS paper_count FROM find_research_gaps($1, $2)",
            vec![sql_count(min_papers, "min_papers")?, sql_count(max_papers, "max_papers")?],
            |row| {
                Ok(EntityStat {
                    entity: row.try_get("", "entity")?,
                    paper_count: row.try_get("", "paper_count")?,
                })
            },
        )
        .await
    }

    async fn random_papers(&self, count: usize) -> Result<Vec<Paper>> {
        self.query(
            "SELECT id, title, pub_year, summary FROM random_exploration($1)",
            vec![sql_count(count, "count")?],
            |row| {
                Ok(Paper {
                    id: row.try_get("", "id")?,
                    filename: None,
                    title: row.try_get("", "title")?,
                    pub_year: row.try_get("", "pub_year")?,
                    summary: row.try_get("", "summary")?,
                    findings: None,
                    hypothesis: None,
                    entities: Vec::new(),
                })
            },
        )
        .await
    }

    async fn shared_topic_pairs(&self, sample_size: usize) -> Result<Vec<PaperConnection>> {
        self.query(
            r#"
            SELECT shared_entity,
                   paper_a_id, paper_a_title, paper_a_year,
                   paper_b_id, paper_b_title, paper_b_year
            FROM discover_hidden_connections($1)
            "#,
            vec![sql_count(sample_size, "sample_size")?],
            |row| {
                Ok(PaperConnection {
                    shared_entity: row.try_get("", "shared_entity")?,
                    paper_a_id: row.try_get("", "paper_a_id")?,
                    paper_a_title: row.try_get("", "paper_a_title")?,
                    paper_a_year: row.try_get("", "paper_a_year")?,
                    paper_b_id: row.try_get("", "paper_b_id")?,
                    paper_b_title: row.try_get("", "paper_b_title")?,
                    paper_b_year: row.try_get("", "paper_b_year")?,
                })
            },
        )
        .await
    }

    async fn year_range(&self) -> Result<Option<YearRange>> {
        let rows = self
            .query(
                r#"
                SELECT MIN(pub_year)::int4 AS min_year, MAX(pub_year)::int4 AS max_year
                FROM papers
                WHERE pub_year IS NOT NULL
                "#,
                vec![],
                |row| {
                    let min: Option<i32> = row.try_get("", "min_year")?;
                    let max: Option<i32> = row.try_get("", "max_year")?;
                    Ok(min.zip(max).map(|(min, max)| YearRange { min, max }))
                },
            )
            .await?;

        Ok(rows.into_iter().next().flatten())
    }

    async fn find_paper(&self, id: PaperId) -> Result<Option<Paper>> {
        Ok(PaperEntity::find_by_id(id)
            .one(self.read_conn())
            .await?
            .map(Paper::from))
    }

    async fn list_papers(&self, query: &PaperQuery) -> Result<PaperPage> {
        let mut select = PaperEntity::find();

        if let Some(ref title) = query.title_contains {
            let pattern = format!("%{}%", title.replace('%', "\\%").replace('_', "\\_"));
            select = select.filter(Expr::cust_with_values("title ILIKE ?", [pattern]));
        }
        select = with_topic(select, query.topic.as_deref());
        select = with_year_bounds(select, query.year_min, query.year_max);

        let paginator = select
            .order_by_desc(PaperColumn::PubYear)
            .order_by_asc(PaperColumn::Id)
            .paginate(self.read_conn(), query.per_page.max(1));

        let total = paginator.num_items().await?;
        let papers = paginator
            .fetch_page(query.page)
            .await?
            .into_iter()
            .map(Paper::from)
            .collect();

        Ok(PaperPage { papers, total })
    }

    async fn recent_papers(&self, limit: usize) -> Result<Vec<Paper>> {
        let limit = u64::try_from(limit)
            .map_err(|_| AppError::InvalidFormat {
                message: "limit is out of range".to_string(),
            })?;

        Ok(PaperEntity::find()
            .order_by_desc(Expr::cust("created_at"))
            .order_by_desc(PaperColumn::Id)
            .limit(limit)
            .all(self.read_conn())
            .await?
            .into_iter()
            .map(Paper::from)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_literal() {
        assert_eq!(vector_literal(&[1.0, 0.5, -2.0]), "[1,0.5,-2]");
        assert_eq!(vector_literal(&[]), "[]");
    }

    #[test]
    fn test_sql_count_rejects_overflow() {
        assert_eq!(sql_count(25usize, "count").unwrap(), sea_orm::Value::Int(Some(25)));
        assert!(matches!(
            sql_count(usize::MAX, "count"),
            Err(AppError::InvalidFormat { message }) if message.contains("count")
        ));
        assert!(sql_count(i64::from(i32::MAX) + 1, "max_papers").is_err());
        assert!(sql_count(i64::MIN, "min_papers").is_err());
    }
}
