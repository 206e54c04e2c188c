//! In-memory corpus
//!
//! Similarity search returns every paper or chunk with a similarity of 1.0
//! in insertion order, and "random" sampling takes the first `n` papers, so
//! results are deterministic. Insertion order also stands in for the time a
//! paper was added: the last paper inserted is the most recent.

use crate::db::corpus::*;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
struct StoredChunk {
    paper_id: PaperId,
    content: String,
}

/// Corpus held entirely in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryCorpus {
    papers: Vec<Paper>,
    chunks: Vec<StoredChunk>,
    failure: Option<String>,
}

impl InMemoryCorpus {
    pub fn new() -> Self {
        Self::default()
    }

    /// A corpus whose every operation fails with a database error
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn with_paper(mut self, paper: Paper) -> Self {
        self.papers.push(paper);
        self
    }

    pub fn with_chunk(mut self, paper_id: PaperId, content: impl Into<String>) -> Self {
        self.chunks.push(StoredChunk {
            paper_id,
            content: content.into(),
        });
        self
    }

    fn check(&self) -> Result<()> {
        match self.failure {
            Some(ref message) => Err(AppError::Database(sea_orm::DbErr::Custom(message.clone()))),
            None => Ok(()),
        }
    }

    fn paper(&self, id: PaperId) -> Option<&Paper> {
        self.papers.iter().find(|p| p.id == id)
    }

    fn has_topic(paper: &Paper, topic: &str) -> bool {
        paper.entities.iter().any(|e| e == topic)
    }

    fn in_year_bounds(paper: &Paper, year_min: Option<i32>, year_max: Option<i32>) -> bool {
        if year_min.is_none() && year_max.is_none() {
            return true;
        }
        match paper.pub_year {
            Some(year) => year_min.map_or(true, |min| year >= min) && year_max.map_or(true, |max| year <= max),
            None => false,
        }
    }
}

#[async_trait]
impl Corpus for InMemoryCorpus {
    async fn ping(&self) -> Result<()> {
        self.check()
    }

    async fn corpus_size(&self) -> Result<CorpusSize> {
        self.check()?;
        Ok(CorpusSize {
            papers: self.papers.len() as u64,
            chunks: self.chunks.len() as u64,
        })
    }

    async fn match_papers(&self, _embedding: &[f32], _threshold: f64, count: usize) -> Result<Vec<PaperMatch>> {
        self.check()?;
        Ok(self
            .papers
            .iter()
            .take(count)
            .map(|p| PaperMatch {
                id: p.id,
                title: p.title.clone(),
                pub_year: p.pub_year,
                summary: p.summary.clone(),
                findings: p.findings.clone(),
                similarity: 1.0,
            })
            .collect())
    }

    async fn match_chunks(&self, _embedding: &[f32], _threshold: f64, count: usize) -> Result<Vec<ChunkMatch>> {
        self.check()?;
        Ok(self
            .chunks
            .iter()
            .filter_map(|chunk| {
                let paper = self.paper(chunk.paper_id)?;
                Some(ChunkMatch {
                    paper_id: paper.id,
                    paper_title: paper.title.clone(),
                    pub_year: paper.pub_year,
                    chunk_content: chunk.content.clone(),
                    similarity: 1.0,
                })
            })
            .take(count)
            .collect())
    }

    async fn count_papers(&self, filter: &CountFilter) -> Result<u64> {
        self.check()?;
        let count = self
            .papers
            .iter()
            .filter(|p| filter.year.map_or(true, |year| p.pub_year == Some(year)))
            .filter(|p| Self::in_year_bounds(p, filter.year_min, filter.year_max))
            .filter(|p| filter.entity.as_deref().map_or(true, |e| Self::has_topic(p, e)))
            .count();
        Ok(count as u64)
    }

    async fn entity_stats(&self) -> Result<Vec<EntityStat>> {
        self.check()?;
        let mut counts: BTreeMap<&str, i64> = BTreeMap::new();
        for paper in &self.papers {
            for entity in &paper.entities {
                *counts.entry(entity.as_str()).or_default() += 1;
            }
        }

        let mut stats: Vec<EntityStat> = counts
            .into_iter()
            .map(|(entity, paper_count)| EntityStat {
                entity: entity.to_string(),
                paper_count,
            })
            .collect();
        stats.sort_by(|a, b| b.paper_count.cmp(&a.paper_count).then_with(|| a.entity.cmp(&b.entity)));
        Ok(stats)
    }

    async fn papers_by_decade(&self) -> Result<Vec<DecadeCount>> {
        self.check()?;
        let mut decades: BTreeMap<i32, i64> = BTreeMap::new();
        for year in self.papers.iter().filter_map(|p| p.pub_year) {
            *decades.entry(year.div_euclid(10) * 10).or_default() += 1;
        }
        Ok(decades
            .into_iter()
            .map(|(decade, count)| DecadeCount { decade, count })
            .collect())
    }

    async fn papers_per_year(&self) -> Result<Vec<YearCount>> {
        self.check()?;
        let mut years: BTreeMap<i32, i64> = BTreeMap::new();
        for year in self.papers.iter().filter_map(|p| p.pub_year) {
            *years.entry(year).or_default() += 1;
        }
        Ok(years
            .into_iter()
            .map(|(year, paper_count)| YearCount { year, paper_count })
            .collect())
    }

    async fn topic_trend(&self, topic: &str) -> Result<Vec<YearCount>> {
        self.check()?;
        let topic = topic.to_lowercase();
        let mut years: BTreeMap<i32, i64> = BTreeMap::new();
        for paper in &self.papers {
            let matches = paper.entities.iter().any(|e| e.to_lowercase() == topic);
            if let (true, Some(year)) = (matches, paper.pub_year) {
                *years.entry(year).or_default() += 1;
            }
        }
        Ok(years
            .into_iter()
            .map(|(year, paper_count)| YearCount { year, paper_count })
            .collect())
    }

    async fn research_gaps(&self, min_papers: i64, max_papers: i64) -> Result<Vec<EntityStat>> {
        let mut gaps: Vec<EntityStat> = self
            .entity_stats()
            .await?
            .into_iter()
            .filter(|s| s.paper_count >= min_papers && s.paper_count <= max_papers)
            .collect();
        gaps.sort_by(|a, b| a.paper_count.cmp(&b.paper_count).then_with(|| a.entity.cmp(&b.entity)));
        Ok(gaps)
    }

    async fn random_papers(&self, count: usize) -> Result<Vec<Paper>> {
        self.check()?;
        Ok(self.papers.iter().take(count).cloned().collect())
    }

    async fn shared_topic_pairs(&self, sample_size: usize) -> Result<Vec<PaperConnection>> {
        self.check()?;
        let sample: Vec<&Paper> = self.papers.iter().take(sample_size).collect();
        let mut pairs = Vec::new();

        for (i, a) in sample.iter().enumerate() {
            for b in sample.iter().skip(i + 1) {
                if let Some(shared) = a.entities.iter().find(|e| Self::has_topic(b, e)) {
                    pairs.push(PaperConnection {
                        shared_entity: shared.clone(),
                        paper_a_id: a.id,
                        paper_a_title: a.title.clone(),
                        paper_a_year: a.pub_year,
                        paper_b_id: b.id,
                        paper_b_title: b.title.clone(),
                        paper_b_year: b.pub_year,
                    });
                }
            }
        }
        Ok(pairs)
    }

    async fn year_range(&self) -> Result<Option<YearRange>> {
        self.check()?;
        let years = self.papers.iter().filter_map(|p| p.pub_year);
        let min = years.clone().min();
        let max = years.max();
        Ok(min.zip(max).map(|(min, max)| YearRange { min, max }))
    }

    async fn find_paper(&self, id: PaperId) -> Result<Option<Paper>> {
        self.check()?;
        Ok(self.paper(id).cloned())
    }

    async fn list_papers(&self, query: &PaperQuery) -> Result<PaperPage> {
        self.check()?;
        let needle = query.title_contains.as_ref().map(|t| t.to_lowercase());

        let mut matching: Vec<&Paper> = self
            .papers
            .iter()
            .filter(|p| needle.as_ref().map_or(true, |n| p.title.to_lowercase().contains(n)))
            .filter(|p| query.topic.as_deref().map_or(true, |t| Self::has_topic(p, t)))
            .filter(|p| Self::in_year_bounds(p, query.year_min, query.year_max))
            .collect();
        // Newest first, undated papers last
        matching.sort_by(|a, b| b.pub_year.cmp(&a.pub_year).then_with(|| a.id.cmp(&b.id)));

        let per_page = query.per_page.max(1) as usize;
        let papers = matching
            .iter()
            .skip(query.page as usize * per_page)
            .take(per_page)
            .map(|p| (*p).clone())
            .collect();

        Ok(PaperPage {
            papers,
            total: matching.len() as u64,
        })
    }

    async fn recent_papers(&self, limit: usize) -> Result<Vec<Paper>> {
        self.check()?;
        Ok(self.papers.iter().rev().take(limit).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paper(id: PaperId, title: &str, year: Option<i32>, entities: &[&str]) -> Paper {
        Paper {
            id,
            filename: None,
            title: title.to_string(),
            pub_year: year,
            summary: None,
            findings: None,
            hypothesis: None,
            entities: entities.iter().map(|e| e.to_string()).collect(),
        }
    }

    fn corpus() -> InMemoryCorpus {
        InMemoryCorpus::new()
            .with_paper(paper(1, "DNA repair in yeast", Some(1995), &["DNA", "yeast"]))
            .with_paper(paper(2, "Telomere length", Some(2005), &["DNA", "aging"]))
            .with_paper(paper(3, "Untitled draft", None, &["aging"]))
            .with_paper(paper(4, "Protein folding", Some(2018), &["protein"]))
            .with_chunk(2, "Telomeres shorten with age")
    }

    #[tokio::test]
    async fn test_count_filters() {
        let corpus = corpus();
        let by_year = CountFilter { year: Some(1995), ..Default::default() };
        assert_eq!(corpus.count_papers(&by_year).await.unwrap(), 1);

        let range = CountFilter { year_min: Some(2000), ..Default::default() };
        assert_eq!(corpus.count_papers(&range).await.unwrap(), 2);

        let topic = CountFilter { entity: Some("DNA".into()), year_max: Some(2000), ..Default::default() };
        assert_eq!(corpus.count_papers(&topic).await.unwrap(), 1);

        assert_eq!(corpus.count_papers(&CountFilter::default()).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_entity_stats_ordering() {
        let stats = corpus().entity_stats().await.unwrap();
        assert_eq!(stats[0].entity, "DNA");
        assert_eq!(stats[0].paper_count, 2);
        assert_eq!(stats[1].entity, "aging");
        assert_eq!(stats.len(), 4);
    }

    #[tokio::test]
    async fn test_gaps_and_trend() {
        let corpus = corpus();
        let gaps = corpus.research_gaps(1, 1).await.unwrap();
        let names: Vec<_> = gaps.iter().map(|g| g.entity.as_str()).collect();
        assert_eq!(names, vec!["protein", "yeast"]);

        let trend = corpus.topic_trend("dna").await.unwrap();
        assert_eq!(trend, vec![
            YearCount { year: 1995, paper_count: 1 },
            YearCount { year: 2005, paper_count: 1 },
        ]);
    }

    #[tokio::test]
    async fn test_chunks_join_paper() {
        let chunks = corpus().match_chunks(&[], 0.1, 5).await.unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].paper_title, "Telomere length");
        assert_eq!(chunks[0].pub_year, Some(2005));
    }

    #[tokio::test]
    async fn test_shared_topic_pairs() {
        let pairs = corpus().shared_topic_pairs(50).await.unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].shared_entity, "DNA");
        assert_eq!((pairs[0].paper_a_id, pairs[0].paper_b_id), (1, 2));
        assert_eq!(pairs[1].shared_entity, "aging");
    }

    #[tokio::test]
    async fn test_list_papers_pagination() {
        let corpus = corpus();
        let page = corpus
            .list_papers(&PaperQuery { per_page: 2, ..Default::default() })
            .await
            .unwrap();
        assert_eq!(page.total, 4);
        let ids: Vec<_> = page.papers.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![4, 2]);

        let search = corpus
            .list_papers(&PaperQuery { title_contains: Some("dna".into()), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(search.total, 1);
    }

    #[tokio::test]
    async fn test_year_range_and_decades() {
        let corpus = corpus();
        assert_eq!(corpus.year_range().await.unwrap(), Some(YearRange { min: 1995, max: 2018 }));
        let decades = corpus.papers_by_decade().await.unwrap();
        assert_eq!(decades.len(), 3);
        assert_eq!(decades[0], DecadeCount { decade: 1990, count: 1 });

        assert_eq!(InMemoryCorpus::new().year_range().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_papers_per_year_skips_undated() {
        let corpus = corpus().with_paper(paper(5, "Repair follow-up", Some(1995), &["DNA"]));
        let years = corpus.papers_per_year().await.unwrap();
        assert_eq!(years, vec![
            YearCount { year: 1995, paper_count: 2 },
            YearCount { year: 2005, paper_count: 1 },
            YearCount { year: 2018, paper_count: 1 },
        ]);
    }

    #[tokio::test]
    async fn test_recent_papers_newest_insert_first() {
        let recent = corpus().recent_papers(2).await.unwrap();
        let ids: Vec<_> = recent.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![4, 3]);
        assert!(InMemoryCorpus::new().recent_papers(4).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failing_corpus() {
        let corpus = InMemoryCorpus::failing("connection refused");
        let err = tokio_test::assert_err!(corpus.corpus_size().await);
        assert!(err.to_string().contains("connection refused"));
    }
}
