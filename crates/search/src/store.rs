//! In-memory product catalog ranked by cosine similarity.

use std::path::Path;

use quill_common::{QuillError, Result};
use tracing::{info, warn};

use crate::types::{ProductRecord, SearchHit};

/// Read-only catalog shared by every session.
#[derive(Debug, Clone, Default)]
pub struct ProductIndex {
    records: Vec<ProductRecord>,
    dimension: usize,
}

impl ProductIndex {
    /// Build an index, rejecting records whose embedding size differs from
    /// the first record's.
    pub fn from_records(records: Vec<ProductRecord>) -> Result<Self> {
        let dimension = records.first().map(|r| r.embedding.len()).unwrap_or(0);
        if let Some(bad) = records.iter().find(|r| r.embedding.len() != dimension) {
            return Err(QuillError::Config(format!(
                "product '{}' has a {}-dim embedding, expected {dimension}",
                bad.key,
                bad.embedding.len()
            )));
        }
        Ok(Self { records, dimension })
    }

    /// Load a JSON array of product records.
    pub async fn load(path: &Path) -> Result<Self> {
        let text = tokio::fs::read_to_string(path).await?;
        let records: Vec<ProductRecord> = serde_json::from_str(&text)?;
        let index = Self::from_records(records)?;
        info!(
            path = %path.display(),
            products = index.len(),
            dimension = index.dimension,
            "Loaded product catalog"
        );
        Ok(index)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// The `top_k` products most similar to `query`, best first.
    ///
    /// Ties keep catalog order.
    pub fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<SearchHit>> {
        if self.records.is_empty() {
            warn!("Product search against an empty catalog");
            return Ok(Vec::new());
        }
        if query.len() != self.dimension {
            return Err(QuillError::Tool(format!(
                "query embedding has {} dimensions, catalog has {}",
                query.len(),
                self.dimension
            )));
        }

        let mut scored: Vec<(f32, &ProductRecord)> = self
            .records
            .iter()
            .map(|record| (cosine_similarity(query, &record.embedding), record))
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));

        Ok(scored
            .into_iter()
            .take(top_k)
            .map(|(score, record)| SearchHit {
                name: record.name.clone(),
                content: record.content.clone(),
                score,
            })
            .collect())
    }
}

/// Cosine similarity of two equal-length vectors. Zero vectors score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let (mut dot, mut norm_a, mut norm_b) = (0.0f32, 0.0f32, 0.0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(key: &str, embedding: Vec<f32>) -> ProductRecord {
        ProductRecord {
            key: key.into(),
            name: key.to_uppercase(),
            content: format!("{key} description"),
            embedding,
        }
    }

    #[test]
    fn cosine_basics() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn ranks_best_first_and_truncates() {
        let index = ProductIndex::from_records(vec![
            record("tea", vec![0.0, 1.0]),
            record("beans", vec![1.0, 0.1]),
            record("grinder", vec![0.7, 0.7]),
        ])
        .unwrap();

        let hits = index.search(&[1.0, 0.0], 2).unwrap();
        let names: Vec<&str> = hits.iter().map(|h| h.name.as_str()).collect();
        assert_eq!(names, vec!["BEANS", "GRINDER"]);
        assert!(hits[0].score > hits[1].score);
    }

    #[test]
    fn mismatched_dimensions_rejected() {
        let err = ProductIndex::from_records(vec![
            record("a", vec![1.0, 0.0]),
            record("b", vec![1.0]),
        ])
        .unwrap_err();
        assert!(matches!(err, QuillError::Config(_)));

        let index = ProductIndex::from_records(vec![record("a", vec![1.0, 0.0])]).unwrap();
        assert!(matches!(index.search(&[1.0], 1), Err(QuillError::Tool(_))));
    }

    #[test]
    fn empty_catalog_returns_nothing() {
        let index = ProductIndex::default();
        assert!(index.search(&[1.0, 0.0], 3).unwrap().is_empty());
    }

    #[tokio::test]
    async fn loads_catalog_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        std::fs::write(
            &path,
            r#"[{"key":"1","name":"Guji","content":"Ethiopian single origin","embedding":[0.5,0.5]}]"#,
        )
        .unwrap();

        let index = ProductIndex::load(&path).await.unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(index.dimension(), 2);
    }

    #[tokio::test]
    async fn missing_catalog_is_io_error() {
        let err = ProductIndex::load(Path::new("/nonexistent/catalog.json"))
            .await
            .unwrap_err();
        assert!(matches!(err, QuillError::Io(_)));
    }
}
