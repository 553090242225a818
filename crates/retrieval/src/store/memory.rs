//! In-memory search backend.
//!
//! Serves tests and offline development with the same trait surface as the
//! Elasticsearch client. Lexical mode ranks by keyword-overlap count,
//! vector mode by cosine similarity against stored vectors.

use crate::store::SearchBackend;
use crate::types::{Document, RankedHit};
use docrag_core::{AppError, AppResult};
use std::collections::BTreeSet;

/// In-memory document store.
#[derive(Default)]
pub struct MemoryStore {
    entries: Vec<(Document, Vec<f32>)>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a document with its embedding vector.
    pub fn add(&mut self, doc: Document, vector: Vec<f32>) {
        self.entries.push((doc, vector));
    }

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm_a == 0.0 || norm_b == 0.0 {
            0.0
        } else {
            dot / (norm_a * norm_b)
        }
    }
}

#[async_trait::async_trait]
impl SearchBackend for MemoryStore {
    fn backend_name(&self) -> &str {
        "memory"
    }

    async fn lexical_search(
        &self,
        keywords: &BTreeSet<String>,
        top_k: usize,
    ) -> AppResult<Vec<RankedHit>> {
        if keywords.is_empty() {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(usize, &Document)> = self
            .entries
            .iter()
            .map(|(doc, _)| {
                let text = doc.text.to_lowercase();
                let matches = keywords.iter().filter(|k| text.contains(k.as_str())).count();
                (matches, doc)
            })
            .filter(|(matches, _)| *matches > 0)
            .collect();

        scored.sort_by(|a, b| b.0.cmp(&a.0));
        scored.truncate(top_k);

        Ok(scored
            .into_iter()
            .enumerate()
            .map(|(idx, (_, doc))| RankedHit {
                doc: doc.clone(),
                rank: idx + 1,
            })
            .collect())
    }

    async fn vector_search(&self, query_vector: &[f32], top_k: usize) -> AppResult<Vec<RankedHit>> {
        if let Some((_, vector)) = self.entries.first() {
            if vector.len() != query_vector.len() {
                return Err(AppError::Store(format!(
                    "Vector dimension mismatch: query {} vs stored {}",
                    query_vector.len(),
                    vector.len()
                )));
            }
        }

        let mut scored: Vec<(f32, &Document)> = self
            .entries
            .iter()
            .map(|(doc, vector)| (Self::cosine(query_vector, vector), doc))
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);

        Ok(scored
            .into_iter()
            .enumerate()
            .map(|(idx, (_, doc))| RankedHit {
                doc: doc.clone(),
                rank: idx + 1,
            })
            .collect())
    }

    async fn count(&self) -> AppResult<u64> {
        Ok(self.entries.len() as u64)
    }
}
