// Retriever module
// Selects context segments for a query embedding, either by plain similarity
// or by maximal marginal relevance

#[cfg(test)]
mod tests;

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::embeddings::chunking::Segment;
use crate::index::{ScoredRecord, SearchHit, VectorIndex, cosine_similarity};
use crate::{RagError, Result};

/// Selection policy for a single retrieval
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RetrievalMode {
    /// Top-k by similarity
    Plain,
    /// Maximal marginal relevance over a pool of `fetch_k` candidates.
    /// `lambda` weighs redundancy with already selected segments.
    Diverse { fetch_k: usize, lambda: f32 },
}

/// Retrieval mode as named in configuration and on the command line
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    #[default]
    Plain,
    Diverse,
}

impl fmt::Display for SearchMode {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Plain => "plain",
            Self::Diverse => "diverse",
        })
    }
}

/// Configuration for retrieval
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Segments handed to the prompt per question
    pub k: usize,
    pub mode: SearchMode,
    /// Candidate pool size for diverse retrieval
    pub fetch_k: usize,
    /// Diversity weight for diverse retrieval, in [0, 1]
    pub lambda: f32,
}

impl Default for RetrievalConfig {
    #[inline]
    fn default() -> Self {
        Self {
            k: 3,
            mode: SearchMode::Plain,
            fetch_k: 20,
            lambda: 0.5,
        }
    }
}

impl RetrievalConfig {
    #[inline]
    pub const fn retrieval_mode(&self) -> RetrievalMode {
        match self.mode {
            SearchMode::Plain => RetrievalMode::Plain,
            SearchMode::Diverse => RetrievalMode::Diverse {
                fetch_k: self.fetch_k,
                lambda: self.lambda,
            },
        }
    }
}

/// Read-only view over an index that applies a selection policy
#[derive(Debug, Clone, Copy)]
pub struct Retriever<'a> {
    index: &'a VectorIndex,
}

impl<'a> Retriever<'a> {
    #[inline]
    pub const fn new(index: &'a VectorIndex) -> Self {
        Self { index }
    }

    /// Retrieve up to `k` segments for `query`, best first
    #[inline]
    pub fn retrieve(&self, query: &[f32], k: usize, mode: RetrievalMode) -> Result<Vec<Segment>> {
        Ok(self
            .retrieve_scored(query, k, mode)?
            .into_iter()
            .map(|hit| hit.segment)
            .collect())
    }

    /// Like [`Retriever::retrieve`], keeping each segment's similarity to the query
    #[inline]
    pub fn retrieve_scored(
        &self,
        query: &[f32],
        k: usize,
        mode: RetrievalMode,
    ) -> Result<Vec<SearchHit>> {
        match mode {
            RetrievalMode::Plain => self.index.search(query, k),
            RetrievalMode::Diverse { fetch_k, lambda } => {
                if !lambda.is_finite() {
                    return Err(RagError::InvalidArgument(format!(
                        "lambda must be finite, got {}",
                        lambda
                    )));
                }
                if k == 0 {
                    return Err(RagError::InvalidArgument(
                        "k must be at least 1".to_string(),
                    ));
                }

                let pool = self.index.search_records(query, fetch_k.max(k))?;
                let pool_size = pool.len();
                let selected = select_diverse(pool, k, lambda);

                debug!(
                    "Diverse retrieval selected {} of {} candidates (lambda = {})",
                    selected.len(),
                    pool_size,
                    lambda
                );
                Ok(selected.iter().map(ScoredRecord::to_hit).collect())
            }
        }
    }
}

/// Greedy maximal marginal relevance selection.
///
/// `pool` must be ordered by relevance. Each step picks the candidate with
/// the highest `relevance - lambda * max_similarity_to_selected`; the first
/// candidate in pool order wins ties.
fn select_diverse(pool: Vec<ScoredRecord<'_>>, k: usize, lambda: f32) -> Vec<ScoredRecord<'_>> {
    let mut remaining: Vec<(ScoredRecord<'_>, Option<f32>)> =
        pool.into_iter().map(|candidate| (candidate, None)).collect();
    let mut selected = Vec::with_capacity(k.min(remaining.len()));

    while selected.len() < k && !remaining.is_empty() {
        let mut best_idx = 0;
        let mut best_score = f32::NEG_INFINITY;
        for (idx, (candidate, redundancy)) in remaining.iter().enumerate() {
            let score = (-lambda).mul_add(redundancy.unwrap_or(0.0), candidate.score);
            if score > best_score {
                best_score = score;
                best_idx = idx;
            }
        }

        let (chosen, _) = remaining.remove(best_idx);
        for (candidate, redundancy) in &mut remaining {
            let similarity =
                cosine_similarity(&candidate.record.embedding, &chosen.record.embedding);
            *redundancy = Some(redundancy.map_or(similarity, |max| max.max(similarity)));
        }
        selected.push(chosen);
    }

    selected
}
