// Vector index module
// Holds embedded segments in memory and persists them as per-collection snapshots

#[cfg(test)]
mod tests;

pub mod vector_store;

use serde::{Deserialize, Serialize};

use crate::embeddings::chunking::Segment;

pub use vector_store::{SNAPSHOT_FILE_NAME, VectorIndex, list_collections};

/// Embedded segment stored in the index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    /// Unique identifier, ascending in insertion order
    pub id: u64,
    /// The vector embedding; every record in a collection has the same length
    pub embedding: Vec<f32>,
    /// The segment this embedding represents
    pub segment: Segment,
}

/// Result of a similarity search
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub id: u64,
    pub segment: Segment,
    /// Cosine similarity to the query, in [-1, 1]
    pub score: f32,
}

/// Borrowed search result that still exposes the stored embedding
#[derive(Debug, Clone, Copy)]
pub struct ScoredRecord<'a> {
    pub record: &'a VectorRecord,
    pub score: f32,
}

impl ScoredRecord<'_> {
    #[inline]
    pub fn to_hit(&self) -> SearchHit {
        SearchHit {
            id: self.record.id,
            segment: self.record.segment.clone(),
            score: self.score,
        }
    }
}

/// Cosine similarity between two vectors of equal length.
///
/// Returns 0.0 when either vector has zero magnitude.
#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "Vector dimensions must match");

    let mut dot = 0.0_f32;
    let mut norm_a = 0.0_f32;
    let mut norm_b = 0.0_f32;
    for (x, y) in a.iter().zip(b) {
        dot = x.mul_add(*y, dot);
        norm_a = x.mul_add(*x, norm_a);
        norm_b = y.mul_add(*y, norm_b);
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0)
}
