
use std::cmp::Ordering;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use super::{ScoredRecord, SearchHit, VectorRecord, cosine_similarity};
use crate::embeddings::chunking::Segment;
use crate::{RagError, Result};

pub const SNAPSHOT_FILE_NAME: &str = "index.json";
const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// In-memory vector index for one named collection.
///
/// Records are append-only. Search is an exact linear scan by cosine
/// similarity, so results never depend on an approximate structure.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    collection: String,
    location: PathBuf,
    dimension: Option<usize>,
    records: Vec<VectorRecord>,
    next_id: u64,
    created_at: DateTime<Utc>,
}

/// On-disk representation of a collection
#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    format_version: u32,
    collection: String,
    dimension: Option<usize>,
    next_id: u64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    records: Vec<StoredRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredRecord {
    id: u64,
    embedding: Vec<f32>,
    text: String,
    source_id: String,
    offset: usize,
}

impl VectorIndex {
    /// Create an empty index for `collection`, stored under `base_dir/collection`
    ///
    /// # Arguments
    /// * `base_dir` - Directory holding all collections
    /// * `collection` - Collection name (letters, digits, `-` and `_`)
    #[inline]
    pub fn new<P: AsRef<Path>>(base_dir: P, collection: &str) -> Result<Self> {
        validate_collection_name(collection)?;

        Ok(Self {
            collection: collection.to_string(),
            location: base_dir.as_ref().join(collection),
            dimension: None,
            records: Vec::new(),
            next_id: 0,
            created_at: Utc::now(),
        })
    }

    /// Fix the embedding dimensionality up front instead of taking it from the first insert
    #[inline]
    pub fn with_dimension(mut self, dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(RagError::InvalidArgument(
                "embedding dimension must be greater than 0".to_string(),
            ));
        }

        match self.dimension {
            Some(existing) if existing != dimension => Err(RagError::DimensionMismatch {
                expected: existing,
                actual: dimension,
            }),
            _ => {
                self.dimension = Some(dimension);
                Ok(self)
            }
        }
    }

    /// Load a collection snapshot, or return an empty index if none exists yet
    ///
    /// # Arguments
    /// * `base_dir` - Directory holding all collections
    /// * `collection` - Collection name
    ///
    /// # Returns
    /// * `Result<VectorIndex>` - The loaded index, or `RagError::Storage` if the
    ///   snapshot exists but cannot be read
    #[inline]
    pub fn load<P: AsRef<Path>>(base_dir: P, collection: &str) -> Result<Self> {
        let mut index = Self::new(base_dir, collection)?;
        let snapshot_path = index.snapshot_path();

        if !snapshot_path.exists() {
            debug!(
                "No snapshot for collection '{}' at {}, starting empty",
                collection,
                snapshot_path.display()
            );
            return Ok(index);
        }

        let content = fs::read_to_string(&snapshot_path).map_err(|e| {
            RagError::Storage(format!(
                "Failed to read snapshot {}: {}",
                snapshot_path.display(),
                e
            ))
        })?;

        let snapshot: Snapshot = serde_json::from_str(&content).map_err(|e| {
            RagError::Storage(format!(
                "Failed to parse snapshot {}: {}",
                snapshot_path.display(),
                e
            ))
        })?;

        index.restore(snapshot)?;

        info!(
            "Loaded collection '{}' with {} records ({:?} dimensions)",
            index.collection,
            index.records.len(),
            index.dimension
        );
        Ok(index)
    }

    fn restore(&mut self, snapshot: Snapshot) -> Result<()> {
        if snapshot.format_version != SNAPSHOT_FORMAT_VERSION {
            return Err(RagError::Storage(format!(
                "Unsupported snapshot format version {}",
                snapshot.format_version
            )));
        }

        if snapshot.collection != self.collection {
            return Err(RagError::Storage(format!(
                "Snapshot belongs to collection '{}', expected '{}'",
                snapshot.collection, self.collection
            )));
        }

        let mut previous_id = None;
        let mut records = Vec::with_capacity(snapshot.records.len());
        for stored in snapshot.records {
            if Some(stored.embedding.len()) != snapshot.dimension {
                return Err(RagError::Storage(format!(
                    "Record {} has {} dimensions, snapshot declares {:?}",
                    stored.id,
                    stored.embedding.len(),
                    snapshot.dimension
                )));
            }
            if previous_id.is_some_and(|previous| stored.id <= previous)
                || stored.id >= snapshot.next_id
            {
                return Err(RagError::Storage(format!(
                    "Record id {} is out of order in snapshot",
                    stored.id
                )));
            }
            previous_id = Some(stored.id);

            records.push(VectorRecord {
                id: stored.id,
                embedding: stored.embedding,
                segment: Segment {
                    text: stored.text,
                    source_id: stored.source_id,
                    offset: stored.offset,
                },
            });
        }

        self.dimension = snapshot.dimension;
        self.records = records;
        self.next_id = snapshot.next_id;
        self.created_at = snapshot.created_at;
        Ok(())
    }

    /// Append embedded segments, assigning each a fresh ascending id.
    ///
    /// Every embedding is checked before anything is appended, so a failed
    /// call leaves the index unchanged.
    #[inline]
    pub fn add(&mut self, records: Vec<(Vec<f32>, Segment)>) -> Result<()> {
        if records.is_empty() {
            debug!("No records to add");
            return Ok(());
        }

        let expected = self.dimension.unwrap_or(records[0].0.len());
        for (embedding, segment) in &records {
            if embedding.is_empty() {
                return Err(RagError::InvalidArgument(format!(
                    "empty embedding for segment at offset {} of '{}'",
                    segment.offset, segment.source_id
                )));
            }
            if embedding.len() != expected {
                return Err(RagError::DimensionMismatch {
                    expected,
                    actual: embedding.len(),
                });
            }
            if embedding.iter().any(|v| !v.is_finite()) {
                return Err(RagError::InvalidArgument(format!(
                    "non-finite embedding value for segment at offset {} of '{}'",
                    segment.offset, segment.source_id
                )));
            }
        }

        let added = records.len();
        self.dimension = Some(expected);
        self.records.reserve(added);
        for (embedding, segment) in records {
            self.records.push(VectorRecord {
                id: self.next_id,
                embedding,
                segment,
            });
            self.next_id += 1;
        }

        debug!(
            "Added {} records to collection '{}' ({} total)",
            added,
            self.collection,
            self.records.len()
        );
        Ok(())
    }

    /// Number of stored records
    #[inline]
    pub fn count(&self) -> usize {
        self.records.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[inline]
    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    #[inline]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Directory holding this collection's snapshot
    #[inline]
    pub fn location(&self) -> &Path {
        &self.location
    }

    #[inline]
    pub fn snapshot_path(&self) -> PathBuf {
        self.location.join(SNAPSHOT_FILE_NAME)
    }

    #[inline]
    pub fn records(&self) -> &[VectorRecord] {
        &self.records
    }

    /// The first `limit` records in insertion order
    #[inline]
    pub fn sample(&self, limit: usize) -> &[VectorRecord] {
        &self.records[..limit.min(self.records.len())]
    }

    /// Find the `k` records most similar to `query`, best first
    ///
    /// # Arguments
    /// * `query` - Query embedding with the index's dimensionality
    /// * `k` - Maximum number of results, must be at least 1
    ///
    /// # Returns
    /// * `Result<Vec<SearchHit>>` - Up to `k` hits; empty when the index is empty
    #[inline]
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        Ok(self
            .search_records(query, k)?
            .iter()
            .map(ScoredRecord::to_hit)
            .collect())
    }

    /// Like [`VectorIndex::search`], but borrows the matching records
    #[inline]
    pub fn search_records(&self, query: &[f32], k: usize) -> Result<Vec<ScoredRecord<'_>>> {
        if k == 0 {
            return Err(RagError::InvalidArgument(
                "k must be at least 1".to_string(),
            ));
        }

        let Some(dimension) = self.dimension else {
            return Ok(Vec::new());
        };
        if self.records.is_empty() {
            return Ok(Vec::new());
        }

        if query.len() != dimension {
            return Err(RagError::DimensionMismatch {
                expected: dimension,
                actual: query.len(),
            });
        }
        if query.iter().any(|v| !v.is_finite()) {
            return Err(RagError::InvalidArgument(
                "query embedding contains non-finite values".to_string(),
            ));
        }

        let mut scored: Vec<ScoredRecord<'_>> = self
            .records
            .iter()
            .map(|record| ScoredRecord {
                record,
                score: cosine_similarity(query, &record.embedding),
            })
            .collect();

        if k < scored.len() {
            scored.select_nth_unstable_by(k - 1, rank_order);
            scored.truncate(k);
        }
        scored.sort_by(rank_order);

        debug!(
            "Search in '{}' returned {} of {} records",
            self.collection,
            scored.len(),
            self.records.len()
        );
        Ok(scored)
    }

    /// Write the full collection to disk.
    ///
    /// The snapshot is written to a temporary file next to the target and
    /// renamed over it, so the previous snapshot survives a failed write.
    #[inline]
    pub fn persist(&self) -> Result<()> {
        fs::create_dir_all(&self.location).map_err(|e| {
            RagError::Storage(format!(
                "Failed to create collection directory {}: {}",
                self.location.display(),
                e
            ))
        })?;

        let snapshot = Snapshot {
            format_version: SNAPSHOT_FORMAT_VERSION,
            collection: self.collection.clone(),
            dimension: self.dimension,
            next_id: self.next_id,
            created_at: self.created_at,
            updated_at: Utc::now(),
            records: self
                .records
                .iter()
                .map(|record| StoredRecord {
                    id: record.id,
                    embedding: record.embedding.clone(),
                    text: record.segment.text.clone(),
                    source_id: record.segment.source_id.clone(),
                    offset: record.segment.offset,
                })
                .collect(),
        };

        let snapshot_path = self.snapshot_path();
        let temp_file = NamedTempFile::new_in(&self.location)
            .map_err(|e| RagError::Storage(format!("Failed to create temporary snapshot: {}", e)))?;

        {
            let mut writer = BufWriter::new(temp_file.as_file());
            serde_json::to_writer(&mut writer, &snapshot)
                .map_err(|e| RagError::Storage(format!("Failed to serialize snapshot: {}", e)))?;
            writer
                .flush()
                .map_err(|e| RagError::Storage(format!("Failed to write snapshot: {}", e)))?;
        }
        temp_file
            .as_file()
            .sync_all()
            .map_err(|e| RagError::Storage(format!("Failed to sync snapshot: {}", e)))?;

        temp_file.persist(&snapshot_path).map_err(|e| {
            RagError::Storage(format!(
                "Failed to replace snapshot {}: {}",
                snapshot_path.display(),
                e.error
            ))
        })?;

        info!(
            "Persisted collection '{}' ({} records) to {}",
            self.collection,
            self.records.len(),
            snapshot_path.display()
        );
        Ok(())
    }
}

/// Higher score first, then lower id
fn rank_order(a: &ScoredRecord<'_>, b: &ScoredRecord<'_>) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.record.id.cmp(&b.record.id))
}

fn validate_collection_name(name: &str) -> Result<()> {
    if name.is_empty()
        || !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(RagError::Configuration(format!(
            "Invalid collection name '{}' (use letters, digits, '-' and '_')",
            name
        )));
    }
    Ok(())
}

/// Names of the collections with a snapshot under `base_dir`, sorted
#[inline]
pub fn list_collections<P: AsRef<Path>>(base_dir: P) -> Result<Vec<String>> {
    let base_dir = base_dir.as_ref();
    if !base_dir.exists() {
        return Ok(Vec::new());
    }

    let entries = fs::read_dir(base_dir).map_err(|e| {
        RagError::Storage(format!("Failed to list {}: {}", base_dir.display(), e))
    })?;

    let mut names = Vec::new();
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry in {}: {}", base_dir.display(), e);
                continue;
            }
        };
        if entry.path().join(SNAPSHOT_FILE_NAME).is_file() {
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
    }

    names.sort();
    Ok(names)
}
