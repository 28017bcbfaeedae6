// Indexer module
// Ingestion pipeline: scan sources, chunk, embed, index and persist a collection


use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info, warn};

use crate::embeddings::Embedder;
use crate::embeddings::chunking::{ChunkingConfig, Segment};
use crate::extraction::{Document, Extractor, collect_files};
use crate::index::VectorIndex;
use crate::{Collaborator, RagError, Result, call_with_timeout};

const DEFAULT_BATCH_SIZE: usize = 16;
const DEFAULT_EXTRACTION_CONCURRENCY: usize = 4;

/// Stages a collection passes through during ingestion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestionStage {
    Scanning,
    Chunking,
    Embedding,
    Indexing,
    Persisted,
}

impl fmt::Display for IngestionStage {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Scanning => "scanning",
            Self::Chunking => "chunking",
            Self::Embedding => "embedding",
            Self::Indexing => "indexing",
            Self::Persisted => "persisted",
        })
    }
}

/// Statistics about an ingestion run
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IngestionReport {
    /// Files found under the sources, supported or not
    pub documents_found: usize,
    /// Documents that contributed at least one record
    pub documents_indexed: usize,
    /// Documents skipped as unsupported, empty or failed
    pub documents_skipped: usize,
    pub segments_created: usize,
    pub records_added: usize,
    /// The collection was already populated and left untouched
    pub reused_existing: bool,
    pub duration: Duration,
}

/// Builds a collection from source files
pub struct Indexer {
    extractor: Arc<dyn Extractor>,
    embedder: Arc<dyn Embedder>,
    chunking: ChunkingConfig,
    batch_size: usize,
    concurrency: usize,
    timeout: Option<Duration>,
}

struct ChunkedDocument {
    source_id: String,
    segments: Vec<Segment>,
}

impl Indexer {
    #[inline]
    pub fn new(
        extractor: Arc<dyn Extractor>,
        embedder: Arc<dyn Embedder>,
        chunking: ChunkingConfig,
    ) -> Result<Self> {
        chunking.validate()?;
        Ok(Self {
            extractor,
            embedder,
            chunking,
            batch_size: DEFAULT_BATCH_SIZE,
            concurrency: DEFAULT_EXTRACTION_CONCURRENCY,
            timeout: None,
        })
    }

    /// Number of segments sent to the embedder per request
    #[inline]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Number of documents extracted at the same time
    #[inline]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Bound every extraction and embedding call by `timeout`
    #[inline]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Ingest `sources` into `index` and persist it.
    ///
    /// A collection that already holds records is reused as is. Failures of a
    /// single document are logged and the document skipped; a dimension
    /// mismatch or a storage failure aborts the run before the snapshot is
    /// replaced.
    #[inline]
    pub async fn ingest(
        &self,
        index: &mut VectorIndex,
        sources: &[PathBuf],
    ) -> Result<IngestionReport> {
        let started = Instant::now();
        let mut report = IngestionReport::default();

        if !index.is_empty() {
            info!(
                "Collection '{}' already holds {} records, reusing it",
                index.collection(),
                index.count()
            );
            enter_stage(IngestionStage::Persisted);
            report.reused_existing = true;
            report.duration = started.elapsed();
            return Ok(report);
        }

        enter_stage(IngestionStage::Scanning);
        let files = collect_files(sources)?;
        report.documents_found = files.len();

        let (supported, unsupported): (Vec<PathBuf>, Vec<PathBuf>) = files
            .into_iter()
            .partition(|path| self.extractor.supports(path));
        for path in &unsupported {
            warn!("Skipping unsupported file: {}", path.display());
        }
        report.documents_skipped += unsupported.len();
        info!(
            "Found {} documents ({} unsupported)",
            report.documents_found,
            unsupported.len()
        );

        let documents = self.extract_all(supported, &mut report).await;

        enter_stage(IngestionStage::Chunking);
        let mut chunked = Vec::with_capacity(documents.len());
        for document in documents {
            let segments = self.chunking.split(&document.text, &document.source_id)?;
            if segments.is_empty() {
                warn!("Skipping {}: no text to index", document.source_id);
                report.documents_skipped += 1;
                continue;
            }
            debug!(
                "Split {} into {} segments",
                document.source_id,
                segments.len()
            );
            report.segments_created += segments.len();
            chunked.push(ChunkedDocument {
                source_id: document.source_id,
                segments,
            });
        }

        enter_stage(IngestionStage::Embedding);
        let bar = progress_bar(chunked.len());
        let mut records = Vec::with_capacity(report.segments_created);
        for document in chunked {
            bar.set_message(document.source_id.clone());
            match self.embed_document(&document.segments).await {
                Ok(embeddings) => {
                    records.extend(embeddings.into_iter().zip(document.segments));
                    report.documents_indexed += 1;
                }
                Err(e) => {
                    warn!("Skipping {}: {}", document.source_id, e);
                    report.documents_skipped += 1;
                }
            }
            bar.inc(1);
        }
        bar.finish_and_clear();

        enter_stage(IngestionStage::Indexing);
        report.records_added = records.len();
        index.add(records)?;

        index.persist()?;
        enter_stage(IngestionStage::Persisted);

        report.duration = started.elapsed();
        info!(
            "Ingested {} of {} documents into '{}': {} records in {:.2?}",
            report.documents_indexed,
            report.documents_found,
            index.collection(),
            report.records_added,
            report.duration
        );
        Ok(report)
    }

    async fn extract_all(
        &self,
        paths: Vec<PathBuf>,
        report: &mut IngestionReport,
    ) -> Vec<Document> {
        let results: Vec<(PathBuf, Result<Document>)> = stream::iter(paths)
            .map(|path| async move {
                let result = call_with_timeout(
                    Collaborator::Extraction,
                    self.timeout,
                    self.extractor.extract(&path),
                )
                .await;
                (path, result)
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut documents = Vec::with_capacity(results.len());
        for (path, result) in results {
            match result {
                Ok(document) => documents.push(document),
                Err(e) => {
                    warn!("Skipping {}: {}", path.display(), e);
                    report.documents_skipped += 1;
                }
            }
        }
        documents
    }

    async fn embed_document(&self, segments: &[Segment]) -> Result<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(segments.len());
        for batch in segments.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|s| s.text.clone()).collect();
            let batch_embeddings = call_with_timeout(
                Collaborator::Embedding,
                self.timeout,
                self.embedder.embed_batch(&texts),
            )
            .await?;

            if batch_embeddings.len() != texts.len() {
                return Err(RagError::collaborator(
                    Collaborator::Embedding,
                    format!(
                        "expected {} embeddings, received {}",
                        texts.len(),
                        batch_embeddings.len()
                    ),
                ));
            }
            embeddings.extend(batch_embeddings);
        }
        Ok(embeddings)
    }
}

fn enter_stage(stage: IngestionStage) {
    info!("Ingestion stage: {}", stage);
}

fn progress_bar(len: usize) -> ProgressBar {
    if console::user_attended_stderr() {
        let style = ProgressStyle::with_template("{spinner} [{pos}/{len}] Embedding {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        let bar = ProgressBar::new_spinner().with_style(style);
        bar.set_length(len as u64);
        bar
    } else {
        ProgressBar::hidden()
    }
}
