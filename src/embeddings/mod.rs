// Embeddings module
// Content chunking, the embedding collaborator seam, and the Ollama client

pub mod chunking;
pub mod ollama;

use async_trait::async_trait;

use crate::Result;

pub use chunking::{ChunkingConfig, Segment, split};
pub use ollama::OllamaClient;

/// Turns text into fixed-length vectors.
///
/// The same embedder must be used for ingestion and for queries so that
/// document and question vectors share one space.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed several texts, preserving order
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(self.embed(text).await?);
        }
        Ok(embeddings)
    }
}
