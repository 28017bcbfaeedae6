// In-process collaborators for unit tests

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::embeddings::Embedder;
use crate::generation::{Generator, OutputFormat};
use crate::{Collaborator, RagError, Result};

const VOCABULARY: &[&str] = &["rust", "python", "cooking", "memory", "garden", "music"];

/// Embeds text as keyword counts over a small fixed vocabulary
#[derive(Debug, Default)]
pub struct KeywordEmbedder {
    fail_on: Option<String>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    texts: AtomicUsize,
}

impl KeywordEmbedder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail any batch containing a text with `word`
    pub fn failing_on(word: &str) -> Self {
        Self {
            fail_on: Some(word.to_string()),
            ..Self::default()
        }
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn dimension() -> usize {
        VOCABULARY.len() + 1
    }

    pub fn vector(text: &str) -> Vec<f32> {
        let lower = text.to_lowercase();
        let mut vector: Vec<f32> = VOCABULARY
            .iter()
            .map(|word| lower.matches(word).count() as f32)
            .collect();
        vector.push(0.1);
        vector
    }

    /// Number of embed calls made
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of texts embedded across all calls
    pub fn texts_embedded(&self) -> usize {
        self.texts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for KeywordEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut embeddings = self.embed_batch(&[text.to_string()]).await?;
        Ok(embeddings.remove(0))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(word) = &self.fail_on {
            if texts.iter().any(|t| t.contains(word.as_str())) {
                return Err(RagError::collaborator(
                    Collaborator::Embedding,
                    format!("refusing to embed text containing '{}'", word),
                ));
            }
        }
        self.texts.fetch_add(texts.len(), Ordering::SeqCst);
        Ok(texts.iter().map(|t| Self::vector(t)).collect())
    }
}

/// Returns a canned response and records every prompt it receives
#[derive(Debug)]
pub struct RecordingGenerator {
    response: String,
    delay: Option<Duration>,
    prompts: Mutex<Vec<(String, OutputFormat)>>,
}

impl RecordingGenerator {
    pub fn new(response: &str) -> Self {
        Self {
            response: response.to_string(),
            delay: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(response: &str, delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::new(response)
        }
    }

    pub fn prompts(&self) -> Vec<(String, OutputFormat)> {
        self.prompts.lock().expect("prompt log poisoned").clone()
    }
}

#[async_trait]
impl Generator for RecordingGenerator {
    async fn generate(&self, prompt: &str, format: OutputFormat) -> Result<String> {
        self.prompts
            .lock()
            .expect("prompt log poisoned")
            .push((prompt.to_string(), format));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.response.clone())
    }
}
