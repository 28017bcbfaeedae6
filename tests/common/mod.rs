// In-process collaborators shared by the integration tests

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use docs_rag::Result;
use docs_rag::embeddings::Embedder;
use docs_rag::generation::{Generator, OutputFormat};

const VOCABULARY: &[&str] = &["ownership", "borrow", "garden", "tomato", "sourdough", "oven"];

/// Embeds text as keyword counts, plus a constant component so no vector is zero
#[derive(Debug, Default)]
pub struct KeywordEmbedder {
    calls: AtomicUsize,
}

impl KeywordEmbedder {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
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
        Ok(texts
            .iter()
            .map(|text| {
                let lower = text.to_lowercase();
                VOCABULARY
                    .iter()
                    .map(|word| lower.matches(word).count() as f32)
                    .chain(std::iter::once(0.1))
                    .collect()
            })
            .collect())
    }
}

/// Answers with a canned response and keeps the prompts it saw
#[derive(Debug)]
pub struct CannedGenerator {
    response: String,
    prompts: Mutex<Vec<String>>,
}

impl CannedGenerator {
    pub fn new(response: &str) -> Self {
        Self {
            response: response.to_string(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().expect("prompt log poisoned").clone()
    }
}

#[async_trait]
impl Generator for CannedGenerator {
    async fn generate(&self, prompt: &str, _format: OutputFormat) -> Result<String> {
        self.prompts
            .lock()
            .expect("prompt log poisoned")
            .push(prompt.to_string());
        Ok(self.response.clone())
    }
}
