// Query module
// Answers questions from an indexed collection: embed, retrieve, compose, generate


pub mod prompt;

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::config::Config;
use crate::embeddings::Embedder;
use crate::embeddings::chunking::Segment;
use crate::generation::{Generator, OutputFormat, StructuredAnswer};
use crate::index::VectorIndex;
use crate::retriever::{RetrievalMode, Retriever};
use crate::{Collaborator, RagError, Result, call_with_timeout};

pub use prompt::{ComposedPrompt, PromptConfig, PromptStyle, compose};

/// Answer returned when retrieval finds nothing to ground a response in
pub const NO_CONTEXT_ANSWER: &str =
    "No relevant context was found in the knowledge base for this question.";

/// Per-query retrieval and prompt settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuerySettings {
    pub k: usize,
    pub mode: RetrievalMode,
    pub style: PromptStyle,
    pub max_prompt_chars: usize,
}

impl QuerySettings {
    #[inline]
    pub const fn from_config(config: &Config) -> Self {
        Self {
            k: config.retrieval.k,
            mode: config.retrieval.retrieval_mode(),
            style: config.prompt.style,
            max_prompt_chars: config.prompt.max_prompt_chars,
        }
    }
}

impl Default for QuerySettings {
    #[inline]
    fn default() -> Self {
        Self {
            k: 3,
            mode: RetrievalMode::Plain,
            style: PromptStyle::Qa,
            max_prompt_chars: PromptConfig::default().max_prompt_chars,
        }
    }
}

/// Generated answer and the context it was grounded on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    /// Generator output, verbatim
    pub text: String,
    /// Segments included in the prompt, best first
    pub segments: Vec<Segment>,
    /// Parsed output when the JSON prompt style is used
    pub structured: Option<StructuredAnswer>,
}

/// Question answering over a [`VectorIndex`]
pub struct QueryPipeline {
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn Generator>,
    settings: QuerySettings,
    timeout: Option<Duration>,
}

impl QueryPipeline {
    #[inline]
    pub fn new(
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
        settings: QuerySettings,
    ) -> Self {
        Self {
            embedder,
            generator,
            settings,
            timeout: None,
        }
    }

    /// Bound every embedding and generation call by `timeout`
    #[inline]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[inline]
    pub const fn settings(&self) -> &QuerySettings {
        &self.settings
    }

    /// Answer `question` from the segments stored in `index`
    #[inline]
    pub async fn ask(&self, index: &VectorIndex, question: &str) -> Result<Answer> {
        let question = question.trim();
        if question.is_empty() {
            return Err(RagError::InvalidArgument(
                "question must not be empty".to_string(),
            ));
        }

        let started = Instant::now();
        info!("Answering question against '{}': {}", index.collection(), question);

        let query_embedding = call_with_timeout(
            Collaborator::Embedding,
            self.timeout,
            self.embedder.embed(question),
        )
        .await?;

        let segments = Retriever::new(index).retrieve(
            &query_embedding,
            self.settings.k,
            self.settings.mode,
        )?;
        debug!("Retrieved {} segments", segments.len());

        if segments.is_empty() {
            info!("No context retrieved, skipping generation");
            return self.no_context_answer(question);
        }

        let composed = compose(
            self.settings.style,
            question,
            &segments,
            self.settings.max_prompt_chars,
        )?;
        if composed.used == 0 {
            info!(
                "Top segment alone exceeds {} prompt characters, skipping generation",
                self.settings.max_prompt_chars
            );
            return self.no_context_answer(question);
        }
        let format = self.settings.style.output_format();

        let text = call_with_timeout(
            Collaborator::Generation,
            self.timeout,
            self.generator.generate(&composed.text, format),
        )
        .await?;

        let structured = match format {
            OutputFormat::Json => Some(StructuredAnswer::parse(&text)?),
            OutputFormat::Text => None,
        };

        info!(
            "Answered in {:.2?} using {} segments",
            started.elapsed(),
            composed.used
        );

        let mut segments = segments;
        segments.truncate(composed.used);
        Ok(Answer {
            text,
            segments,
            structured,
        })
    }

    fn no_context_answer(&self, question: &str) -> Result<Answer> {
        match self.settings.style.output_format() {
            OutputFormat::Text => Ok(Answer {
                text: NO_CONTEXT_ANSWER.to_string(),
                segments: Vec::new(),
                structured: None,
            }),
            OutputFormat::Json => {
                let structured = StructuredAnswer {
                    question: question.to_string(),
                    answer: NO_CONTEXT_ANSWER.to_string(),
                };
                let text = serde_json::to_string(&structured)
                    .map_err(|e| anyhow::anyhow!("Failed to encode answer: {}", e))?;
                Ok(Answer {
                    text,
                    segments: Vec::new(),
                    structured: Some(structured),
                })
            }
        }
    }
}
