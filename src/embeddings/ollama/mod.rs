#[cfg(test)]
mod tests;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::config::OllamaConfig;
use crate::embeddings::Embedder;
use crate::generation::{Generator, OutputFormat};
use crate::{Collaborator, RagError, Result};

const EXPONENTIAL_BACKOFF_BASE: u64 = 2;
const BACKOFF_UNIT_MS: u64 = 500;

/// Blocking client for the Ollama HTTP API.
///
/// Serves both as the embedder and as the generator. The async trait
/// implementations run requests on the blocking thread pool.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: Url,
    embedding_model: String,
    generation_model: String,
    batch_size: u32,
    embedding_dimension: Option<usize>,
    agent: ureq::Agent,
    retry_attempts: u32,
    timeout: Duration,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'static str>,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Debug, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub size: Option<u64>,
    pub digest: Option<String>,
    pub details: Option<ModelDetails>,
}

#[derive(Debug, Deserialize)]
pub struct ModelDetails {
    pub format: Option<String>,
    pub family: Option<String>,
    pub families: Option<Vec<String>>,
    pub parameter_size: Option<String>,
    pub quantization_level: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    models: Vec<ModelInfo>,
}

impl OllamaClient {
    #[inline]
    pub fn new(config: &OllamaConfig) -> Result<Self> {
        let base_url = config.ollama_url()?;
        let timeout = config.timeout();

        Ok(Self {
            base_url,
            embedding_model: config.embedding_model.clone(),
            generation_model: config.generation_model.clone(),
            batch_size: config.batch_size.max(1),
            embedding_dimension: config.embedding_dimension.map(|d| d as usize),
            agent: build_agent(timeout),
            retry_attempts: config.retry_attempts.max(1),
            timeout,
        })
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = build_agent(timeout);
        self.timeout = timeout;
        self
    }

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts.max(1);
        self
    }

    #[inline]
    pub fn embedding_model(&self) -> &str {
        &self.embedding_model
    }

    #[inline]
    pub fn generation_model(&self) -> &str {
        &self.generation_model
    }

    /// Test connection to the Ollama server and verify both models are installed
    #[inline]
    pub fn health_check(&self) -> Result<()> {
        debug!("Performing health check for Ollama at {}", self.base_url);

        self.ping()?;
        self.validate_models()?;

        info!(
            "Health check passed for Ollama server at {} (embedding: {}, generation: {})",
            self.base_url, self.embedding_model, self.generation_model
        );
        Ok(())
    }

    /// Ping the Ollama server to check if it's responsive
    #[inline]
    pub fn ping(&self) -> Result<()> {
        let url = self.endpoint("/api/tags")?;

        debug!("Pinging Ollama server at {}", url);

        self.make_request_with_retry(Collaborator::Embedding, || {
            self.agent
                .get(url.as_str())
                .call()
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })?;

        debug!("Server ping successful");
        Ok(())
    }

    /// Validate that the configured embedding and generation models are available
    #[inline]
    pub fn validate_models(&self) -> Result<()> {
        let models = self.list_models()?;
        let available: Vec<&str> = models.iter().map(|m| m.name.as_str()).collect();

        for (collaborator, model) in [
            (Collaborator::Embedding, &self.embedding_model),
            (Collaborator::Generation, &self.generation_model),
        ] {
            if available.iter().any(|name| model_matches(name, model)) {
                debug!("Model {} is available", model);
            } else {
                warn!(
                    "Model {} not found. Available models: {:?}",
                    model, available
                );
                return Err(RagError::collaborator(
                    collaborator,
                    format!(
                        "model '{}' is not available. Available models: {:?}",
                        model, available
                    ),
                ));
            }
        }

        Ok(())
    }

    /// List all available models
    #[inline]
    pub fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let url = self.endpoint("/api/tags")?;

        debug!("Fetching available models from {}", url);

        let response_text = self.make_request_with_retry(Collaborator::Embedding, || {
            self.agent
                .get(url.as_str())
                .call()
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })?;

        let models_response: ModelsResponse =
            serde_json::from_str(&response_text).map_err(|e| {
                RagError::collaborator(
                    Collaborator::Embedding,
                    format!("failed to parse models response: {}", e),
                )
            })?;

        debug!("Found {} models", models_response.models.len());
        Ok(models_response.models)
    }

    /// Embed texts in batches, preserving input order
    #[inline]
    pub fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Generating embeddings for {} texts", texts.len());

        let mut results = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size as usize) {
            results.extend(self.embed_single_batch(batch)?);
        }

        debug!("Generated {} embeddings total", results.len());
        Ok(results)
    }

    fn embed_single_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = self.endpoint("/api/embed")?;
        let request_json = serde_json::to_string(&EmbedRequest {
            model: &self.embedding_model,
            input: texts,
        })
        .map_err(|e| anyhow::anyhow!("Failed to serialize embedding request: {}", e))?;

        let response_text = self.make_request_with_retry(Collaborator::Embedding, || {
            self.agent
                .post(url.as_str())
                .header("Content-Type", "application/json")
                .send(&request_json)
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })?;

        let response: EmbedResponse = serde_json::from_str(&response_text).map_err(|e| {
            RagError::collaborator(
                Collaborator::Embedding,
                format!("failed to parse embedding response: {}", e),
            )
        })?;

        if response.embeddings.len() != texts.len() {
            return Err(RagError::collaborator(
                Collaborator::Embedding,
                format!(
                    "mismatch between request and response counts: {} vs {}",
                    texts.len(),
                    response.embeddings.len()
                ),
            ));
        }

        for embedding in &response.embeddings {
            if embedding.is_empty() {
                return Err(RagError::collaborator(
                    Collaborator::Embedding,
                    "server returned an empty embedding",
                ));
            }
            if let Some(expected) = self.embedding_dimension {
                if embedding.len() != expected {
                    return Err(RagError::DimensionMismatch {
                        expected,
                        actual: embedding.len(),
                    });
                }
            }
        }

        Ok(response.embeddings)
    }

    /// Generate a completion at temperature 0
    #[inline]
    pub fn generate_text(&self, prompt: &str, format: OutputFormat) -> Result<String> {
        let url = self.endpoint("/api/generate")?;
        let request_json = serde_json::to_string(&GenerateRequest {
            model: &self.generation_model,
            prompt,
            stream: false,
            options: GenerateOptions { temperature: 0.0 },
            format: match format {
                OutputFormat::Text => None,
                OutputFormat::Json => Some("json"),
            },
        })
        .map_err(|e| anyhow::anyhow!("Failed to serialize generation request: {}", e))?;

        debug!(
            "Requesting completion from {} ({} prompt chars)",
            self.generation_model,
            prompt.chars().count()
        );

        let response_text = self.make_request_with_retry(Collaborator::Generation, || {
            self.agent
                .post(url.as_str())
                .header("Content-Type", "application/json")
                .send(&request_json)
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })?;

        let response: GenerateResponse = serde_json::from_str(&response_text).map_err(|e| {
            RagError::collaborator(
                Collaborator::Generation,
                format!("failed to parse generation response: {}", e),
            )
        })?;

        Ok(response.response)
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| RagError::Configuration(format!("invalid Ollama endpoint {path}: {e}")))
    }

    fn make_request_with_retry<F>(&self, collaborator: Collaborator, mut request_fn: F) -> Result<String>
    where
        F: FnMut() -> std::result::Result<String, ureq::Error>,
    {
        let mut last_error = None;

        for attempt in 1..=self.retry_attempts {
            debug!("HTTP request attempt {}/{}", attempt, self.retry_attempts);

            match request_fn() {
                Ok(response_text) => {
                    debug!("Request succeeded on attempt {}", attempt);
                    return Ok(response_text);
                }
                Err(ureq::Error::StatusCode(status)) if status < 500 => {
                    warn!("Client error (status {}), not retrying", status);
                    return Err(RagError::collaborator(
                        collaborator,
                        format!("client error: HTTP {}", status),
                    ));
                }
                Err(ureq::Error::StatusCode(status)) => {
                    warn!(
                        "Server error (status {}), attempt {}/{}",
                        status, attempt, self.retry_attempts
                    );
                    last_error = Some(RagError::collaborator(
                        collaborator,
                        format!("server error: HTTP {}", status),
                    ));
                }
                Err(ureq::Error::Timeout(_)) => {
                    warn!(
                        "Request timed out after {:?}, attempt {}/{}",
                        self.timeout, attempt, self.retry_attempts
                    );
                    last_error = Some(RagError::CollaboratorTimeout {
                        collaborator,
                        timeout: self.timeout,
                    });
                }
                Err(
                    error @ (ureq::Error::ConnectionFailed
                    | ureq::Error::HostNotFound
                    | ureq::Error::Io(_)),
                ) => {
                    warn!(
                        "Transport error: {}, attempt {}/{}",
                        error, attempt, self.retry_attempts
                    );
                    last_error = Some(RagError::collaborator(
                        collaborator,
                        format!("request error: {}", error),
                    ));
                }
                Err(error) => {
                    warn!("Non-retryable error: {}", error);
                    return Err(RagError::collaborator(
                        collaborator,
                        format!("non-retryable error: {}", error),
                    ));
                }
            }

            if attempt < self.retry_attempts {
                let delay = Duration::from_millis(
                    EXPONENTIAL_BACKOFF_BASE.pow(attempt - 1) * BACKOFF_UNIT_MS,
                );
                debug!("Waiting {:?} before retry", delay);
                std::thread::sleep(delay);
            }
        }

        error!("All retry attempts failed for request to {}", self.base_url);

        Err(last_error.unwrap_or_else(|| {
            RagError::collaborator(collaborator, "request failed after retries")
        }))
    }
}

#[async_trait]
impl Embedder for OllamaClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut embeddings = self.embed_batch(&[text.to_string()]).await?;
        embeddings.pop().ok_or_else(|| {
            RagError::collaborator(Collaborator::Embedding, "server returned no embedding")
        })
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let client = self.clone();
        let texts = texts.to_vec();
        tokio::task::spawn_blocking(move || client.embed_texts(&texts))
            .await
            .map_err(|e| anyhow::anyhow!("Embedding task failed: {}", e))?
    }
}

#[async_trait]
impl Generator for OllamaClient {
    async fn generate(&self, prompt: &str, format: OutputFormat) -> Result<String> {
        let client = self.clone();
        let prompt = prompt.to_string();
        tokio::task::spawn_blocking(move || client.generate_text(&prompt, format))
            .await
            .map_err(|e| anyhow::anyhow!("Generation task failed: {}", e))?
    }
}

fn build_agent(timeout: Duration) -> ureq::Agent {
    ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .build()
        .into()
}

/// Ollama reports untagged models with an implicit `:latest` tag
fn model_matches(available: &str, wanted: &str) -> bool {
    available == wanted
        || available.strip_suffix(":latest") == Some(wanted)
        || wanted.strip_suffix(":latest") == Some(available)
}
