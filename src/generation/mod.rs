// Generation module
// The language-model collaborator seam and structured answer validation


use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{RagError, Result};

/// Output shape requested from the generator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Produces text from a prompt.
///
/// Implementations are expected to sample deterministically (temperature 0)
/// so identical context yields identical answers.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, prompt: &str, format: OutputFormat) -> Result<String>;
}

/// Answer shape required in structured output mode
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredAnswer {
    pub question: String,
    pub answer: String,
}

impl StructuredAnswer {
    /// Parse and validate generator output against the `{question, answer}` schema.
    ///
    /// A surrounding Markdown code fence is tolerated.
    #[inline]
    pub fn parse(output: &str) -> Result<Self> {
        let body = strip_code_fence(output.trim());

        let value: serde_json::Value = serde_json::from_str(body)
            .map_err(|e| RagError::SchemaValidation(format!("output is not valid JSON: {}", e)))?;

        if !value.is_object() {
            return Err(RagError::SchemaValidation(
                "output must be a JSON object".to_string(),
            ));
        }

        let answer: Self = serde_json::from_value(value).map_err(|e| {
            RagError::SchemaValidation(format!("output does not match the answer schema: {}", e))
        })?;

        if answer.answer.trim().is_empty() {
            return Err(RagError::SchemaValidation(
                "answer field is empty".to_string(),
            ));
        }

        Ok(answer)
    }
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
