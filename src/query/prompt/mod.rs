
use std::fmt;

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::embeddings::chunking::Segment;
use crate::generation::OutputFormat;
use crate::{RagError, Result};

const CONTEXT_SEPARATOR: &str = "\n\n";

/// Prompt template used to frame retrieved context
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum PromptStyle {
    /// Answer the question from the context
    #[default]
    Qa,
    /// Summarize the context, ignoring the question
    Summarize,
    /// Answer as a `{question, answer}` JSON object
    #[value(name = "json_qa")]
    JsonQa,
}

impl PromptStyle {
    #[inline]
    pub const fn output_format(self) -> OutputFormat {
        match self {
            Self::JsonQa => OutputFormat::Json,
            Self::Qa | Self::Summarize => OutputFormat::Text,
        }
    }

    /// Fill the template with a question and an already joined context
    #[inline]
    pub fn render(self, question: &str, context: &str) -> String {
        match self {
            Self::Qa => format!(
                "Use the context to answer the question.\n\nContext:\n{context}\n\nQ: {question}\nA:"
            ),
            Self::Summarize => format!("Summarize the following text:\n\n{context}\n\nSummary:"),
            Self::JsonQa => {
                let quoted = serde_json::Value::from(question).to_string();
                format!(
                    "Context:\n{context}\n\nQuestion: {question}\n\n\
                     Respond ONLY in valid JSON with this structure:\n\
                     {{\n  \"question\": {quoted},\n  \"answer\": \"<your answer here>\"\n}}"
                )
            }
        }
    }
}

impl fmt::Display for PromptStyle {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Qa => "qa",
            Self::Summarize => "summarize",
            Self::JsonQa => "json_qa",
        })
    }
}

/// Configuration for prompt composition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptConfig {
    pub style: PromptStyle,
    /// Upper bound on the rendered prompt, in characters
    pub max_prompt_chars: usize,
}

impl Default for PromptConfig {
    #[inline]
    fn default() -> Self {
        Self {
            style: PromptStyle::Qa,
            max_prompt_chars: 12_000,
        }
    }
}

/// A rendered prompt and how many of the offered segments it contains
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedPrompt {
    pub text: String,
    /// Number of leading segments that made it into the prompt
    pub used: usize,
}

/// Render a prompt of at most `max_chars` characters.
///
/// `segments` must be in rank order; the lowest-ranked segments are dropped
/// first until the prompt fits.
#[inline]
pub fn compose(
    style: PromptStyle,
    question: &str,
    segments: &[Segment],
    max_chars: usize,
) -> Result<ComposedPrompt> {
    // The context placeholder appears exactly once in every template
    let frame_chars = style.render(question, "").chars().count();
    if frame_chars > max_chars {
        return Err(RagError::Configuration(format!(
            "prompt template and question need {} characters, limit is {}",
            frame_chars, max_chars
        )));
    }

    let separator_chars = CONTEXT_SEPARATOR.chars().count();
    let mut total = frame_chars;
    let mut used = 0;
    for (position, segment) in segments.iter().enumerate() {
        let extra = segment.text.chars().count() + if position == 0 { 0 } else { separator_chars };
        if total + extra > max_chars {
            break;
        }
        total += extra;
        used += 1;
    }

    if used < segments.len() {
        debug!(
            "Dropped {} lowest-ranked segments to fit {} characters",
            segments.len() - used,
            max_chars
        );
    }

    let context = segments[..used]
        .iter()
        .map(|segment| segment.text.as_str())
        .join(CONTEXT_SEPARATOR);

    Ok(ComposedPrompt {
        text: style.render(question, &context),
        used,
    })
}
