
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{RagError, Result};

/// A contiguous slice of a document's text, ready for embedding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    /// The window content, exactly as it appears in the source
    pub text: String,
    /// Identifier of the originating document
    pub source_id: String,
    /// Character offset of the window start within the source text
    pub offset: usize,
}

/// Configuration for content chunking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Window length in characters
    pub chunk_size: usize,
    /// Characters shared by consecutive windows of the same document
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            chunk_size: 600,
            overlap: 80,
        }
    }
}

impl ChunkingConfig {
    #[inline]
    pub fn validate(&self) -> Result<()> {
        validate_window(self.chunk_size, self.overlap)
    }

    /// Split a document's text using this configuration
    #[inline]
    pub fn split(&self, text: &str, source_id: &str) -> Result<Vec<Segment>> {
        split(text, self.chunk_size, self.overlap, source_id)
    }
}

/// Split text into overlapping windows of at most `chunk_size` characters.
///
/// The window start advances by `chunk_size - overlap` until a window reaches
/// the end of the text; that final window is not padded. Windows holding only
/// whitespace are dropped.
#[inline]
pub fn split(text: &str, chunk_size: usize, overlap: usize, source_id: &str) -> Result<Vec<Segment>> {
    validate_window(chunk_size, overlap)?;

    let chars: Vec<char> = text.chars().collect();
    let step = chunk_size - overlap;
    let mut segments = Vec::new();
    let mut dropped = 0_usize;
    let mut start = 0;

    while start < chars.len() {
        let end = (start + chunk_size).min(chars.len());
        let window: String = chars[start..end].iter().collect();

        if window.trim().is_empty() {
            dropped += 1;
        } else {
            segments.push(Segment {
                text: window,
                source_id: source_id.to_string(),
                offset: start,
            });
        }

        if end == chars.len() {
            break;
        }
        start += step;
    }

    debug!(
        "Split '{}' ({} chars) into {} segments, dropped {} blank windows",
        source_id,
        chars.len(),
        segments.len(),
        dropped
    );

    Ok(segments)
}

fn validate_window(chunk_size: usize, overlap: usize) -> Result<()> {
    if chunk_size == 0 {
        return Err(RagError::Configuration(
            "chunk size must be greater than 0".to_string(),
        ));
    }
    if overlap >= chunk_size {
        return Err(RagError::Configuration(format!(
            "overlap ({}) must be smaller than chunk size ({})",
            overlap, chunk_size
        )));
    }
    Ok(())
}
