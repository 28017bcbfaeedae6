use std::fmt;
use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RagError>;

/// The external services the pipelines call out to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collaborator {
    Extraction,
    Embedding,
    Generation,
}

impl fmt::Display for Collaborator {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Extraction => "text extraction",
            Self::Embedding => "embedding",
            Self::Generation => "generation",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Dimension mismatch: index expects {expected} dimensions, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{collaborator} timed out after {timeout:?}")]
    CollaboratorTimeout {
        collaborator: Collaborator,
        timeout: Duration,
    },

    #[error("{collaborator} failed: {message}")]
    Collaborator {
        collaborator: Collaborator,
        message: String,
    },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Schema validation error: {0}")]
    SchemaValidation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl RagError {
    #[inline]
    pub fn collaborator(collaborator: Collaborator, message: impl Into<String>) -> Self {
        Self::Collaborator {
            collaborator,
            message: message.into(),
        }
    }

    /// Whether the error came from an external collaborator rather than from the data
    #[inline]
    pub const fn is_collaborator_error(&self) -> bool {
        matches!(
            self,
            Self::Collaborator { .. } | Self::CollaboratorTimeout { .. }
        )
    }
}

/// Await a collaborator call, failing with [`RagError::CollaboratorTimeout`]
/// once `timeout` elapses
pub(crate) async fn call_with_timeout<T, F>(
    collaborator: Collaborator,
    timeout: Option<Duration>,
    call: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let Some(timeout) = timeout else {
        return call.await;
    };
    tokio::time::timeout(timeout, call)
        .await
        .map_err(|_| RagError::CollaboratorTimeout {
            collaborator,
            timeout,
        })?
}

impl From<config::ConfigError> for RagError {
    #[inline]
    fn from(error: config::ConfigError) -> Self {
        Self::Configuration(error.to_string())
    }
}

pub mod commands;
pub mod config;
pub mod embeddings;
pub mod extraction;
pub mod generation;
pub mod index;
pub mod indexer;
pub mod query;
pub mod retriever;

#[cfg(test)]
mod test_support;
