//! Error types for the ingestion pipeline

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for ingestion operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ingestion pipeline errors
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or invalid settings, detected before a run starts
    #[error("Configuration error: {0}")]
    Config(String),

    /// Unreadable, unsupported or corrupt file (including OCR exhaustion)
    #[error("Failed to extract text from '{path}': {message}")]
    Extraction { path: String, message: String },

    /// Extension outside the configured set
    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),

    /// Model load or inference failure
    #[error("Embedding generation failed: {0}")]
    Embedding(String),

    /// Provider returned a vector of the wrong length
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Collection creation, upsert or search failure
    #[error("Vector store error: {0}")]
    VectorStore(String),

    /// Health verification failed before the run started
    #[error("Preflight check failed: {0}")]
    Preflight(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request error
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Category recorded for a failed file in the error log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Extraction,
    Embedding,
    Storage,
    Config,
    Exception,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Extraction => "extraction",
            Self::Embedding => "embedding",
            Self::Storage => "storage",
            Self::Config => "config",
            Self::Exception => "exception",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Error {
    /// Create an extraction error
    pub fn extraction(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Extraction {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create an embedding error
    pub fn embedding(message: impl Into<String>) -> Self {
        Self::Embedding(message.into())
    }

    /// Create a vector store error
    pub fn vector_store(message: impl Into<String>) -> Self {
        Self::VectorStore(message.into())
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Category used when this error is recorded against a file
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Extraction { .. } | Error::UnsupportedFileType(_) => ErrorCategory::Extraction,
            Error::Embedding(_) | Error::DimensionMismatch { .. } => ErrorCategory::Embedding,
            Error::VectorStore(_) => ErrorCategory::Storage,
            Error::Config(_) => ErrorCategory::Config,
            Error::Preflight(_)
            | Error::Io(_)
            | Error::Json(_)
            | Error::Http(_)
            | Error::Internal(_) => ErrorCategory::Exception,
        }
    }

    /// Whether this error must abort the whole run rather than a single file
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::DimensionMismatch { .. } | Error::Preflight(_) | Error::Config(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories() {
        assert_eq!(
            Error::extraction("a.pdf", "corrupt").category(),
            ErrorCategory::Extraction
        );
        assert_eq!(Error::embedding("oom").category(), ErrorCategory::Embedding);
        assert_eq!(Error::vector_store("down").category(), ErrorCategory::Storage);
        assert_eq!(Error::internal("x").category(), ErrorCategory::Exception);
        assert_eq!(ErrorCategory::Storage.to_string(), "storage");
    }

    #[test]
    fn test_fatal_errors() {
        assert!(Error::DimensionMismatch { expected: 384, actual: 768 }.is_fatal());
        assert!(!Error::extraction("a.pdf", "corrupt").is_fatal());
        assert!(!Error::vector_store("batch 2 rejected").is_fatal());
    }
}
