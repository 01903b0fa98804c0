//! Configuration for the ingestion pipeline

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Main ingestion configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct IngestConfig {
    /// Vector store connection and batching
    #[serde(default)]
    pub vector_store: VectorStoreConfig,
    /// Embedding model configuration
    #[serde(default)]
    pub embeddings: EmbeddingConfig,
    /// Ollama configuration (used when embeddings.provider = ollama)
    #[serde(default)]
    pub ollama: OllamaConfig,
    /// Chunking configuration
    #[serde(default)]
    pub chunking: ChunkingConfig,
    /// OCR fallback configuration
    #[serde(default)]
    pub ocr: OcrConfig,
    /// Input, processed and error directories
    #[serde(default)]
    pub paths: PathsConfig,
}

impl IngestConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        toml::from_str(&raw)
            .map_err(|e| Error::config(format!("Invalid config file {}: {}", path.display(), e)))
    }

    /// Load from an optional TOML file, then apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply overrides from environment variables (QDRANT_URL, CHUNK_SIZE, ...)
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("QDRANT_URL") {
            self.vector_store.url = v;
        }
        if let Some(v) = lookup("QDRANT_COLLECTION") {
            self.vector_store.collection = v;
        }
        if let Some(v) = lookup("QDRANT_API_KEY") {
            self.vector_store.api_key = Some(v);
        }
        if let Some(v) = lookup("BATCH_SIZE") {
            self.vector_store.upsert_batch_size = parse_env("BATCH_SIZE", &v)?;
        }
        if let Some(v) = lookup("OLLAMA_URL") {
            self.ollama.base_url = v;
        }
        if let Some(v) = lookup("EMBEDDING_PROVIDER") {
            self.embeddings.provider = match v.to_lowercase().as_str() {
                "onnx" | "local" => EmbeddingBackend::Onnx,
                "ollama" | "remote" => EmbeddingBackend::Ollama,
                other => {
                    return Err(Error::config(format!(
                        "EMBEDDING_PROVIDER must be 'onnx' or 'ollama', got '{}'",
                        other
                    )))
                }
            };
        }
        if let Some(v) = lookup("EMBEDDING_MODEL") {
            self.embeddings.model = v.clone();
            self.ollama.embed_model = v;
        }
        if let Some(v) = lookup("EMBEDDING_DIM") {
            self.embeddings.dimensions = parse_env("EMBEDDING_DIM", &v)?;
        }
        if let Some(v) = lookup("EMBEDDING_BATCH_SIZE") {
            self.embeddings.batch_size = parse_env("EMBEDDING_BATCH_SIZE", &v)?;
        }
        if let Some(v) = lookup("CHUNK_SIZE") {
            self.chunking.chunk_size = parse_env("CHUNK_SIZE", &v)?;
        }
        if let Some(v) = lookup("CHUNK_OVERLAP") {
            self.chunking.chunk_overlap = parse_env("CHUNK_OVERLAP", &v)?;
        }
        if let Some(v) = lookup("INPUT_DIR") {
            self.paths.input_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("PROCESSED_DIR") {
            self.paths.processed_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("ERROR_LOG_DIR") {
            self.paths.error_dir = PathBuf::from(v);
        }
        Ok(())
    }

    /// Reject settings that would make a run meaningless
    pub fn validate(&self) -> Result<()> {
        if self.chunking.chunk_size == 0 {
            return Err(Error::config("chunking.chunk_size must be greater than 0"));
        }
        if self.vector_store.upsert_batch_size == 0 {
            return Err(Error::config("vector_store.upsert_batch_size must be greater than 0"));
        }
        if self.embeddings.batch_size == 0 {
            return Err(Error::config("embeddings.batch_size must be greater than 0"));
        }
        if self.embeddings.dimensions == 0 {
            return Err(Error::config("embeddings.dimensions must be greater than 0"));
        }
        if self.vector_store.collection.trim().is_empty() {
            return Err(Error::config("vector_store.collection must not be empty"));
        }
        if !is_http_url(&self.vector_store.url) {
            return Err(Error::config(format!(
                "vector_store.url must be an http(s) URL, got '{}'",
                self.vector_store.url
            )));
        }
        if self.embeddings.provider == EmbeddingBackend::Ollama && !is_http_url(&self.ollama.base_url) {
            return Err(Error::config(format!(
                "ollama.base_url must be an http(s) URL, got '{}'",
                self.ollama.base_url
            )));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::config(format!("{} has an invalid value: '{}'", key, value)))
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Vector store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorStoreConfig {
    /// Qdrant base URL
    pub url: String,
    /// Optional API key sent as the `api-key` header
    pub api_key: Option<String>,
    /// Target collection
    pub collection: String,
    /// Points per upsert request
    pub upsert_batch_size: usize,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:6333".to_string(),
            api_key: None,
            collection: "university_documents".to_string(),
            upsert_batch_size: 100,
            timeout_secs: 60,
        }
    }
}

/// Which embedding provider to load
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// In-process ONNX model
    #[default]
    Onnx,
    /// Remote Ollama endpoint
    Ollama,
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Provider backend
    pub provider: EmbeddingBackend,
    /// Model to use (default: all-MiniLM-L6-v2)
    pub model: String,
    /// Embedding dimensions (384 for MiniLM)
    pub dimensions: usize,
    /// Texts per provider call
    pub batch_size: usize,
    /// Maximum sequence length
    pub max_length: usize,
    /// Cache directory for models
    pub cache_dir: PathBuf,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingBackend::Onnx,
            model: "all-MiniLM-L6-v2".to_string(),
            dimensions: 384,
            // Small batches keep CPU inference memory flat
            batch_size: 8,
            max_length: 256,
            cache_dir: dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("doc-ingest")
                .join("models"),
        }
    }
}

/// Ollama configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaConfig {
    /// Ollama base URL
    pub base_url: String,
    /// Embedding model name
    pub embed_model: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Number of retries for failed requests
    pub max_retries: u32,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            embed_model: "all-minilm".to_string(),
            timeout_secs: 60,
            max_retries: 2,
        }
    }
}

/// Text chunking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Target chunk size in characters
    pub chunk_size: usize,
    /// Accepted for compatibility; chunks never overlap
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

/// OCR fallback configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Allow tesseract fallback for image-only PDFs and images
    pub enabled: bool,
    /// Below this many characters a PDF text layer is considered missing
    pub min_text_chars: usize,
    /// Rasterization resolution for PDF pages
    pub dpi: u32,
    /// Tesseract language
    pub language: String,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_text_chars: 50,
            dpi: 150,
            language: "eng".to_string(),
        }
    }
}

/// Filesystem locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory scanned recursively for documents
    pub input_dir: PathBuf,
    /// Where successfully ingested files are moved
    pub processed_dir: PathBuf,
    /// Where per-run error logs are written
    pub error_dir: PathBuf,
    /// Move files into `processed_dir` after success
    pub move_processed: bool,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("data/input"),
            processed_dir: PathBuf::from("data/processed"),
            error_dir: PathBuf::from("data/errors"),
            move_processed: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() {
        let config = IngestConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.chunking.chunk_size, 1000);
        assert_eq!(config.vector_store.upsert_batch_size, 100);
        assert_eq!(config.embeddings.dimensions, 384);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("QDRANT_URL", "http://qdrant:6333"),
            ("QDRANT_COLLECTION", "handbooks"),
            ("CHUNK_SIZE", "500"),
            ("BATCH_SIZE", "50"),
            ("EMBEDDING_PROVIDER", "ollama"),
            ("EMBEDDING_MODEL", "nomic-embed-text"),
            ("EMBEDDING_DIM", "768"),
        ]
        .into_iter()
        .collect();

        let mut config = IngestConfig::default();
        config
            .apply_env(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.vector_store.url, "http://qdrant:6333");
        assert_eq!(config.vector_store.collection, "handbooks");
        assert_eq!(config.chunking.chunk_size, 500);
        assert_eq!(config.vector_store.upsert_batch_size, 50);
        assert_eq!(config.embeddings.provider, EmbeddingBackend::Ollama);
        assert_eq!(config.ollama.embed_model, "nomic-embed-text");
        assert_eq!(config.embeddings.dimensions, 768);
    }

    #[test]
    fn test_invalid_env_value() {
        let mut config = IngestConfig::default();
        let err = config
            .apply_env(|key| (key == "CHUNK_SIZE").then(|| "lots".to_string()))
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_validate_rejects_zero_sizes() {
        let mut config = IngestConfig::default();
        config.chunking.chunk_size = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = IngestConfig::default();
        config.vector_store.url = "qdrant:6333".to_string();
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_from_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ingest.toml");
        std::fs::write(
            &path,
            r#"
[vector_store]
url = "http://localhost:6333"
collection = "docs"
upsert_batch_size = 25
timeout_secs = 10

[chunking]
chunk_size = 400
chunk_overlap = 0
"#,
        )
        .unwrap();

        let config = IngestConfig::from_file(&path).unwrap();
        assert_eq!(config.vector_store.collection, "docs");
        assert_eq!(config.vector_store.upsert_batch_size, 25);
        assert_eq!(config.chunking.chunk_size, 400);
        // Sections left out fall back to defaults
        assert_eq!(config.embeddings.dimensions, 384);
    }

    #[test]
    fn test_partial_sections_keep_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ingest.toml");
        std::fs::write(
            &path,
            r#"
[ocr]
enabled = false

[vector_store]
collection = "docs"

[ollama]
embed_model = "nomic-embed-text"
"#,
        )
        .unwrap();

        let config = IngestConfig::from_file(&path).unwrap();
        let defaults = IngestConfig::default();
        assert!(!config.ocr.enabled);
        assert_eq!(config.ocr.min_text_chars, defaults.ocr.min_text_chars);
        assert_eq!(config.ocr.dpi, defaults.ocr.dpi);
        assert_eq!(config.ocr.language, defaults.ocr.language);
        assert_eq!(config.vector_store.collection, "docs");
        assert_eq!(config.vector_store.url, defaults.vector_store.url);
        assert_eq!(config.ollama.embed_model, "nomic-embed-text");
        assert_eq!(config.ollama.base_url, defaults.ollama.base_url);
        assert_eq!(config.embeddings.model, defaults.embeddings.model);
    }
}
