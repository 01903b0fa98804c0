//! Embedding providers and the generator that owns the loaded model

mod generator;
mod ollama;
#[cfg(feature = "onnx")]
mod onnx;

pub use generator::{BackendLoader, EmbeddingGenerator, ModelLoader};
pub use ollama::OllamaEmbedder;
#[cfg(feature = "onnx")]
pub use onnx::OnnxEmbedder;

use async_trait::async_trait;

use crate::error::Result;

/// Trait for generating text embeddings
///
/// Implementations:
/// - `OnnxEmbedder`: in-process sentence-transformers model (all-MiniLM-L6-v2)
/// - `OllamaEmbedder`: local Ollama server (all-minilm)
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate embedding for a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for multiple texts, in input order
    ///
    /// Default implementation calls `embed` sequentially.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(self.embed(text).await?);
        }
        Ok(embeddings)
    }

    /// Embedding dimensions (384 for MiniLM)
    fn dimensions(&self) -> usize;

    /// Check if the provider is healthy and available
    async fn health_check(&self) -> Result<bool>;

    /// Provider name for logging
    fn name(&self) -> &str;
}
