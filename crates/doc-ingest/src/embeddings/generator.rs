//! Embedding generator owning a lazily loaded provider

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::OnceCell;

use crate::config::{EmbeddingBackend, EmbeddingConfig, IngestConfig, OllamaConfig};
use crate::error::{Error, Result};

use super::{EmbeddingProvider, OllamaEmbedder};

/// Produces the embedding provider on first use
#[async_trait]
pub trait ModelLoader: Send + Sync {
    /// Load (or connect to) the embedding model
    async fn load(&self) -> Result<Arc<dyn EmbeddingProvider>>;

    /// Human-readable description for logs
    fn describe(&self) -> String;
}

/// Loads the backend selected in configuration
#[derive(Debug, Clone)]
pub struct BackendLoader {
    embeddings: EmbeddingConfig,
    ollama: OllamaConfig,
}

impl BackendLoader {
    pub fn new(config: &IngestConfig) -> Self {
        Self {
            embeddings: config.embeddings.clone(),
            ollama: config.ollama.clone(),
        }
    }
}

#[async_trait]
impl ModelLoader for BackendLoader {
    async fn load(&self) -> Result<Arc<dyn EmbeddingProvider>> {
        match self.embeddings.provider {
            EmbeddingBackend::Onnx => {
                #[cfg(feature = "onnx")]
                {
                    let embedder = super::OnnxEmbedder::new(&self.embeddings).await?;
                    Ok(Arc::new(embedder))
                }
                #[cfg(not(feature = "onnx"))]
                {
                    Err(Error::config(
                        "ONNX embeddings require the 'onnx' feature; set EMBEDDING_PROVIDER=ollama",
                    ))
                }
            }
            EmbeddingBackend::Ollama => {
                let embedder = OllamaEmbedder::new(&self.ollama, self.embeddings.dimensions)?;
                Ok(Arc::new(embedder))
            }
        }
    }

    fn describe(&self) -> String {
        match self.embeddings.provider {
            EmbeddingBackend::Onnx => format!("onnx:{}", self.embeddings.model),
            EmbeddingBackend::Ollama => {
                format!("ollama:{} at {}", self.ollama.embed_model, self.ollama.base_url)
            }
        }
    }
}

/// Loader for an already constructed provider
struct Preloaded(Arc<dyn EmbeddingProvider>);

#[async_trait]
impl ModelLoader for Preloaded {
    async fn load(&self) -> Result<Arc<dyn EmbeddingProvider>> {
        Ok(Arc::clone(&self.0))
    }

    fn describe(&self) -> String {
        self.0.name().to_string()
    }
}

/// Turns text into fixed-dimension vectors
///
/// The provider is loaded at most once per generator, on first use, and
/// every vector it returns is checked against the configured dimension.
pub struct EmbeddingGenerator {
    loader: Box<dyn ModelLoader>,
    provider: OnceCell<Arc<dyn EmbeddingProvider>>,
    dimensions: usize,
    batch_size: usize,
}

impl EmbeddingGenerator {
    /// Generator for the backend selected in configuration
    pub fn new(config: &IngestConfig) -> Self {
        Self::with_loader(
            BackendLoader::new(config),
            config.embeddings.dimensions,
            config.embeddings.batch_size,
        )
    }

    /// Generator with a custom loader
    pub fn with_loader(loader: impl ModelLoader + 'static, dimensions: usize, batch_size: usize) -> Self {
        Self {
            loader: Box::new(loader),
            provider: OnceCell::new(),
            dimensions,
            batch_size: batch_size.max(1),
        }
    }

    /// Generator around an existing provider; its dimension is the expected one
    pub fn with_provider(provider: Arc<dyn EmbeddingProvider>, batch_size: usize) -> Self {
        let dimensions = provider.dimensions();
        Self::with_loader(Preloaded(provider), dimensions, batch_size)
    }

    /// Expected vector dimension
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Default texts per provider call
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Whether the model has been loaded yet
    pub fn is_loaded(&self) -> bool {
        self.provider.initialized()
    }

    /// Name of the loaded provider, if any
    pub fn provider_name(&self) -> Option<String> {
        self.provider.get().map(|p| p.name().to_string())
    }

    async fn model(&self) -> Result<&Arc<dyn EmbeddingProvider>> {
        self.provider
            .get_or_try_init(|| async {
                tracing::info!("Loading embedding model ({})", self.loader.describe());
                let provider = self.loader.load().await?;
                if provider.dimensions() != self.dimensions {
                    return Err(Error::DimensionMismatch {
                        expected: self.dimensions,
                        actual: provider.dimensions(),
                    });
                }
                tracing::info!(
                    "Embedding model ready: {} ({} dimensions)",
                    provider.name(),
                    provider.dimensions()
                );
                Ok(provider)
            })
            .await
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimensions {
            return Err(Error::DimensionMismatch {
                expected: self.dimensions,
                actual: vector.len(),
            });
        }
        Ok(())
    }

    /// Embed one text
    pub async fn generate_embedding(&self, text: &str) -> Result<Vec<f32>> {
        let vector = self.model().await?.embed(text).await?;
        self.check_dimension(&vector)?;
        Ok(vector)
    }

    /// Embed texts in sequential sub-batches, preserving input order
    pub async fn generate_embeddings_batch(
        &self,
        texts: &[String],
        batch_size: usize,
    ) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let model = self.model().await?;
        let batch_size = batch_size.max(1);
        let mut vectors = Vec::with_capacity(texts.len());

        for (i, batch) in texts.chunks(batch_size).enumerate() {
            tracing::debug!("Embedding batch {} ({} texts)", i + 1, batch.len());
            let batch_vectors = model.embed_batch(batch).await?;

            if batch_vectors.len() != batch.len() {
                return Err(Error::embedding(format!(
                    "{} returned {} vectors for {} texts",
                    model.name(),
                    batch_vectors.len(),
                    batch.len()
                )));
            }
            for vector in &batch_vectors {
                self.check_dimension(vector)?;
            }
            vectors.extend(batch_vectors);
        }

        Ok(vectors)
    }

    /// Embed texts using the configured batch size
    pub async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.generate_embeddings_batch(texts, self.batch_size).await
    }

    /// Dimension the provider actually produces
    pub async fn embedding_dimension(&self) -> Result<usize> {
        Ok(self.model().await?.embed("test").await?.len())
    }

    /// Encode a sample string and verify the vector length
    pub async fn self_test(&self) -> Result<()> {
        let actual = self.embedding_dimension().await?;
        if actual != self.dimensions {
            return Err(Error::DimensionMismatch {
                expected: self.dimensions,
                actual,
            });
        }
        tracing::info!("Embedding self-test passed ({} dimensions)", actual);
        Ok(())
    }

    /// Provider health, loading the model if needed
    pub async fn health_check(&self) -> Result<bool> {
        self.model().await?.health_check().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeProvider {
        dims: usize,
        produced_dims: usize,
        calls: Mutex<Vec<usize>>,
    }

    impl FakeProvider {
        fn new(dims: usize) -> Self {
            Self {
                dims,
                produced_dims: dims,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl EmbeddingProvider for FakeProvider {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            Ok(vec![text.len() as f32; self.produced_dims])
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.calls.lock().push(texts.len());
            let mut out = Vec::new();
            for text in texts {
                out.push(self.embed(text).await?);
            }
            Ok(out)
        }

        fn dimensions(&self) -> usize {
            self.dims
        }

        async fn health_check(&self) -> Result<bool> {
            Ok(true)
        }

        fn name(&self) -> &str {
            "fake"
        }
    }

    struct CountingLoader {
        loads: Arc<AtomicUsize>,
        provider: Arc<FakeProvider>,
    }

    #[async_trait]
    impl ModelLoader for CountingLoader {
        async fn load(&self) -> Result<Arc<dyn EmbeddingProvider>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok(self.provider.clone())
        }

        fn describe(&self) -> String {
            "counting".to_string()
        }
    }

    struct FailingLoader;

    #[async_trait]
    impl ModelLoader for FailingLoader {
        async fn load(&self) -> Result<Arc<dyn EmbeddingProvider>> {
            Err(Error::embedding("model file missing"))
        }

        fn describe(&self) -> String {
            "failing".to_string()
        }
    }

    fn texts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_model_loaded_once() {
        let loads = Arc::new(AtomicUsize::new(0));
        let generator = EmbeddingGenerator::with_loader(
            CountingLoader {
                loads: loads.clone(),
                provider: Arc::new(FakeProvider::new(4)),
            },
            4,
            8,
        );

        assert!(!generator.is_loaded());
        generator.generate_embedding("one").await.unwrap();
        generator.generate_embedding("two").await.unwrap();
        generator.embed_texts(&texts(&["a", "b"])).await.unwrap();
        generator.self_test().await.unwrap();

        assert!(generator.is_loaded());
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert_eq!(generator.provider_name().as_deref(), Some("fake"));
    }

    #[tokio::test]
    async fn test_batches_preserve_order() {
        let provider = Arc::new(FakeProvider::new(3));
        let generator = EmbeddingGenerator::with_provider(provider.clone(), 8);

        let input = texts(&["a", "bb", "ccc", "dddd", "eeeee"]);
        let vectors = generator.generate_embeddings_batch(&input, 2).await.unwrap();

        assert_eq!(vectors.len(), 5);
        for (text, vector) in input.iter().zip(&vectors) {
            assert_eq!(vector, &vec![text.len() as f32; 3]);
        }
        assert_eq!(*provider.calls.lock(), vec![2, 2, 1]);
    }

    #[tokio::test]
    async fn test_empty_batch_skips_loading() {
        let generator = EmbeddingGenerator::with_loader(FailingLoader, 4, 8);
        let vectors = generator.generate_embeddings_batch(&[], 4).await.unwrap();
        assert!(vectors.is_empty());
        assert!(!generator.is_loaded());
    }

    #[tokio::test]
    async fn test_dimension_mismatch_is_fatal() {
        let provider = Arc::new(FakeProvider {
            dims: 384,
            produced_dims: 128,
            calls: Mutex::new(Vec::new()),
        });
        let generator = EmbeddingGenerator::with_provider(provider, 8);

        let err = generator.generate_embedding("text").await.unwrap_err();
        assert!(matches!(
            err,
            Error::DimensionMismatch {
                expected: 384,
                actual: 128
            }
        ));
        assert!(err.is_fatal());
        assert!(generator.self_test().await.is_err());
        assert_eq!(generator.embedding_dimension().await.unwrap(), 128);
    }

    #[tokio::test]
    async fn test_load_failure_propagates() {
        let generator = EmbeddingGenerator::with_loader(FailingLoader, 4, 8);
        assert!(matches!(
            generator.generate_embedding("x").await,
            Err(Error::Embedding(_))
        ));
        assert!(!generator.is_loaded());
    }
}
