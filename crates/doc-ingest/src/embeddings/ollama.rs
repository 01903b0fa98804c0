//! Ollama embedding provider with retry logic

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::sleep;

use crate::config::OllamaConfig;
use crate::error::{Error, Result};

use super::EmbeddingProvider;

/// Ollama API client for embeddings, with automatic retry
pub struct OllamaEmbedder {
    client: Client,
    base_url: String,
    model: String,
    dimensions: usize,
    max_retries: u32,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

impl OllamaEmbedder {
    /// Create a new Ollama embedder
    pub fn new(config: &OllamaConfig, dimensions: usize) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .pool_max_idle_per_host(5)
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.embed_model.clone(),
            dimensions,
            max_retries: config.max_retries,
        })
    }

    /// Retry a request with exponential backoff
    async fn retry_request<F, Fut, T>(&self, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    last_error = Some(e);
                    if attempt < self.max_retries {
                        let delay = Duration::from_secs(2u64.pow(attempt));
                        tracing::warn!(
                            "Embedding request failed (attempt {}/{}), retrying in {:?}",
                            attempt + 1,
                            self.max_retries + 1,
                            delay
                        );
                        sleep(delay).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| Error::embedding("Unknown error")))
    }

    async fn request_embedding(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/api/embeddings", self.base_url);
        let request = EmbedRequest {
            model: &self.model,
            prompt: text,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::embedding(format!("Embedding request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::embedding(format!(
                "Embedding failed: HTTP {}",
                response.status()
            )));
        }

        let body: EmbedResponse = response
            .json()
            .await
            .map_err(|e| Error::embedding(format!("Invalid embedding response: {}", e)))?;

        Ok(body.embedding)
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.retry_request(|| self.request_embedding(text)).await
    }

    // Default sequential embed_batch: Ollama has no batch endpoint for this API

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/api/tags", self.base_url);

        match self.client.get(&url).send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(base_url: String, max_retries: u32) -> OllamaConfig {
        OllamaConfig {
            base_url,
            embed_model: "all-minilm".to_string(),
            timeout_secs: 5,
            max_retries,
        }
    }

    #[tokio::test]
    async fn test_embed_posts_model_and_prompt() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/embeddings")
            .match_body(mockito::Matcher::Json(serde_json::json!({
                "model": "all-minilm",
                "prompt": "hello world"
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"embedding":[0.1,0.2,0.3]}"#)
            .create_async()
            .await;

        let embedder = OllamaEmbedder::new(&config(server.url(), 0), 3).unwrap();
        let vector = embedder.embed("hello world").await.unwrap();

        assert_eq!(vector, vec![0.1, 0.2, 0.3]);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_batch_is_sequential_and_ordered() {
        let mut server = mockito::Server::new_async().await;
        let first = server
            .mock("POST", "/api/embeddings")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({"prompt": "first"})))
            .with_status(200)
            .with_body(r#"{"embedding":[1.0]}"#)
            .create_async()
            .await;
        let second = server
            .mock("POST", "/api/embeddings")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({"prompt": "second"})))
            .with_status(200)
            .with_body(r#"{"embedding":[2.0]}"#)
            .create_async()
            .await;

        let embedder = OllamaEmbedder::new(&config(server.url(), 0), 1).unwrap();
        let vectors = embedder
            .embed_batch(&["first".to_string(), "second".to_string()])
            .await
            .unwrap();

        assert_eq!(vectors, vec![vec![1.0], vec![2.0]]);
        first.assert_async().await;
        second.assert_async().await;
    }

    #[tokio::test]
    async fn test_http_error_is_embedding_error() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/embeddings")
            .with_status(500)
            .expect(1)
            .create_async()
            .await;

        let embedder = OllamaEmbedder::new(&config(server.url(), 0), 3).unwrap();
        let err = embedder.embed("x").await.unwrap_err();

        assert!(matches!(err, Error::Embedding(_)));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_retries_before_giving_up() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/embeddings")
            .with_status(503)
            .expect(2)
            .create_async()
            .await;

        let embedder = OllamaEmbedder::new(&config(server.url(), 1), 3).unwrap();
        assert!(embedder.embed("x").await.is_err());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_health_check() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/tags")
            .with_status(200)
            .with_body(r#"{"models":[]}"#)
            .create_async()
            .await;

        let embedder = OllamaEmbedder::new(&config(server.url(), 0), 3).unwrap();
        assert!(embedder.health_check().await.unwrap());

        let unreachable = OllamaEmbedder::new(&config("http://127.0.0.1:1".to_string(), 0), 3).unwrap();
        assert!(!unreachable.health_check().await.unwrap());
    }
}
