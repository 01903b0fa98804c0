//! Qdrant vector store over the REST API

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::VectorStoreConfig;
use crate::error::{Error, Result};
use crate::types::{Point, PointPayload, ScoredPoint};

use super::{Distance, VectorStoreProvider};

/// Qdrant REST client
pub struct QdrantStore {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Deserialize)]
struct ListCollectionsResponse {
    result: CollectionsResult,
}

#[derive(Deserialize)]
struct CollectionsResult {
    collections: Vec<CollectionDescription>,
}

#[derive(Deserialize)]
struct CollectionDescription {
    name: String,
}

#[derive(Serialize)]
struct CreateCollectionRequest<'a> {
    vectors: VectorParams<'a>,
}

#[derive(Serialize)]
struct VectorParams<'a> {
    size: usize,
    distance: &'a str,
}

#[derive(Serialize)]
struct UpsertRequest<'a> {
    points: &'a [Point],
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    vector: &'a [f32],
    limit: usize,
    with_payload: bool,
}

#[derive(Deserialize)]
struct SearchResponse {
    result: Vec<SearchHit>,
}

#[derive(Deserialize)]
struct SearchHit {
    /// Qdrant ids are either unsigned integers or UUID strings
    id: serde_json::Value,
    score: f32,
    #[serde(default)]
    payload: Option<serde_json::Value>,
}

impl QdrantStore {
    pub fn new(config: &VectorStoreConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.client.request(method, format!("{}{}", self.base_url, path));
        match &self.api_key {
            Some(key) => builder.header("api-key", key),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder, action: &str) -> Result<Response> {
        let response = builder
            .send()
            .await
            .map_err(|e| Error::vector_store(format!("{} failed: {}", action, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::vector_store(format!(
                "{} failed: HTTP {} {}",
                action,
                status,
                body.trim()
            )));
        }
        Ok(response)
    }
}

#[async_trait]
impl VectorStoreProvider for QdrantStore {
    async fn list_collections(&self) -> Result<Vec<String>> {
        let response = self
            .send(self.request(Method::GET, "/collections"), "List collections")
            .await?;
        let body: ListCollectionsResponse = response
            .json()
            .await
            .map_err(|e| Error::vector_store(format!("Invalid collections response: {}", e)))?;

        Ok(body.result.collections.into_iter().map(|c| c.name).collect())
    }

    async fn create_collection(&self, name: &str, dimensions: usize, distance: Distance) -> Result<()> {
        let request = CreateCollectionRequest {
            vectors: VectorParams {
                size: dimensions,
                distance: distance.as_str(),
            },
        };
        self.send(
            self.request(Method::PUT, &format!("/collections/{}", name)).json(&request),
            "Create collection",
        )
        .await?;
        Ok(())
    }

    async fn upsert(&self, collection: &str, points: &[Point], wait: bool) -> Result<()> {
        let path = format!("/collections/{}/points?wait={}", collection, wait);
        self.send(
            self.request(Method::PUT, &path).json(&UpsertRequest { points }),
            "Upsert points",
        )
        .await?;
        Ok(())
    }

    async fn search(&self, collection: &str, vector: &[f32], limit: usize) -> Result<Vec<ScoredPoint>> {
        let request = SearchRequest {
            vector,
            limit,
            with_payload: true,
        };
        let response = self
            .send(
                self.request(Method::POST, &format!("/collections/{}/points/search", collection))
                    .json(&request),
                "Search",
            )
            .await?;
        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| Error::vector_store(format!("Invalid search response: {}", e)))?;

        Ok(body
            .result
            .into_iter()
            .map(|hit| ScoredPoint {
                id: match hit.id {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                },
                score: hit.score,
                // Points written by other tools may not carry our payload shape
                payload: hit
                    .payload
                    .and_then(|p| serde_json::from_value::<PointPayload>(p).ok()),
            })
            .collect())
    }

    async fn health_check(&self) -> Result<bool> {
        match self.request(Method::GET, "/collections").send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    fn name(&self) -> &str {
        "qdrant"
    }
}
