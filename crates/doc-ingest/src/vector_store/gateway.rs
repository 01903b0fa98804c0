//! Collection management and batched writes on top of a provider

use std::sync::Arc;

use crate::config::VectorStoreConfig;
use crate::error::Result;
use crate::types::{Point, ScoredPoint};

use super::{Distance, QdrantStore, VectorStoreProvider};

/// Outcome of a batched upsert
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertReport {
    /// Points acknowledged by the store
    pub points: usize,
    /// Requests sent
    pub batches: usize,
}

/// Vector store access used by the pipeline
#[derive(Clone)]
pub struct VectorStoreGateway {
    provider: Arc<dyn VectorStoreProvider>,
}

impl VectorStoreGateway {
    pub fn new(provider: Arc<dyn VectorStoreProvider>) -> Self {
        Self { provider }
    }

    /// Gateway backed by the Qdrant instance in configuration
    pub fn from_config(config: &VectorStoreConfig) -> Result<Self> {
        Ok(Self::new(Arc::new(QdrantStore::new(config)?)))
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Create the collection with cosine distance unless it already exists
    ///
    /// Returns `true` when the collection was created by this call.
    pub async fn ensure_collection(&self, name: &str, dimensions: usize) -> Result<bool> {
        let existing = self.provider.list_collections().await?;
        if existing.iter().any(|c| c == name) {
            tracing::debug!("Collection '{}' already exists", name);
            return Ok(false);
        }

        self.provider
            .create_collection(name, dimensions, Distance::Cosine)
            .await?;
        tracing::info!("Created collection '{}' ({} dimensions, cosine)", name, dimensions);
        Ok(true)
    }

    /// Write points in sub-batches, waiting for each acknowledgment
    ///
    /// The first failing sub-batch aborts the remaining ones; points from
    /// earlier sub-batches stay written.
    pub async fn upsert_batch(
        &self,
        collection: &str,
        points: Vec<Point>,
        batch_size: usize,
    ) -> Result<UpsertReport> {
        let batch_size = batch_size.max(1);
        let total_batches = points.len().div_ceil(batch_size);
        let mut report = UpsertReport::default();
        let mut points = points.into_iter();

        loop {
            let batch: Vec<Point> = points.by_ref().take(batch_size).collect();
            if batch.is_empty() {
                break;
            }

            if let Err(e) = self.provider.upsert(collection, &batch, true).await {
                tracing::error!(
                    "Upsert batch {}/{} to '{}' failed: {}",
                    report.batches + 1,
                    total_batches,
                    collection,
                    e
                );
                return Err(e);
            }

            report.points += batch.len();
            report.batches += 1;
            tracing::debug!(
                "Upserted batch {}/{} ({} points)",
                report.batches,
                total_batches,
                batch.len()
            );
        }

        Ok(report)
    }

    pub async fn search(&self, collection: &str, vector: &[f32], limit: usize) -> Result<Vec<ScoredPoint>> {
        self.provider.search(collection, vector, limit).await
    }

    pub async fn health_check(&self) -> Result<bool> {
        self.provider.health_check().await
    }
}
