//! Vector store providers and the gateway used by the pipeline

mod gateway;
mod memory;
mod qdrant;

pub use gateway::{UpsertReport, VectorStoreGateway};
pub use memory::InMemoryVectorStore;
pub use qdrant::QdrantStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{Point, ScoredPoint};

/// Similarity metric of a collection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Distance {
    #[default]
    Cosine,
    Dot,
    Euclid,
}

impl Distance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cosine => "Cosine",
            Self::Dot => "Dot",
            Self::Euclid => "Euclid",
        }
    }
}

/// Trait for vector storage and similarity search
///
/// Implementations:
/// - `QdrantStore`: Qdrant over its REST API
/// - `InMemoryVectorStore`: brute-force cosine search for dry runs and tests
#[async_trait]
pub trait VectorStoreProvider: Send + Sync {
    /// Names of existing collections
    async fn list_collections(&self) -> Result<Vec<String>>;

    /// Create a collection; fails if it already exists
    async fn create_collection(&self, name: &str, dimensions: usize, distance: Distance) -> Result<()>;

    /// Insert or replace points; with `wait` the call returns after the write is applied
    async fn upsert(&self, collection: &str, points: &[Point], wait: bool) -> Result<()>;

    /// Nearest points to a query vector, best first
    async fn search(&self, collection: &str, vector: &[f32], limit: usize) -> Result<Vec<ScoredPoint>>;

    /// Check if the store is reachable
    async fn health_check(&self) -> Result<bool>;

    /// Provider name for logging
    fn name(&self) -> &str;
}
