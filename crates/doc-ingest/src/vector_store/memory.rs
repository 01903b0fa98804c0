//! In-process vector store with brute-force search

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::types::{Point, ScoredPoint};

use super::{Distance, VectorStoreProvider};

struct Collection {
    dimensions: usize,
    distance: Distance,
    points: Vec<Point>,
}

/// Vector store kept in memory; used for dry runs and tests
#[derive(Default)]
pub struct InMemoryVectorStore {
    collections: RwLock<HashMap<String, Collection>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of points stored in a collection (0 if it does not exist)
    pub fn point_count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .get(collection)
            .map(|c| c.points.len())
            .unwrap_or(0)
    }

    /// Snapshot of the points in a collection, in insertion order
    pub fn points(&self, collection: &str) -> Vec<Point> {
        self.collections
            .read()
            .get(collection)
            .map(|c| c.points.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl VectorStoreProvider for InMemoryVectorStore {
    async fn list_collections(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.collections.read().keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn create_collection(&self, name: &str, dimensions: usize, distance: Distance) -> Result<()> {
        let mut collections = self.collections.write();
        if collections.contains_key(name) {
            return Err(Error::vector_store(format!("Collection '{}' already exists", name)));
        }
        collections.insert(
            name.to_string(),
            Collection {
                dimensions,
                distance,
                points: Vec::new(),
            },
        );
        Ok(())
    }

    async fn upsert(&self, collection: &str, points: &[Point], _wait: bool) -> Result<()> {
        let mut collections = self.collections.write();
        let target = collections
            .get_mut(collection)
            .ok_or_else(|| Error::vector_store(format!("Collection '{}' not found", collection)))?;

        if let Some(bad) = points.iter().find(|p| p.vector.len() != target.dimensions) {
            return Err(Error::vector_store(format!(
                "Wrong vector dimension for point {}: expected {}, got {}",
                bad.id,
                target.dimensions,
                bad.vector.len()
            )));
        }

        for point in points {
            match target.points.iter_mut().find(|p| p.id == point.id) {
                Some(existing) => *existing = point.clone(),
                None => target.points.push(point.clone()),
            }
        }
        Ok(())
    }

    async fn search(&self, collection: &str, vector: &[f32], limit: usize) -> Result<Vec<ScoredPoint>> {
        let collections = self.collections.read();
        let target = collections
            .get(collection)
            .ok_or_else(|| Error::vector_store(format!("Collection '{}' not found", collection)))?;

        let mut hits: Vec<ScoredPoint> = target
            .points
            .iter()
            .map(|p| ScoredPoint {
                id: p.id.clone(),
                score: score(target.distance, vector, &p.vector),
                payload: Some(p.payload.clone()),
            })
            .collect();

        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    fn name(&self) -> &str {
        "memory"
    }
}

/// Higher is closer for every metric
fn score(distance: Distance, a: &[f32], b: &[f32]) -> f32 {
    match distance {
        Distance::Cosine => cosine_similarity(a, b),
        Distance::Dot => a.iter().zip(b).map(|(x, y)| x * y).sum(),
        Distance::Euclid => -a
            .iter()
            .zip(b)
            .map(|(x, y)| (x - y) * (x - y))
            .sum::<f32>()
            .sqrt(),
    }
}

/// Compute cosine similarity between two embeddings
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}
