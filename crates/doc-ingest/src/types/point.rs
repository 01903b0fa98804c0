//! Vector store records

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::document::Chunk;

/// Payload stored next to each vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointPayload {
    pub text: String,
    /// Path of the source file
    pub source: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub filename: String,
    pub file_type: String,
    pub file_size: u64,
}

/// A vector store record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// UUID string, fresh on every ingest
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: PointPayload,
}

impl Point {
    /// Build a point for a chunk with a newly generated id
    pub fn from_chunk(chunk: &Chunk, vector: Vec<f32>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            vector,
            payload: PointPayload {
                text: chunk.text.clone(),
                source: chunk.metadata.file_path.clone(),
                chunk_index: chunk.chunk_index,
                total_chunks: chunk.total_chunks,
                filename: chunk.metadata.filename.clone(),
                file_type: chunk.metadata.file_type.clone(),
                file_size: chunk.metadata.file_size,
            },
        }
    }
}

/// Similarity search hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredPoint {
    pub id: String,
    /// Cosine similarity, higher is closer
    pub score: f32,
    pub payload: Option<PointPayload>,
}
