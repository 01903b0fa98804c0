//! Core types for the ingestion pipeline

pub mod document;
pub mod point;

pub use document::{Chunk, ChunkMetadata, FileType, SourceFile};
pub use point::{Point, PointPayload, ScoredPoint};
