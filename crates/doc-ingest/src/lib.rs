//! doc-ingest: document ingestion pipeline for semantic search
//!
//! Walks a directory of PDF, Word, PowerPoint, text and image files, extracts
//! their text (with OCR for scans), splits it into sentence-aware chunks,
//! embeds each chunk and writes the vectors with source metadata to a Qdrant
//! collection. Failed files are recorded in a per-run NDJSON error log.

pub mod config;
pub mod embeddings;
pub mod error;
pub mod ingestion;
pub mod processing;
pub mod types;
pub mod vector_store;

pub use config::IngestConfig;
pub use error::{Error, ErrorCategory, Result};
pub use processing::{IngestionOrchestrator, RunSummary};
pub use types::{Chunk, FileType, Point, SourceFile};
