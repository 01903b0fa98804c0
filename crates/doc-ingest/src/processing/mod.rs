//! Sequential ingestion runs and per-run error logging

mod error_tracker;
mod orchestrator;

pub use error_tracker::{ErrorRecord, ErrorSummary, ErrorTracker};
pub use orchestrator::{
    discover_files, ComponentHealth, FileReport, HealthReport, IngestionOrchestrator, RunSummary,
};
