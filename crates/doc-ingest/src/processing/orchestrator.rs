//! Ingestion run: discover, preflight, then extract, chunk, embed and store
//! each file in turn

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use walkdir::WalkDir;

use crate::config::IngestConfig;
use crate::embeddings::EmbeddingGenerator;
use crate::error::{Error, Result};
use crate::ingestion::{TextChunker, TextExtractor};
use crate::types::{FileType, Point, SourceFile};
use crate::vector_store::VectorStoreGateway;

use super::error_tracker::{ErrorRecord, ErrorTracker};

/// Result of ingesting one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileReport {
    pub path: PathBuf,
    pub file_type: FileType,
    pub chunks: usize,
    pub batches: usize,
}

/// Outcome of a directory run
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub discovered: usize,
    pub successful: usize,
    pub failed: usize,
    /// Set when at least one file failed
    pub error_log: Option<PathBuf>,
    pub errors: Vec<ErrorRecord>,
    /// Fatal error that stopped the run before every file was attempted
    pub aborted: Option<String>,
    pub elapsed: Duration,
}

impl RunSummary {
    /// Percentage of discovered files ingested successfully
    pub fn success_rate(&self) -> f64 {
        if self.discovered == 0 {
            0.0
        } else {
            self.successful as f64 / self.discovered as f64 * 100.0
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Processing complete in {:.1}s", self.elapsed.as_secs_f64())?;
        writeln!(f, "  Discovered:   {}", self.discovered)?;
        writeln!(f, "  Successful:   {}", self.successful)?;
        writeln!(f, "  Failed:       {}", self.failed)?;
        write!(f, "  Success rate: {:.1}%", self.success_rate())?;
        if let Some(reason) = &self.aborted {
            write!(f, "\n  Aborted:      {}", reason)?;
        }
        if let Some(path) = &self.error_log {
            write!(f, "\n  Error log:    {}", path.display())?;
        }
        Ok(())
    }
}

/// Health of one collaborator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentHealth {
    pub name: String,
    pub healthy: bool,
    pub detail: Option<String>,
}

/// Health of the vector store and the embedding model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthReport {
    pub vector_store: ComponentHealth,
    pub embeddings: ComponentHealth,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.vector_store.healthy && self.embeddings.healthy
    }
}

/// Drives a sequential ingestion run
pub struct IngestionOrchestrator {
    config: IngestConfig,
    extractor: Arc<TextExtractor>,
    chunker: TextChunker,
    embeddings: EmbeddingGenerator,
    store: VectorStoreGateway,
}

impl IngestionOrchestrator {
    /// Orchestrator wired to the configured Qdrant instance and embedding backend
    pub fn new(config: IngestConfig) -> Result<Self> {
        config.validate()?;
        let store = VectorStoreGateway::from_config(&config.vector_store)?;
        let embeddings = EmbeddingGenerator::new(&config);
        Ok(Self::with_components(config, embeddings, store))
    }

    /// Orchestrator with caller-supplied collaborators
    pub fn with_components(
        config: IngestConfig,
        embeddings: EmbeddingGenerator,
        store: VectorStoreGateway,
    ) -> Self {
        let chunker = TextChunker::new(config.chunking.chunk_size, config.chunking.chunk_overlap);
        tracing::info!(
            "Pipeline configured: chunk size {}, overlap {} (chunks do not overlap), upsert batch {}",
            chunker.chunk_size(),
            chunker.overlap(),
            config.vector_store.upsert_batch_size
        );

        Self {
            extractor: Arc::new(TextExtractor::new(config.ocr.clone())),
            chunker,
            embeddings,
            store,
            config,
        }
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Supported files under the configured input directory
    pub fn discover(&self) -> Result<Vec<SourceFile>> {
        discover_files(&self.config.paths.input_dir)
    }

    /// Verify the vector store and the embedding model before touching files
    pub async fn preflight(&self) -> Result<()> {
        match self.store.health_check().await {
            Ok(true) => {}
            Ok(false) => {
                return Err(Error::Preflight(format!(
                    "vector store '{}' at {} is not reachable",
                    self.store.provider_name(),
                    self.config.vector_store.url
                )))
            }
            Err(e) => return Err(Error::Preflight(format!("vector store: {}", e))),
        }

        self.embeddings
            .self_test()
            .await
            .map_err(|e| Error::Preflight(format!("embedding self-test: {}", e)))?;

        tracing::info!("Preflight checks passed");
        Ok(())
    }

    /// Extract, chunk, embed and store one file
    pub async fn process_file(&self, file: &SourceFile) -> Result<FileReport> {
        let name = file.display_path();

        let extractor = Arc::clone(&self.extractor);
        let source = file.clone();
        let text = tokio::task::spawn_blocking(move || extractor.extract(&source))
            .await
            .map_err(|e| Error::internal(format!("Extraction task failed: {}", e)))??;

        let chunks = self.chunker.chunk_source(file, &text);
        drop(text);
        if chunks.is_empty() {
            return Err(Error::extraction(&name, "No content extracted"));
        }
        tracing::info!("[{}] {} chunks", name, chunks.len());

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embeddings.embed_texts(&texts).await?;

        let points: Vec<Point> = chunks
            .iter()
            .zip(vectors)
            .map(|(chunk, vector)| Point::from_chunk(chunk, vector))
            .collect();

        let upsert = self
            .store
            .upsert_batch(
                &self.config.vector_store.collection,
                points,
                self.config.vector_store.upsert_batch_size,
            )
            .await?;

        Ok(FileReport {
            path: file.path.clone(),
            file_type: file.file_type,
            chunks: chunks.len(),
            batches: upsert.batches,
        })
    }

    /// Ingest every supported file in the input directory
    pub async fn run(&self) -> Result<RunSummary> {
        let started = Instant::now();

        let files = self.discover()?;
        tracing::info!(
            "Found {} files in {}",
            files.len(),
            self.config.paths.input_dir.display()
        );

        self.preflight().await?;
        self.store
            .ensure_collection(&self.config.vector_store.collection, self.embeddings.dimensions())
            .await?;

        let mut tracker = ErrorTracker::new(&self.config.paths.error_dir)?;
        let mut successful = 0;
        let mut aborted = None;

        for (i, file) in files.iter().enumerate() {
            tracing::info!("[{}/{}] Processing {}", i + 1, files.len(), file.display_path());

            match self.process_file(file).await {
                Ok(report) => {
                    successful += 1;
                    tracing::info!(
                        "[{}] Stored {} chunks in {} batches",
                        file.display_path(),
                        report.chunks,
                        report.batches
                    );
                    if self.config.paths.move_processed {
                        self.move_to_processed(file);
                    }
                }
                Err(e) => {
                    if let Err(log_err) =
                        tracker.log_error(file.display_path(), e.category(), e.to_string())
                    {
                        tracing::warn!("Could not write error log: {}", log_err);
                    }
                    if e.is_fatal() {
                        tracing::error!("Aborting run: {}", e);
                        aborted = Some(e.to_string());
                        break;
                    }
                }
            }
        }

        let errors = tracker.get_summary();
        let summary = RunSummary {
            discovered: files.len(),
            successful,
            failed: errors.total_errors,
            error_log: (errors.total_errors > 0).then_some(errors.error_log),
            errors: errors.errors,
            aborted,
            elapsed: started.elapsed(),
        };

        tracing::info!(
            "Run finished: {}/{} files ingested ({:.1}%)",
            summary.successful,
            summary.discovered,
            summary.success_rate()
        );
        Ok(summary)
    }

    /// Ingest one file; nothing is logged to the error file and nothing is moved
    pub async fn process_single_file(&self, path: impl AsRef<Path>) -> Result<FileReport> {
        let file = SourceFile::from_path(path.as_ref())?;
        self.store
            .ensure_collection(&self.config.vector_store.collection, self.embeddings.dimensions())
            .await?;
        self.process_file(&file).await
    }

    /// Check both collaborators without processing anything
    pub async fn health(&self) -> HealthReport {
        let vector_store = match self.store.health_check().await {
            Ok(healthy) => ComponentHealth {
                name: self.store.provider_name().to_string(),
                healthy,
                detail: (!healthy).then(|| format!("{} not reachable", self.config.vector_store.url)),
            },
            Err(e) => ComponentHealth {
                name: self.store.provider_name().to_string(),
                healthy: false,
                detail: Some(e.to_string()),
            },
        };

        let self_test = self.embeddings.self_test().await;
        let embeddings = ComponentHealth {
            name: self
                .embeddings
                .provider_name()
                .unwrap_or_else(|| format!("{:?}", self.config.embeddings.provider).to_lowercase()),
            healthy: self_test.is_ok(),
            detail: match self_test {
                Ok(()) => Some(format!("{} dimensions", self.embeddings.dimensions())),
                Err(e) => Some(e.to_string()),
            },
        };

        HealthReport {
            vector_store,
            embeddings,
        }
    }

    fn move_to_processed(&self, file: &SourceFile) {
        let destination = processed_destination(
            &self.config.paths.input_dir,
            &self.config.paths.processed_dir,
            &file.path,
        );

        let result = destination
            .parent()
            .map_or(Ok(()), std::fs::create_dir_all)
            .and_then(|_| {
                std::fs::rename(&file.path, &destination).or_else(|_| {
                    // rename fails across filesystems
                    std::fs::copy(&file.path, &destination)?;
                    std::fs::remove_file(&file.path)
                })
            });

        match result {
            Ok(()) => tracing::debug!("Moved {} to {}", file.display_path(), destination.display()),
            Err(e) => tracing::warn!("Could not move {} to processed: {}", file.display_path(), e),
        }
    }
}

/// Where a processed file goes: its path relative to the input directory,
/// under the processed directory, renamed `<stem>_<n>.<ext>` if taken
fn processed_destination(input_dir: &Path, processed_dir: &Path, path: &Path) -> PathBuf {
    let relative = path
        .strip_prefix(input_dir)
        .ok()
        .filter(|r| !r.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .or_else(|| path.file_name().map(PathBuf::from))
        .unwrap_or_default();
    let destination = processed_dir.join(relative);
    if !destination.exists() {
        return destination;
    }

    let stem = destination
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let extension = destination
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    let mut n = 1;
    loop {
        let candidate = destination.with_file_name(format!("{}_{}{}", stem, n, extension));
        if !candidate.exists() {
            tracing::warn!(
                "{} already exists, storing as {}",
                destination.display(),
                candidate.display()
            );
            return candidate;
        }
        n += 1;
    }
}

/// Walk a directory recursively and keep supported files, sorted by path
pub fn discover_files(input_dir: &Path) -> Result<Vec<SourceFile>> {
    if !input_dir.is_dir() {
        return Err(Error::config(format!(
            "Input directory does not exist: {}",
            input_dir.display()
        )));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(input_dir).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("Skipping unreadable entry: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_file() || FileType::from_path(entry.path()).is_none() {
            continue;
        }
        match SourceFile::from_path(entry.path()) {
            Ok(file) => files.push(file),
            Err(e) => tracing::warn!("Skipping {}: {}", entry.path().display(), e),
        }
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(files)
}
