//! # File Pipeline Orchestrator
//!
//! Orchestratore per singolo file: dall'evento "file pronto" fino a
//! upload, pulizia o quarantena.
//!
//! ## Stati:
//! ```text
//! Received -> Validated -> {Skipped | Optimizing} -> {UploadOriginal | UploadProcessed}
//!          -> {Succeeded | QuarantinedForRetry}
//! ```
//!
//! ## Regole:
//! - Validazione fallita (file sparito, directory): solo log, nessuna quarantena
//! - Estensione non gestita da nessun task: upload dell'originale così com'è
//! - Errore di ottimizzazione: copia dell'originale in quarantena, nessun upload
//! - Upload dell'artifact ottimizzato riuscito: l'originale viene sempre cancellato
//! - Upload dell'originale riuscito: cancellazione solo con `delete_on_upload`
//! - Upload fallito: copia in quarantena del file tentato, originale intatto
//!
//! `run()` non restituisce mai errori: ogni fallimento diventa un
//! `PipelineOutcome` dopo essere stato loggato.

use crate::error::PipelineError;
use crate::file_manager::FileManager;
use crate::optimizer::concurrency::ConcurrencyLimiter;
use crate::optimizer::executor::StepExecutor;
use crate::optimizer::task_processor::{ProcessingOutcome, TaskProcessor, UploadDecision};
use crate::recovery::RecoveryStore;
use crate::stats::PipelineStats;
use crate::tasks::TaskConfig;
use crate::uploader::AssetUploader;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Where a quarantined file failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureStage {
    Processing,
    Upload,
}

/// Terminal state of one pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// Gone or not a regular file when validated
    Rejected,
    Uploaded {
        artifact: UploadDecision,
        original_deleted: bool,
    },
    Quarantined {
        stage: FailureStage,
    },
}

/// Per-file orchestrator, shared by every event handler
pub struct FilePipeline {
    tasks: Arc<TaskConfig>,
    limiter: ConcurrencyLimiter,
    executor: Arc<dyn StepExecutor>,
    uploader: Arc<dyn AssetUploader>,
    recovery: RecoveryStore,
    delete_on_upload: bool,
    stats: Arc<PipelineStats>,
}

impl FilePipeline {
    pub fn new(
        tasks: Arc<TaskConfig>,
        limiter: ConcurrencyLimiter,
        executor: Arc<dyn StepExecutor>,
        uploader: Arc<dyn AssetUploader>,
        recovery: RecoveryStore,
    ) -> Self {
        Self {
            tasks,
            limiter,
            executor,
            uploader,
            recovery,
            delete_on_upload: false,
            stats: Arc::new(PipelineStats::new()),
        }
    }

    pub fn with_delete_on_upload(mut self, enabled: bool) -> Self {
        self.delete_on_upload = enabled;
        self
    }

    pub fn with_stats(mut self, stats: Arc<PipelineStats>) -> Self {
        self.stats = stats;
        self
    }

    pub fn stats(&self) -> &Arc<PipelineStats> {
        &self.stats
    }

    /// Handle one file-ready event
    pub async fn run(&self, path: &Path) -> PipelineOutcome {
        let span = info_span!("file", path = %path.display());
        self.run_stages(path).instrument(span).await
    }

    async fn run_stages(&self, path: &Path) -> PipelineOutcome {
        self.stats.add_received();

        let size = match FileManager::stat_regular_file(path).await {
            Ok(size) => size,
            Err(e) => {
                warn!("Skipping: {}", e);
                self.stats.add_rejected();
                return PipelineOutcome::Rejected;
            }
        };
        info!("Received ({})", FileManager::format_size(size));

        let claimed = FileManager::extension_of(path)
            .map(|ext| self.tasks.applies_to(&ext))
            .unwrap_or(false);
        if !claimed {
            debug!("No task for this extension, uploading as-is");
            return self.upload_original(path).await;
        }

        let mut processor =
            match TaskProcessor::open(path, self.limiter.clone(), self.executor.clone()).await {
                Ok(processor) => processor,
                Err(e) => {
                    warn!("Skipping: {}", e);
                    self.stats.add_rejected();
                    return PipelineOutcome::Rejected;
                }
            };

        let outcome = match processor.process(&self.tasks).await {
            Ok(outcome) => self.upload_best(path, &processor, &outcome).await,
            Err(e) => {
                error!("Optimization failed: {}", e);
                self.quarantine_original(path).await;
                PipelineOutcome::Quarantined {
                    stage: FailureStage::Processing,
                }
            }
        };

        processor.close().await;
        outcome
    }

    async fn upload_best(
        &self,
        path: &Path,
        processor: &TaskProcessor,
        outcome: &ProcessingOutcome,
    ) -> PipelineOutcome {
        if outcome.decision() == UploadDecision::Original {
            if outcome.processed_size() > 0 {
                info!(
                    "Optimized file not smaller ({} -> {}), keeping original",
                    FileManager::format_size(outcome.original_size),
                    FileManager::format_size(outcome.processed_size())
                );
            }
            return self.upload_original(path).await;
        }

        match processor.processed_file_path() {
            Ok(artifact) => self.upload_processed(path, artifact, outcome).await,
            Err(e) => {
                debug!("{}, falling back to original", e);
                self.upload_original(path).await
            }
        }
    }

    async fn upload_original(&self, path: &Path) -> PipelineOutcome {
        let filename = FileManager::base_name(path);
        match self.uploader.upload(path, &filename).await {
            Ok(()) => {
                self.stats.add_uploaded_original();
                let original_deleted = self.delete_on_upload && self.delete_original(path).await;
                PipelineOutcome::Uploaded {
                    artifact: UploadDecision::Original,
                    original_deleted,
                }
            }
            Err(e) => {
                log_upload_failure(&filename, &e);
                self.quarantine_original(path).await;
                PipelineOutcome::Quarantined {
                    stage: FailureStage::Upload,
                }
            }
        }
    }

    async fn upload_processed(
        &self,
        path: &Path,
        artifact: &Path,
        outcome: &ProcessingOutcome,
    ) -> PipelineOutcome {
        let filename = outcome
            .processed_filename()
            .map(str::to_string)
            .unwrap_or_else(|| FileManager::base_name(path));

        info!(
            "Optimized {} -> {} ({:.1}% smaller)",
            FileManager::format_size(outcome.original_size),
            FileManager::format_size(outcome.processed_size()),
            FileManager::calculate_reduction(outcome.original_size, outcome.processed_size())
        );

        match self.uploader.upload(artifact, &filename).await {
            Ok(()) => {
                self.stats
                    .add_uploaded_optimized(outcome.original_size, outcome.processed_size());
                let original_deleted = self.delete_original(path).await;
                PipelineOutcome::Uploaded {
                    artifact: UploadDecision::Processed,
                    original_deleted,
                }
            }
            Err(e) => {
                log_upload_failure(&filename, &e);
                match self.recovery.quarantine_artifact(artifact, path, &filename).await {
                    Ok(target) => {
                        self.stats.add_quarantined();
                        warn!("Optimized file saved to {}", target.display());
                    }
                    Err(e) => error!("{}", e),
                }
                PipelineOutcome::Quarantined {
                    stage: FailureStage::Upload,
                }
            }
        }
    }

    async fn quarantine_original(&self, path: &Path) {
        match self.recovery.quarantine(path).await {
            Ok(target) => {
                self.stats.add_quarantined();
                warn!("Original copied to {}", target.display());
            }
            Err(e) => error!("{}", e),
        }
    }

    async fn delete_original(&self, path: &Path) -> bool {
        match self.recovery.delete_from_watch(path).await {
            Ok(()) => {
                self.stats.add_deleted();
                info!("Removed original from watch folder");
                true
            }
            Err(e) => {
                warn!("Failed to remove original: {}", e);
                false
            }
        }
    }
}

fn log_upload_failure(filename: &str, e: &PipelineError) {
    match e.status() {
        Some(status) => error!("Upload of {} rejected with HTTP {}: {}", filename, status, e),
        None if e.is_upload() => error!("Upload of {} failed: {}", filename, e),
        None => error!("Could not upload {}: {}", filename, e),
    }
}
