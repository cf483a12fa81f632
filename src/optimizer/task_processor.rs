//! # Task Processor Module
//!
//! Worker che applica la catena di step di un task a un singolo file.
//!
//! ## Ciclo di vita:
//! 1. `open()`: apre il file sorgente e ne registra la dimensione
//! 2. `process()`: sceglie il task, acquisisce un permesso dal pool, copia il
//!    file in una directory temporanea ed esegue gli step in ordine
//! 3. `outcome()` / `processed_file_path()`: il chiamante decide cosa caricare
//! 4. `close()`: rilascia handle e directory temporanea
//!
//! Il permesso viene rilasciato alla fine della catena, sia in caso di
//! successo che di errore. La directory temporanea appartiene al processor:
//! se `close()` non viene chiamato (panic, task abortito) ci pensa il `Drop`
//! di `TempDir`.

use crate::error::PipelineError;
use crate::file_manager::FileManager;
use crate::optimizer::concurrency::ConcurrencyLimiter;
use crate::optimizer::executor::{StepContext, StepExecutor};
use crate::tasks::{Task, TaskConfig};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tempfile::TempDir;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// What the chain left behind, if anything
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessedArtifact {
    None,
    File {
        path: PathBuf,
        size: u64,
        /// Set only when the chain renamed the file (e.g. heic -> jxl)
        filename: Option<String>,
    },
}

/// Which file the orchestrator should send to the server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadDecision {
    Original,
    Processed,
}

/// Size-compared result of one processing run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessingOutcome {
    pub original_size: u64,
    pub artifact: ProcessedArtifact,
}

impl ProcessingOutcome {
    pub fn processed_size(&self) -> u64 {
        match &self.artifact {
            ProcessedArtifact::File { size, .. } => *size,
            ProcessedArtifact::None => 0,
        }
    }

    pub fn processed_filename(&self) -> Option<&str> {
        match &self.artifact {
            ProcessedArtifact::File { filename, .. } => filename.as_deref(),
            ProcessedArtifact::None => None,
        }
    }

    /// Processed wins only if it exists, is non-empty and strictly smaller
    pub fn decision(&self) -> UploadDecision {
        match &self.artifact {
            ProcessedArtifact::File { size, .. } if *size > 0 && *size < self.original_size => {
                UploadDecision::Processed
            }
            _ => UploadDecision::Original,
        }
    }
}

/// Runs the applicable task chain for one file
pub struct TaskProcessor {
    source_path: PathBuf,
    source: Option<File>,
    original_size: u64,
    modified: SystemTime,
    limiter: ConcurrencyLimiter,
    executor: Arc<dyn StepExecutor>,
    work_dir: Option<TempDir>,
    artifact: ProcessedArtifact,
}

impl TaskProcessor {
    /// Open the source file and record its size and mtime
    pub async fn open(
        path: &Path,
        limiter: ConcurrencyLimiter,
        executor: Arc<dyn StepExecutor>,
    ) -> Result<Self, PipelineError> {
        let unreadable = |source| PipelineError::FileUnreadable {
            path: path.to_path_buf(),
            source,
        };
        let source = File::open(path).await.map_err(unreadable)?;
        let metadata = source.metadata().await.map_err(unreadable)?;
        if !metadata.is_file() {
            return Err(PipelineError::NotAFile(path.to_path_buf()));
        }
        let modified = metadata.modified().map_err(unreadable)?;

        Ok(Self {
            source_path: path.to_path_buf(),
            source: Some(source),
            original_size: metadata.len(),
            modified,
            limiter,
            executor,
            work_dir: None,
            artifact: ProcessedArtifact::None,
        })
    }

    /// Run the chain selected for this file's extension
    ///
    /// A file no task claims, or a chain that leaves nothing behind, is a
    /// successful run without artifact. Any failing step aborts the chain.
    /// Artifact paths stay valid until `close()`.
    pub async fn process(&mut self, tasks: &TaskConfig) -> Result<ProcessingOutcome, PipelineError> {
        if self.work_dir.is_some() {
            return Ok(self.outcome());
        }

        let task = match FileManager::extension_of(&self.source_path)
            .and_then(|ext| tasks.select(&ext))
        {
            Some(task) => task,
            None => {
                debug!("No task for {}", self.source_path.display());
                return Ok(self.outcome());
            }
        };

        let _permit = self.limiter.acquire().await.map_err(|_| PipelineError::Processing {
            task: task.name.clone(),
            step: 0,
            reason: "optimization pool closed".to_string(),
        })?;

        info!("Running task '{}' ({} steps)", task.name, task.steps.len());
        let work_dir = tempfile::Builder::new()
            .prefix("immich-optimizer-")
            .tempdir()?;
        let work_path = work_dir.path().to_path_buf();
        self.work_dir = Some(work_dir);

        let file_name = FileManager::base_name(&self.source_path);
        self.copy_source_to(&work_path.join(&file_name)).await?;

        let stem = self
            .source_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let extension = self
            .source_path
            .extension()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        for (position, step) in task.steps.iter().enumerate() {
            let ctx = StepContext {
                task: task.name.clone(),
                index: position + 1,
                work_dir: work_path.clone(),
                stem: stem.clone(),
                extension: extension.clone(),
            };
            self.executor.execute(step, &ctx).await?;
        }

        self.artifact = Self::collect_artifact(task, &work_path, &file_name).await?;
        if let ProcessedArtifact::File { path, .. } = &self.artifact {
            Self::stamp_modified(path, self.modified).await?;
        }
        Ok(self.outcome())
    }

    async fn copy_source_to(&mut self, dest_path: &Path) -> Result<(), PipelineError> {
        let source = match self.source.as_mut() {
            Some(source) => source,
            None => {
                return Err(PipelineError::FileUnreadable {
                    path: self.source_path.clone(),
                    source: std::io::Error::other("source handle already closed"),
                })
            }
        };
        let mut dest = File::create(dest_path).await?;
        tokio::io::copy(source, &mut dest).await?;
        dest.flush().await?;
        Ok(())
    }

    /// Inspect the work directory once the chain is done
    async fn collect_artifact(
        task: &Task,
        work_dir: &Path,
        original_name: &str,
    ) -> Result<ProcessedArtifact, PipelineError> {
        let mut files = Vec::new();
        let mut entries = fs::read_dir(work_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                files.push(entry.path());
            }
        }

        match files.as_slice() {
            [] => {
                debug!("Task '{}' produced no file", task.name);
                Ok(ProcessedArtifact::None)
            }
            [path] => {
                let size = fs::metadata(path).await?.len();
                let name = FileManager::base_name(path);
                let filename = (name != original_name).then_some(name);
                Ok(ProcessedArtifact::File {
                    path: path.clone(),
                    size,
                    filename,
                })
            }
            many => Err(PipelineError::Processing {
                task: task.name.clone(),
                step: task.steps.len(),
                reason: format!("chain left {} files in the work directory", many.len()),
            }),
        }
    }

    /// Give the artifact the source's mtime, which the upload metadata is derived from
    async fn stamp_modified(path: &Path, modified: SystemTime) -> Result<(), PipelineError> {
        let file = fs::OpenOptions::new().write(true).open(path).await?;
        let file = file.into_std().await;
        tokio::task::spawn_blocking(move || file.set_modified(modified))
            .await
            .map_err(std::io::Error::other)??;
        Ok(())
    }

    pub fn outcome(&self) -> ProcessingOutcome {
        ProcessingOutcome {
            original_size: self.original_size,
            artifact: self.artifact.clone(),
        }
    }

    pub fn processed_file_path(&self) -> Result<&Path, PipelineError> {
        match &self.artifact {
            ProcessedArtifact::File { path, .. } => Ok(path),
            ProcessedArtifact::None => Err(PipelineError::NoProcessedFile),
        }
    }

    /// Release the source handle and delete the work directory
    pub async fn close(mut self) {
        self.source.take();
        if let Some(work_dir) = self.work_dir.take() {
            let path = work_dir.path().to_path_buf();
            match tokio::task::spawn_blocking(move || work_dir.close()).await {
                Ok(Ok(())) => debug!("Removed work directory {}", path.display()),
                Ok(Err(e)) => warn!("Failed to remove work directory {}: {}", path.display(), e),
                Err(e) => warn!("Work directory cleanup task failed: {}", e),
            }
        }
    }
}
