//! Test doubles shared by the optimizer tests.
//!
//! `ScriptedExecutor` understands a tiny command language instead of running
//! a shell:
//! - `noop`: leave the work directory alone
//! - `write:N`: overwrite the working copy with N bytes
//! - `convert:EXT:N`: replace the working copy with `{stem}.EXT` of N bytes
//! - `delete`: remove the working copy
//! - `extra`: add a sidecar file next to the working copy
//! - `sleep:MS`: wait, to make overlapping chains observable
//! - `fail`: step failure
//! - `panic`: panic inside the step

use crate::error::PipelineError;
use crate::optimizer::executor::{StepContext, StepExecutor};
use crate::tasks::{Task, TaskConfig, TaskStep};
use crate::uploader::AssetUploader;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

pub fn scripted_tasks(defs: &[(&str, &[&str], &[&str])]) -> TaskConfig {
    let tasks = defs
        .iter()
        .map(|(name, extensions, steps)| Task {
            name: name.to_string(),
            extensions: extensions.iter().map(|e| e.to_string()).collect(),
            steps: steps
                .iter()
                .map(|command| TaskStep {
                    command: command.to_string(),
                })
                .collect(),
        })
        .collect();
    TaskConfig::new(tasks, PathBuf::from("."))
}

#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    calls: AtomicUsize,
    running: AtomicUsize,
    peak: AtomicUsize,
    work_dirs: Mutex<Vec<PathBuf>>,
}

impl ScriptedExecutor {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Work directory of every step executed so far
    pub fn work_dirs(&self) -> Vec<PathBuf> {
        self.work_dirs.lock().unwrap().clone()
    }

    async fn run(&self, step: &TaskStep, ctx: &StepContext) -> Result<(), PipelineError> {
        let parts: Vec<&str> = step.command.split(':').collect();
        match parts.as_slice() {
            ["noop"] => {}
            ["write", size] => {
                tokio::fs::write(ctx.working_file(), vec![7u8; size.parse().unwrap()]).await?;
            }
            ["convert", ext, size] => {
                tokio::fs::remove_file(ctx.working_file()).await?;
                let target = ctx.work_dir.join(format!("{}.{}", ctx.stem, ext));
                tokio::fs::write(target, vec![9u8; size.parse().unwrap()]).await?;
            }
            ["delete"] => tokio::fs::remove_file(ctx.working_file()).await?,
            ["extra"] => tokio::fs::write(ctx.work_dir.join("sidecar.xmp"), b"xmp").await?,
            ["panic"] => panic!("scripted panic in task '{}'", ctx.task),
            ["sleep", ms] => tokio::time::sleep(Duration::from_millis(ms.parse().unwrap())).await,
            _ => {
                return Err(PipelineError::Processing {
                    task: ctx.task.clone(),
                    step: ctx.index,
                    reason: format!("scripted failure: {}", step.command),
                })
            }
        }
        Ok(())
    }
}

#[async_trait]
impl StepExecutor for ScriptedExecutor {
    async fn execute(&self, step: &TaskStep, ctx: &StepContext) -> Result<(), PipelineError> {
        self.work_dirs.lock().unwrap().push(ctx.work_dir.clone());
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let result = self.run(step, ctx).await;
        self.running.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRecord {
    pub path: PathBuf,
    pub filename: String,
    pub bytes: Vec<u8>,
    pub modified: SystemTime,
}

/// Records every upload; answers with `fail_status` when set
#[derive(Debug, Default)]
pub struct RecordingUploader {
    fail_status: Option<u16>,
    uploads: Mutex<Vec<UploadRecord>>,
}

impl RecordingUploader {
    pub fn failing(status: u16) -> Self {
        Self {
            fail_status: Some(status),
            ..Self::default()
        }
    }

    pub fn uploads(&self) -> Vec<UploadRecord> {
        self.uploads.lock().unwrap().clone()
    }
}

#[async_trait]
impl AssetUploader for RecordingUploader {
    async fn upload(&self, path: &Path, filename: &str) -> Result<(), PipelineError> {
        let bytes = tokio::fs::read(path).await?;
        let modified = tokio::fs::metadata(path).await?.modified()?;
        self.uploads.lock().unwrap().push(UploadRecord {
            path: path.to_path_buf(),
            filename: filename.to_string(),
            bytes,
            modified,
        });
        match self.fail_status {
            Some(status) => Err(PipelineError::UploadRejected {
                status,
                body: "server error".to_string(),
            }),
            None => Ok(()),
        }
    }
}
