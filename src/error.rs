//! # Error Types Module
//!
//! Questo modulo definisce i tipi di errore della pipeline di ingestione.
//!
//! ## Responsabilità:
//! - Definisce `PipelineError` per categorizzare tutti i fallimenti per-file
//! - Distingue gli errori che portano in quarantena da quelli che fermano solo il file
//! - Integra con `thiserror` per conversioni automatiche da `std::io::Error` e `reqwest::Error`
//!
//! ## Categorie di errori:
//! - `FileUnreadable` / `NotAFile`: stat/open fallito, nessuna quarantena
//! - `Processing`: uno step di un task è fallito, l'originale va in quarantena
//! - `NoProcessedFile`: nessun artifact ottimizzato, si ricade sull'originale
//! - `UploadRejected` / `UploadTransport`: upload fallito, quarantena dell'artifact tentato
//! - `Recovery`: la copia in quarantena stessa è fallita (solo log)
//!
//! Gli errori di startup (config, tasks file, directory) usano `anyhow`.

use std::path::PathBuf;

/// Failures of a single file's trip through the pipeline
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("Unable to read {path}: {source}")]
    FileUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Not a regular file: {0}")]
    NotAFile(PathBuf),

    #[error("Task '{task}' failed at step {step}: {reason}")]
    Processing {
        task: String,
        step: usize,
        reason: String,
    },

    #[error("No processed file available")]
    NoProcessedFile,

    #[error("Upload failed with status {status}: {body}")]
    UploadRejected { status: u16, body: String },

    #[error("Upload request failed: {0}")]
    UploadTransport(#[from] reqwest::Error),

    #[error("Unable to copy {path} to recovery directory: {reason}")]
    Recovery { path: PathBuf, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Whether the error came from the remote endpoint or the transport to it
    pub fn is_upload(&self) -> bool {
        matches!(
            self,
            PipelineError::UploadRejected { .. } | PipelineError::UploadTransport(_)
        )
    }

    /// HTTP status carried by the error, when the server answered at all
    pub fn status(&self) -> Option<u16> {
        match self {
            PipelineError::UploadRejected { status, .. } => Some(*status),
            PipelineError::UploadTransport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
