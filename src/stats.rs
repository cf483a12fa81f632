//! # Pipeline Statistics Module
//!
//! Contatori condivisi da tutte le pipeline in esecuzione.
//!
//! ## Statistiche tracciate:
//! - **files_received**: eventi che hanno avviato una pipeline
//! - **files_rejected**: file spariti o non regolari alla validazione
//! - **uploaded_original**: upload del file così com'era
//! - **uploaded_optimized**: upload dell'artifact ottimizzato
//! - **quarantined**: file copiati nella directory di recovery
//! - **originals_deleted**: originali rimossi dalla directory osservata
//! - **bytes_saved** / **bytes_before**: risparmio sugli upload ottimizzati
//!
//! Il riepilogo viene loggato allo shutdown con `format_summary()`.

use crate::file_manager::FileManager;
use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free counters updated by every pipeline run
#[derive(Debug, Default)]
pub struct PipelineStats {
    files_received: AtomicU64,
    files_rejected: AtomicU64,
    uploaded_original: AtomicU64,
    uploaded_optimized: AtomicU64,
    quarantined: AtomicU64,
    originals_deleted: AtomicU64,
    bytes_before: AtomicU64,
    bytes_saved: AtomicU64,
}

/// Point-in-time copy of the counters
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub files_received: u64,
    pub files_rejected: u64,
    pub uploaded_original: u64,
    pub uploaded_optimized: u64,
    pub quarantined: u64,
    pub originals_deleted: u64,
    pub bytes_before: u64,
    pub bytes_saved: u64,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_received(&self) {
        self.files_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_rejected(&self) {
        self.files_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_uploaded_original(&self) {
        self.uploaded_original.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_uploaded_optimized(&self, original_size: u64, new_size: u64) {
        self.uploaded_optimized.fetch_add(1, Ordering::Relaxed);
        self.bytes_before.fetch_add(original_size, Ordering::Relaxed);
        self.bytes_saved
            .fetch_add(original_size.saturating_sub(new_size), Ordering::Relaxed);
    }

    pub fn add_quarantined(&self) {
        self.quarantined.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_deleted(&self) {
        self.originals_deleted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            files_received: self.files_received.load(Ordering::Relaxed),
            files_rejected: self.files_rejected.load(Ordering::Relaxed),
            uploaded_original: self.uploaded_original.load(Ordering::Relaxed),
            uploaded_optimized: self.uploaded_optimized.load(Ordering::Relaxed),
            quarantined: self.quarantined.load(Ordering::Relaxed),
            originals_deleted: self.originals_deleted.load(Ordering::Relaxed),
            bytes_before: self.bytes_before.load(Ordering::Relaxed),
            bytes_saved: self.bytes_saved.load(Ordering::Relaxed),
        }
    }

    pub fn format_summary(&self) -> String {
        self.snapshot().format_summary()
    }
}

impl StatsSnapshot {
    pub fn reduction_percent(&self) -> f64 {
        if self.bytes_before == 0 {
            0.0
        } else {
            (self.bytes_saved as f64 / self.bytes_before as f64) * 100.0
        }
    }

    pub fn format_summary(&self) -> String {
        format!(
            "Received: {} | Rejected: {} | Uploaded: {} original, {} optimized | Quarantined: {} | Deleted: {} | Saved: {} ({:.2}%)",
            self.files_received,
            self.files_rejected,
            self.uploaded_original,
            self.uploaded_optimized,
            self.quarantined,
            self.originals_deleted,
            FileManager::format_size(self.bytes_saved),
            self.reduction_percent()
        )
    }
}
