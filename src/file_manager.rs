//! # File Management Module
//!
//! Questo modulo raccoglie le operazioni sui file usate dalla pipeline.
//!
//! ## Responsabilità:
//! - Validazione dei file in arrivo (esistenza, file regolare, dimensione)
//! - Normalizzazione delle estensioni (minuscolo, senza punto iniziale)
//! - Discovery ricorsiva dei file già presenti nella directory osservata
//! - Formattazione human-readable delle dimensioni
//!
//! ## Esempio:
//! ```
//! use immich_upload_optimizer::file_manager::FileManager;
//! use std::path::Path;
//!
//! assert_eq!(FileManager::extension_of(Path::new("IMG_1.HEIC")), Some("heic".to_string()));
//! assert!(FileManager::is_hidden(Path::new(".IMG_1.HEIC.part")));
//! assert_eq!(FileManager::format_size(2048), "2.00 KB");
//! ```

use crate::error::PipelineError;
use std::path::{Path, PathBuf};
use tokio::fs;
use walkdir::WalkDir;

/// Manages file operations and discovery
pub struct FileManager;

impl FileManager {
    /// Stat a path and make sure it is a regular file; returns its size
    pub async fn stat_regular_file(path: &Path) -> Result<u64, PipelineError> {
        let metadata = fs::metadata(path)
            .await
            .map_err(|source| PipelineError::FileUnreadable {
                path: path.to_path_buf(),
                source,
            })?;

        if !metadata.is_file() {
            return Err(PipelineError::NotAFile(path.to_path_buf()));
        }

        Ok(metadata.len())
    }

    /// Lowercase an extension and drop any leading dot
    pub fn normalize_extension(extension: &str) -> String {
        extension.trim().trim_start_matches('.').to_lowercase()
    }

    /// Normalized extension of a path, if it has one
    pub fn extension_of(path: &Path) -> Option<String> {
        path.extension()
            .map(|ext| Self::normalize_extension(&ext.to_string_lossy()))
            .filter(|ext| !ext.is_empty())
    }

    /// File name of a path as an owned string
    pub fn base_name(path: &Path) -> String {
        path.file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Dot-files are staging names used by copy tools (rsync, browsers, ...)
    pub fn is_hidden(path: &Path) -> bool {
        path.file_name()
            .map(|name| name.to_string_lossy().starts_with('.'))
            .unwrap_or(false)
    }

    /// Find every visible regular file below a directory
    pub fn find_files(dir: &Path) -> Vec<PathBuf> {
        WalkDir::new(dir)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !Self::is_hidden(e.path()))
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .collect()
    }

    /// Get human-readable file size
    pub fn format_size(size: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = size as f64;
        let mut unit_index = 0;

        while size >= 1024.0 && unit_index < UNITS.len() - 1 {
            size /= 1024.0;
            unit_index += 1;
        }

        if unit_index == 0 {
            format!("{} {}", size as u64, UNITS[unit_index])
        } else {
            format!("{:.2} {}", size, UNITS[unit_index])
        }
    }

    /// Calculate percentage reduction
    pub fn calculate_reduction(original_size: u64, new_size: u64) -> f64 {
        if original_size == 0 {
            0.0
        } else {
            ((original_size as f64 - new_size as f64) / original_size as f64) * 100.0
        }
    }
}
