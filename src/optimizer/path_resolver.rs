//! # Path Resolution Module
//!
//! Centralizza il calcolo dei path "specchio": dato un file sotto la
//! directory osservata, trova il path corrispondente sotto un'altra radice
//! (la directory di recovery). Usato sia per l'originale che per l'artifact
//! ottimizzato che ha fallito l'upload.

use crate::file_manager::FileManager;
use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Utility per calcolare i path mirror in modo centralizzato
pub struct PathResolver;

impl PathResolver {
    /// Path of `file` relative to `root`
    ///
    /// Tries a plain prefix strip first, then the canonical forms (the watch
    /// root may be a symlink or relative). A file outside the root keeps only
    /// its base name.
    pub fn relative_to_root(file: &Path, root: &Path) -> PathBuf {
        if let Ok(rel) = file.strip_prefix(root) {
            return rel.to_path_buf();
        }

        if let (Ok(canonical_file), Ok(canonical_root)) = (file.canonicalize(), root.canonicalize()) {
            if let Ok(rel) = canonical_file.strip_prefix(&canonical_root) {
                debug!("[OK] Strip prefix on canonical path: {}", rel.display());
                return rel.to_path_buf();
            }
        }

        debug!(
            "[WARN] {} is outside {} - using base name",
            file.display(),
            root.display()
        );
        PathBuf::from(FileManager::base_name(file))
    }

    /// Same relative location as `file`, re-rooted under `target_root`
    pub fn mirror_path(file: &Path, watch_root: &Path, target_root: &Path) -> PathBuf {
        target_root.join(Self::relative_to_root(file, watch_root))
    }

    /// Mirror `original`'s directory under `target_root`, with a different file name
    pub fn mirror_with_name(
        original: &Path,
        watch_root: &Path,
        target_root: &Path,
        filename: &str,
    ) -> PathBuf {
        let mirrored = Self::mirror_path(original, watch_root, target_root);
        mirrored.with_file_name(filename)
    }

    /// Crea le directory parent se necessario
    pub async fn ensure_parent_dirs(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                anyhow::anyhow!(
                    "Failed to create parent directories for {}: {}",
                    path.display(),
                    e
                )
            })?;
        }
        Ok(())
    }
}
