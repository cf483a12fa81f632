//! # Recovery Store Module
//!
//! Gestisce la directory di quarantena ("undone") per i file che non sono
//! arrivati sul server.
//!
//! ## Responsabilità:
//! - Copia (mai sposta) il file fallito sotto la radice di recovery,
//!   rispecchiando il path relativo alla directory osservata
//! - Sovrascrive una copia precedente allo stesso path, così un nuovo
//!   tentativo non lascia duplicati
//! - Cancella dalla directory osservata i file caricati con successo
//!
//! Nessuna operazione di questo modulo viene ritentata: un errore viene
//! restituito al chiamante che si limita a loggarlo.

use crate::error::PipelineError;
use crate::optimizer::path_resolver::PathResolver;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Quarantine root mirrored from the watch root
#[derive(Debug, Clone)]
pub struct RecoveryStore {
    watch_root: PathBuf,
    quarantine_root: PathBuf,
}

impl RecoveryStore {
    pub fn new(watch_root: impl Into<PathBuf>, quarantine_root: impl Into<PathBuf>) -> Self {
        Self {
            watch_root: watch_root.into(),
            quarantine_root: quarantine_root.into(),
        }
    }

    pub fn watch_root(&self) -> &Path {
        &self.watch_root
    }

    pub fn quarantine_root(&self) -> &Path {
        &self.quarantine_root
    }

    /// Copy a watch-tree file to its mirrored path under the quarantine root
    pub async fn quarantine(&self, file: &Path) -> Result<PathBuf, PipelineError> {
        let target = PathResolver::mirror_path(file, &self.watch_root, &self.quarantine_root);
        self.copy_into(file, target).await
    }

    /// Copy a processed artifact next to where its original would be mirrored
    pub async fn quarantine_artifact(
        &self,
        artifact: &Path,
        original: &Path,
        filename: &str,
    ) -> Result<PathBuf, PipelineError> {
        let target = PathResolver::mirror_with_name(
            original,
            &self.watch_root,
            &self.quarantine_root,
            filename,
        );
        self.copy_into(artifact, target).await
    }

    async fn copy_into(&self, source: &Path, target: PathBuf) -> Result<PathBuf, PipelineError> {
        let recovery_error = |reason: String| PipelineError::Recovery {
            path: source.to_path_buf(),
            reason,
        };

        PathResolver::ensure_parent_dirs(&target)
            .await
            .map_err(|e| recovery_error(e.to_string()))?;

        let bytes = fs::copy(source, &target)
            .await
            .map_err(|e| recovery_error(format!("copy to {} failed: {}", target.display(), e)))?;

        debug!("Copied {} to {} ({} bytes)", source.display(), target.display(), bytes);
        Ok(target)
    }

    /// Remove an uploaded file from the watch tree
    pub async fn delete_from_watch(&self, file: &Path) -> Result<(), PipelineError> {
        fs::remove_file(file).await?;
        debug!("Deleted {}", file.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> RecoveryStore {
        let watch = dir.path().join("watch");
        let undone = dir.path().join("undone");
        std::fs::create_dir_all(&watch).unwrap();
        RecoveryStore::new(watch, undone)
    }

    #[tokio::test]
    async fn test_quarantine_mirrors_relative_path() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let file = store.watch_root().join("2024/trip/c.png");
        std::fs::create_dir_all(file.parent().unwrap()).unwrap();
        std::fs::write(&file, b"png bytes").unwrap();

        let target = store.quarantine(&file).await.unwrap();
        assert_eq!(target, store.quarantine_root().join("2024/trip/c.png"));
        assert_eq!(std::fs::read(&target).unwrap(), b"png bytes");
        assert!(file.exists(), "original must be left in place");
    }

    #[tokio::test]
    async fn test_quarantine_overwrites_previous_copy() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let file = store.watch_root().join("c.png");
        std::fs::write(&file, b"first attempt, longer content").unwrap();
        store.quarantine(&file).await.unwrap();

        std::fs::write(&file, b"second").unwrap();
        let target = store.quarantine(&file).await.unwrap();
        assert_eq!(std::fs::read(target).unwrap(), b"second");
    }

    #[tokio::test]
    async fn test_quarantine_artifact_uses_given_name() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let original = store.watch_root().join("2024/d.heic");
        let artifact = dir.path().join("d.jxl");
        std::fs::write(&artifact, b"jxl").unwrap();

        let target = store
            .quarantine_artifact(&artifact, &original, "d.jxl")
            .await
            .unwrap();
        assert_eq!(target, store.quarantine_root().join("2024/d.jxl"));
        assert_eq!(std::fs::read(target).unwrap(), b"jxl");
    }

    #[tokio::test]
    async fn test_quarantine_missing_source_is_recovery_error() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let result = store.quarantine(&store.watch_root().join("gone.jpg")).await;
        assert!(matches!(result, Err(PipelineError::Recovery { .. })));
    }

    #[tokio::test]
    async fn test_delete_from_watch() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let file = store.watch_root().join("a.jpg");
        std::fs::write(&file, b"a").unwrap();

        store.delete_from_watch(&file).await.unwrap();
        assert!(!file.exists());
        assert!(store.delete_from_watch(&file).await.is_err());
    }
}
