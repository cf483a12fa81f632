//! # Folder Watcher Module
//!
//! Sorgente degli eventi "file pronto" e scheduling delle pipeline.
//!
//! ## Responsabilità:
//! - Registra un watcher `notify` ricorsivo sulla directory osservata
//! - Considera pronto un file alla chiusura dopo scrittura o quando viene
//!   spostato dentro l'albero (le directory spostate vengono espanse)
//! - Ignora i file nascosti, usati dai tool di copia per i file parziali
//! - Lancia ogni pipeline su un proprio task tokio
//! - Allo shutdown smette di accettare eventi, attende le pipeline in corso
//!   per il periodo di grazia e poi le interrompe
//!
//! Il callback di `notify` gira su un thread proprio: passa i path al loop
//! async tramite un canale `mpsc`.

use crate::file_manager::FileManager;
use crate::optimizer::pipeline::{FilePipeline, PipelineOutcome};
use anyhow::{Context, Result};
use notify::event::{AccessKind, AccessMode, ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

const EVENT_QUEUE: usize = 1024;

/// Paths in a filesystem event that are ready to be processed
pub fn ready_paths(event: &Event) -> Vec<PathBuf> {
    // `Name(Both)` repeats a `Name(To)` already delivered
    let ready = matches!(
        event.kind,
        EventKind::Access(AccessKind::Close(AccessMode::Write))
            | EventKind::Modify(ModifyKind::Name(RenameMode::To))
    );
    if !ready {
        return Vec::new();
    }

    event
        .paths
        .iter()
        .filter(|path| !FileManager::is_hidden(path))
        .cloned()
        .collect()
}

fn create_file_watcher(fs_tx: mpsc::Sender<PathBuf>) -> Result<RecommendedWatcher> {
    let watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| match res {
        Ok(event) => {
            for path in ready_paths(&event) {
                if fs_tx.blocking_send(path).is_err() {
                    return;
                }
            }
        }
        Err(e) => warn!("File watcher error: {}", e),
    })
    .context("Failed to create file watcher")?;
    Ok(watcher)
}

/// Turns filesystem events into pipeline runs
pub struct FileWatcher {
    pipeline: Arc<FilePipeline>,
    watch_root: PathBuf,
    grace: Duration,
    process_existing: bool,
}

impl FileWatcher {
    pub fn new(pipeline: Arc<FilePipeline>, watch_root: impl Into<PathBuf>, grace: Duration) -> Self {
        Self {
            pipeline,
            watch_root: watch_root.into(),
            grace,
            process_existing: false,
        }
    }

    pub fn with_process_existing(mut self, enabled: bool) -> Self {
        self.process_existing = enabled;
        self
    }

    /// Watch until `shutdown_rx` flips to true (or its sender goes away)
    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) -> Result<()> {
        let (fs_tx, mut fs_rx) = mpsc::channel::<PathBuf>(EVENT_QUEUE);
        let mut watcher = create_file_watcher(fs_tx)?;
        watcher
            .watch(&self.watch_root, RecursiveMode::Recursive)
            .with_context(|| format!("Failed to watch {}", self.watch_root.display()))?;
        info!("👀 Watching {}", self.watch_root.display());

        let mut in_flight: JoinSet<PipelineOutcome> = JoinSet::new();

        if self.process_existing {
            let existing = FileManager::find_files(&self.watch_root);
            info!("Found {} existing files", existing.len());
            for path in existing {
                self.spawn_run(&mut in_flight, path);
            }
        }

        loop {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("Watcher shutting down");
                        break;
                    }
                }

                Some(path) = fs_rx.recv() => {
                    for ready in Self::expand(path) {
                        self.spawn_run(&mut in_flight, ready);
                    }
                }

                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    log_join(joined);
                }
            }
        }

        // stop producing events before draining
        drop(watcher);
        self.drain(in_flight).await;
        Ok(())
    }

    fn expand(path: PathBuf) -> Vec<PathBuf> {
        if path.is_dir() {
            debug!("Directory moved in: {}", path.display());
            FileManager::find_files(&path)
        } else {
            vec![path]
        }
    }

    fn spawn_run(&self, in_flight: &mut JoinSet<PipelineOutcome>, path: PathBuf) {
        debug!("Ready: {}", path.display());
        let pipeline = self.pipeline.clone();
        in_flight.spawn(async move { pipeline.run(&path).await });
    }

    async fn drain(&self, mut in_flight: JoinSet<PipelineOutcome>) {
        if in_flight.is_empty() {
            return;
        }

        info!(
            "Waiting up to {:?} for {} in-flight files",
            self.grace,
            in_flight.len()
        );
        let finished = tokio::time::timeout(self.grace, async {
            while let Some(joined) = in_flight.join_next().await {
                log_join(joined);
            }
        })
        .await
        .is_ok();

        if !finished {
            warn!(
                "Grace period expired, aborting {} in-flight files",
                in_flight.len()
            );
            in_flight.shutdown().await;
        }
    }
}

fn log_join(joined: Result<PipelineOutcome, JoinError>) {
    match joined {
        Ok(outcome) => debug!("Finished: {:?}", outcome),
        Err(e) if e.is_panic() => error!("Pipeline run panicked: {}", e),
        Err(e) => debug!("Pipeline run cancelled: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizer::concurrency::ConcurrencyLimiter;
    use crate::optimizer::test_support::{scripted_tasks, RecordingUploader, ScriptedExecutor};
    use crate::recovery::RecoveryStore;
    use notify::event::CreateKind;
    use tempfile::TempDir;

    fn event(kind: EventKind, paths: &[&str]) -> Event {
        paths
            .iter()
            .fold(Event::new(kind), |event, path| event.add_path(PathBuf::from(path)))
    }

    #[test]
    fn test_ready_on_close_write_and_move_in() {
        let close = event(
            EventKind::Access(AccessKind::Close(AccessMode::Write)),
            &["/watch/a.jpg"],
        );
        assert_eq!(ready_paths(&close), vec![PathBuf::from("/watch/a.jpg")]);

        let moved = event(
            EventKind::Modify(ModifyKind::Name(RenameMode::To)),
            &["/watch/b.mov"],
        );
        assert_eq!(ready_paths(&moved), vec![PathBuf::from("/watch/b.mov")]);
    }

    #[test]
    fn test_not_ready_events() {
        let created = event(EventKind::Create(CreateKind::File), &["/watch/a.jpg"]);
        assert!(ready_paths(&created).is_empty());

        let moved_out = event(
            EventKind::Modify(ModifyKind::Name(RenameMode::From)),
            &["/watch/a.jpg"],
        );
        assert!(ready_paths(&moved_out).is_empty());

        let renamed = event(
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            &["/watch/.c.png.part", "/watch/c.png"],
        );
        assert!(ready_paths(&renamed).is_empty());

        let hidden = event(
            EventKind::Access(AccessKind::Close(AccessMode::Write)),
            &["/watch/.a.jpg.tmp"],
        );
        assert!(ready_paths(&hidden).is_empty());
    }

    struct Fixture {
        _dir: TempDir,
        watch: PathBuf,
        uploader: Arc<RecordingUploader>,
        pipeline: Arc<FilePipeline>,
    }

    fn fixture(steps: &'static [&'static str]) -> Fixture {
        let dir = TempDir::new().unwrap();
        let watch = dir.path().join("watch");
        std::fs::create_dir_all(&watch).unwrap();

        let uploader = Arc::new(RecordingUploader::default());
        let pipeline = FilePipeline::new(
            Arc::new(scripted_tasks(&[("slow", &["mov"], steps)])),
            ConcurrencyLimiter::new(2),
            Arc::new(ScriptedExecutor::default()),
            uploader.clone(),
            RecoveryStore::new(&watch, dir.path().join("undone")),
        );

        Fixture {
            _dir: dir,
            watch,
            uploader,
            pipeline: Arc::new(pipeline),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_startup_sweep_and_shutdown() {
        let f = fixture(&["noop"]);
        std::fs::create_dir_all(f.watch.join("2024")).unwrap();
        std::fs::write(f.watch.join("2024/a.jpg"), b"a").unwrap();
        std::fs::write(f.watch.join(".hidden.jpg"), b"h").unwrap();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let watcher = FileWatcher::new(f.pipeline.clone(), &f.watch, Duration::from_secs(5))
            .with_process_existing(true);
        let handle = tokio::spawn(watcher.run(shutdown_rx));

        tokio::time::sleep(Duration::from_millis(300)).await;
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap().unwrap();

        let uploads = f.uploader.uploads();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].filename, "a.jpg");
    }

    #[cfg(target_os = "linux")]
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_new_file_is_uploaded() {
        let f = fixture(&["noop"]);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let watcher = FileWatcher::new(f.pipeline.clone(), &f.watch, Duration::from_secs(5));
        let handle = tokio::spawn(watcher.run(shutdown_rx));

        tokio::time::sleep(Duration::from_millis(300)).await;
        std::fs::write(f.watch.join("a.jpg"), b"fresh").unwrap();

        let mut waited = Duration::ZERO;
        while f.uploader.uploads().is_empty() && waited < Duration::from_secs(10) {
            tokio::time::sleep(Duration::from_millis(50)).await;
            waited += Duration::from_millis(50);
        }

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap().unwrap();
        let uploads = f.uploader.uploads();
        assert!(!uploads.is_empty());
        assert_eq!(uploads[0].bytes, b"fresh");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_grace_period_aborts_stuck_runs() {
        let f = fixture(&["sleep:30000"]);
        std::fs::write(f.watch.join("stuck.mov"), b"m").unwrap();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let watcher = FileWatcher::new(f.pipeline.clone(), &f.watch, Duration::from_millis(200))
            .with_process_existing(true);
        let handle = tokio::spawn(watcher.run(shutdown_rx));

        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown_tx.send(true).unwrap();

        let result = tokio::time::timeout(Duration::from_secs(5), handle).await;
        assert!(result.is_ok(), "watcher must exit after the grace period");
        assert!(f.uploader.uploads().is_empty());
        assert!(f.watch.join("stuck.mov").exists());
    }

    #[tokio::test]
    async fn test_missing_root_fails_to_start() {
        let f = fixture(&["noop"]);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let watcher = FileWatcher::new(f.pipeline.clone(), f.watch.join("missing"), Duration::from_secs(1));
        assert!(watcher.run(shutdown_rx).await.is_err());
    }
}
