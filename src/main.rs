//! # Immich Upload Optimizer - Main Entry Point
//!
//! Questo è il punto di ingresso principale dell'applicazione.
//!
//! ## Responsabilità:
//! - Parsing degli argomenti della command line con `clap` (anche da env `IUO_*`)
//! - Inizializzazione del sistema di logging con `tracing`
//! - Validazione della configurazione e creazione delle directory
//! - Costruzione della pipeline e avvio del watcher
//! - Gestione di SIGINT/SIGTERM con periodo di grazia
//!
//! ## Flusso di esecuzione:
//! 1. Parsa gli argomenti CLI
//! 2. Configura il logging (INFO o DEBUG a seconda del flag verbose, `RUST_LOG` se presente)
//! 3. Valida la configurazione e prepara watch/undone
//! 4. Carica i task e controlla che i tool esterni siano disponibili
//! 5. Avvia il watcher fino al segnale di shutdown
//!
//! ## Esempio di utilizzo:
//! ```bash
//! immich-optimizer --immich-url http://immich:2283 --immich-api-key $KEY \
//!     --watch-dir /watch --undone-dir /undone --tasks-file tasks.yaml
//! ```

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use immich_upload_optimizer::{
    ConcurrencyLimiter, Config, FilePipeline, FileWatcher, ImmichClient, PipelineStats,
    RecoveryStore, ShellExecutor, TaskConfig,
};

#[derive(Parser)]
#[command(name = "immich-optimizer")]
#[command(version)]
#[command(about = "Optimize media dropped in a folder and upload it to Immich")]
struct Args {
    /// Immich server base URL
    #[arg(long, env = "IUO_IMMICH_URL")]
    immich_url: String,

    /// Immich API key
    #[arg(long, env = "IUO_IMMICH_API_KEY", hide_env_values = true)]
    immich_api_key: String,

    /// Folder to watch for new files
    #[arg(long, env = "IUO_WATCH_DIR", default_value = "/watch")]
    watch_dir: PathBuf,

    /// Folder where failed files are copied
    #[arg(long, env = "IUO_UNDONE_DIR", default_value = "/undone")]
    undone_dir: PathBuf,

    /// YAML file with the optimization tasks
    #[arg(long, env = "IUO_TASKS_FILE", default_value = "tasks.yaml")]
    tasks_file: PathBuf,

    /// Delete files uploaded without optimization
    #[arg(long, env = "IUO_DELETE_ON_UPLOAD")]
    delete_on_upload: bool,

    /// Maximum number of optimization chains running at once
    #[arg(long, env = "IUO_MAX_CONCURRENT_TASKS", default_value = "10")]
    max_concurrent_tasks: usize,

    /// Upload timeout in seconds
    #[arg(long, env = "IUO_HTTP_TIMEOUT", default_value = "120")]
    http_timeout: u64,

    /// Seconds to wait for in-flight files on shutdown
    #[arg(long, env = "IUO_SHUTDOWN_GRACE", default_value = "10")]
    shutdown_grace: u64,

    /// Process files already in the watch folder at startup
    #[arg(long, env = "IUO_PROCESS_EXISTING")]
    process_existing: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = Config {
        immich_url: args.immich_url,
        immich_api_key: args.immich_api_key,
        watch_dir: args.watch_dir,
        undone_dir: args.undone_dir,
        tasks_file: args.tasks_file,
        delete_on_upload: args.delete_on_upload,
        max_concurrent_tasks: args.max_concurrent_tasks,
        http_timeout_secs: args.http_timeout,
        shutdown_grace_secs: args.shutdown_grace,
        process_existing: args.process_existing,
    };

    info!("🚀 immich-optimizer {}", env!("CARGO_PKG_VERSION"));
    config.validate()?;
    config.log_summary();
    config.prepare_directories().await?;

    let tasks = TaskConfig::load(&config.tasks_file).await?;
    if tasks.is_empty() {
        warn!("No tasks defined: every file will be uploaded as-is");
    } else {
        info!("Loaded {} tasks", tasks.tasks().len());
    }
    let missing = ShellExecutor::check_dependencies(&tasks);
    if !missing.is_empty() {
        warn!("Missing tools: {} (affected tasks will fail)", missing.join(", "));
    }

    let executor = Arc::new(ShellExecutor::new(tasks.config_dir()));
    let uploader = Arc::new(ImmichClient::new(
        &config.immich_url,
        &config.immich_api_key,
        config.http_timeout(),
    )?);
    info!("Uploading to {}", uploader.endpoint());
    let stats = Arc::new(PipelineStats::new());

    let pipeline = FilePipeline::new(
        Arc::new(tasks),
        ConcurrencyLimiter::new(config.max_concurrent_tasks),
        executor,
        uploader,
        RecoveryStore::new(&config.watch_dir, &config.undone_dir),
    )
    .with_delete_on_upload(config.delete_on_upload)
    .with_stats(stats.clone());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let watcher = FileWatcher::new(Arc::new(pipeline), &config.watch_dir, config.shutdown_grace())
        .with_process_existing(config.process_existing);
    let mut watcher_task = tokio::spawn(watcher.run(shutdown_rx));

    tokio::select! {
        joined = &mut watcher_task => {
            // the watcher only returns on its own when it failed to start
            joined??;
            return Ok(());
        }
        _ = shutdown_signal() => {
            info!("Shutdown requested");
        }
    }

    let _ = shutdown_tx.send(true);
    // drain inside the watcher is bounded by the grace period; this is the outer bound
    let outer = config.shutdown_grace() + std::time::Duration::from_secs(5);
    match tokio::time::timeout(outer, watcher_task).await {
        Ok(joined) => joined??,
        Err(_) => warn!("Watcher did not stop in time, exiting anyway"),
    }

    info!("📊 {}", stats.format_summary());
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
