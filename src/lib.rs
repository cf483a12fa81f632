//! # Immich Upload Optimizer Library
//!
//! Questo è il modulo principale della libreria che espone tutte le API pubbliche.
//!
//! ## Responsabilità:
//! - Definisce la struttura modulare dell'applicazione
//! - Espone i tipi e le funzioni principali tramite re-exports
//! - Fornisce un'interfaccia pulita per il main.rs e per i test
//!
//! ## Architettura dei moduli:
//! - `config`: Gestione configurazione e validazione parametri
//! - `error`: Tipi di errore della pipeline per singolo file
//! - `tasks`: Caricamento dei task YAML e routing per estensione
//! - `file_manager`: Operazioni sui file e discovery
//! - `platform`: Shell, quoting e ricerca dei tool nel `PATH`
//! - `optimizer`: Pipeline per file, task processor, pool di concorrenza
//! - `uploader`: Client HTTP verso Immich
//! - `recovery`: Directory di quarantena per i file falliti
//! - `watcher`: Eventi del filesystem e shutdown
//! - `stats`: Contatori riassunti allo shutdown
//!
//! ## Utilizzo:
//! ```ignore
//! use immich_upload_optimizer::{FilePipeline, FileWatcher};
//!
//! let pipeline = Arc::new(FilePipeline::new(tasks, limiter, executor, uploader, recovery));
//! FileWatcher::new(pipeline, &config.watch_dir, config.shutdown_grace())
//!     .run(shutdown_rx)
//!     .await?;
//! ```

pub mod config;
pub mod error;
pub mod file_manager;
pub mod optimizer;
pub mod platform;
pub mod recovery;
pub mod stats;
pub mod tasks;
pub mod uploader;
pub mod watcher;

pub use config::Config;
pub use error::PipelineError;
pub use optimizer::{
    ConcurrencyLimiter, FilePipeline, PipelineOutcome, ShellExecutor, StepExecutor, TaskProcessor,
};
pub use recovery::RecoveryStore;
pub use stats::PipelineStats;
pub use tasks::{Task, TaskConfig};
pub use uploader::{AssetUploader, ImmichClient};
pub use watcher::FileWatcher;
