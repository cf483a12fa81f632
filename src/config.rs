//! # Configuration Management Module
//!
//! Questo modulo gestisce la configurazione dell'applicazione.
//!
//! ## Responsabilità:
//! - Definisce la struct `Config` con tutti i parametri del servizio
//! - Fornisce validazione dei parametri prima dell'avvio
//! - Crea le directory osservata e di recovery se mancano
//! - Logga un riepilogo della configurazione senza esporre la API key
//!
//! ## Parametri di configurazione:
//! - `immich_url`: URL base del server Immich (http/https)
//! - `immich_api_key`: API key, almeno 10 caratteri
//! - `watch_dir`: directory osservata (default: `/watch`)
//! - `undone_dir`: directory di recovery (default: `/undone`)
//! - `tasks_file`: file YAML dei task (default: `tasks.yaml`)
//! - `delete_on_upload`: cancella gli originali caricati così come sono (default: false)
//! - `max_concurrent_tasks`: catene di ottimizzazione parallele (default: 10)
//! - `http_timeout_secs`: timeout dell'upload (default: 120)
//! - `shutdown_grace_secs`: attesa delle pipeline in corso allo shutdown (default: 10)
//! - `process_existing`: processa i file già presenti all'avvio (default: false)
//!
//! ## Esempio:
//! ```
//! use immich_upload_optimizer::Config;
//!
//! let config = Config {
//!     immich_url: "http://immich:2283".to_string(),
//!     immich_api_key: "0123456789abcdef".to_string(),
//!     ..Default::default()
//! };
//! assert!(config.validate().is_ok());
//! ```

use anyhow::{Context, Result};
use reqwest::Url;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

const MIN_API_KEY_LEN: usize = 10;

/// Runtime configuration, built from the command line
#[derive(Debug, Clone)]
pub struct Config {
    pub immich_url: String,
    pub immich_api_key: String,
    pub watch_dir: PathBuf,
    /// Recovery root for files that failed processing or upload
    pub undone_dir: PathBuf,
    pub tasks_file: PathBuf,
    /// Delete originals uploaded without optimization
    pub delete_on_upload: bool,
    pub max_concurrent_tasks: usize,
    pub http_timeout_secs: u64,
    pub shutdown_grace_secs: u64,
    /// Sweep the watch folder once at startup
    pub process_existing: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            immich_url: String::new(),
            immich_api_key: String::new(),
            watch_dir: PathBuf::from("/watch"),
            undone_dir: PathBuf::from("/undone"),
            tasks_file: PathBuf::from("tasks.yaml"),
            delete_on_upload: false,
            max_concurrent_tasks: 10,
            http_timeout_secs: 120,
            shutdown_grace_secs: 10,
            process_existing: false,
        }
    }
}

impl Config {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        let url = self.immich_url.trim();
        if url.is_empty() {
            return Err(anyhow::anyhow!("Immich URL is required"));
        }

        let parsed = Url::parse(url).with_context(|| format!("Invalid Immich URL: {}", url))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(anyhow::anyhow!(
                "Immich URL must use http or https, got '{}'",
                parsed.scheme()
            ));
        }
        if parsed.host_str().map_or(true, str::is_empty) {
            return Err(anyhow::anyhow!("Immich URL has no host: {}", url));
        }

        let key = self.immich_api_key.trim();
        if key.is_empty() {
            return Err(anyhow::anyhow!("Immich API key is required"));
        }
        if key.len() < MIN_API_KEY_LEN {
            return Err(anyhow::anyhow!(
                "Immich API key looks too short ({} characters, expected at least {})",
                key.len(),
                MIN_API_KEY_LEN
            ));
        }

        if self.tasks_file.as_os_str().is_empty() {
            return Err(anyhow::anyhow!("Tasks file path must not be empty"));
        }

        if self.max_concurrent_tasks == 0 {
            return Err(anyhow::anyhow!("Max concurrent tasks must be greater than 0"));
        }

        if self.http_timeout_secs == 0 {
            return Err(anyhow::anyhow!("HTTP timeout must be greater than 0"));
        }

        Ok(())
    }

    /// Create the watch and recovery roots if they are missing
    pub async fn prepare_directories(&self) -> Result<()> {
        for dir in [&self.watch_dir, &self.undone_dir] {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("Failed to create directory {}", dir.display()))?;
            if !dir.is_dir() {
                return Err(anyhow::anyhow!("Not a directory: {}", dir.display()));
            }
        }
        Ok(())
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    /// API key with all but the last four characters masked
    pub fn redacted_api_key(&self) -> String {
        let key = self.immich_api_key.trim();
        let visible = key.len().saturating_sub(4);
        match key.get(visible..) {
            Some(tail) if visible > 0 => format!("{}{}", "*".repeat(visible), tail),
            _ => "*".repeat(key.len()),
        }
    }

    pub fn log_summary(&self) {
        info!("Configuration:");
        info!("  • Immich URL: {}", self.immich_url);
        info!("  • API key: {}", self.redacted_api_key());
        info!("  • Watch folder: {}", self.watch_dir.display());
        info!("  • Undone folder: {}", self.undone_dir.display());
        info!("  • Tasks file: {}", self.tasks_file.display());
        info!("  • Delete on upload: {}", self.delete_on_upload);
        info!("  • Max concurrent tasks: {}", self.max_concurrent_tasks);
        info!("  • HTTP timeout: {}s", self.http_timeout_secs);
    }
}
