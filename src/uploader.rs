//! # Upload Gateway Module
//!
//! Client HTTP verso l'endpoint asset di Immich.
//!
//! ## Responsabilità:
//! - Costruisce una singola richiesta multipart per file (`assetData` + metadati)
//! - Autentica con l'header `x-api-key`
//! - Considera successo solo HTTP 200/201
//! - Applica il timeout configurato all'intera richiesta
//!
//! Nessun retry: un tentativo per chiamata. In caso di errore decide
//! l'orchestratore cosa fare (oggi: quarantena).

use crate::error::PipelineError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::multipart::{Form, Part};
use reqwest::{Body, StatusCode};
use serde::Deserialize;
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

/// Fixed device identifier sent with every asset
pub const DEVICE_ID: &str = "immich-optimizer";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// Sends one local file to the remote asset store
#[async_trait]
pub trait AssetUploader: Send + Sync {
    async fn upload(&self, path: &Path, filename: &str) -> Result<(), PipelineError>;
}

/// Metadata fields that accompany the file part
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetMetadata {
    pub device_asset_id: String,
    pub file_created_at: String,
    pub file_modified_at: String,
}

impl AssetMetadata {
    /// Derive the metadata from the upload name and the file's mtime
    pub fn new(filename: &str, modified: SystemTime) -> Self {
        let unix_secs = match modified.duration_since(UNIX_EPOCH) {
            Ok(d) => d.as_secs() as i64,
            Err(e) => -(e.duration().as_secs() as i64),
        };
        let timestamp = DateTime::<Utc>::from(modified)
            .format(TIMESTAMP_FORMAT)
            .to_string();

        Self {
            device_asset_id: format!("{}-{}", filename, unix_secs),
            file_created_at: timestamp.clone(),
            file_modified_at: timestamp,
        }
    }
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    id: Option<String>,
    status: Option<String>,
}

/// Immich `/api/assets` client
#[derive(Debug, Clone)]
pub struct ImmichClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl ImmichClient {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {}", e))?;

        Ok(Self {
            client,
            endpoint: format!("{}/api/assets", base_url.trim_end_matches('/')),
            api_key: api_key.trim().to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl AssetUploader for ImmichClient {
    async fn upload(&self, path: &Path, filename: &str) -> Result<(), PipelineError> {
        let unreadable = |source| PipelineError::FileUnreadable {
            path: path.to_path_buf(),
            source,
        };
        let file = tokio::fs::File::open(path).await.map_err(unreadable)?;
        let file_metadata = file.metadata().await.map_err(unreadable)?;
        let modified = file_metadata.modified().map_err(unreadable)?;
        let size = file_metadata.len();
        let metadata = AssetMetadata::new(filename, modified);

        // streamed from disk; the known length keeps the request non-chunked
        let part = Part::stream_with_length(Body::from(file), size)
            .file_name(filename.to_string())
            .mime_str("application/octet-stream")?;
        let form = Form::new()
            .text("deviceAssetId", metadata.device_asset_id)
            .text("deviceId", DEVICE_ID)
            .text("fileCreatedAt", metadata.file_created_at)
            .text("fileModifiedAt", metadata.file_modified_at)
            .part("assetData", part);

        debug!("POST {} ({} bytes as {})", self.endpoint, size, filename);
        let response = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("Accept", "application/json")
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if status != StatusCode::OK && status != StatusCode::CREATED {
            return Err(PipelineError::UploadRejected {
                status: status.as_u16(),
                body: body.trim().to_string(),
            });
        }

        match serde_json::from_str::<UploadResponse>(&body) {
            Ok(UploadResponse { id, status: Some(asset_status) }) if asset_status == "duplicate" => {
                info!("{} already on server (asset {})", filename, id.unwrap_or_default())
            }
            Ok(UploadResponse { id, .. }) => {
                info!("Uploaded {} (asset {})", filename, id.unwrap_or_default())
            }
            Err(_) => info!("Uploaded {} ({})", filename, status),
        }
        Ok(())
    }
}
