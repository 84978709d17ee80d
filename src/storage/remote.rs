use crate::error::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub local_path: PathBuf,
    /// Logical `/`-separated folder path, e.g. `backups/sqlserver/2025/08`.
    pub remote_folder: String,
    pub remote_file_name: String,
    pub content_type: Option<String>,
    pub overwrite: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadResult {
    pub success: bool,
    pub remote_id: Option<String>,
    pub remote_url: Option<String>,
    pub message: String,
}

impl UploadResult {
    pub fn uploaded(remote_id: String, remote_url: Option<String>) -> Self {
        Self {
            success: true,
            remote_id: Some(remote_id),
            remote_url,
            message: "Uploaded".to_string(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            remote_id: None,
            remote_url: None,
            message: message.into(),
        }
    }
}

/// Provider-agnostic capability set of a remote object store with folders.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Never returns `Err`: expected and infrastructure failures alike come back
    /// as an unsuccessful [`UploadResult`].
    async fn upload(&self, request: &UploadRequest, cancel: &CancellationToken) -> UploadResult;

    /// Resolves (creating where allowed) a logical folder path to a provider id.
    async fn ensure_folder(&self, logical_path: &str, cancel: &CancellationToken) -> Result<String>;

    /// Missing objects are not an error.
    async fn delete(&self, id_or_path: &str, cancel: &CancellationToken) -> Result<()>;

    /// Shareable link for the object, granting public read access if needed.
    async fn get_public_url(&self, id_or_path: &str, cancel: &CancellationToken) -> Option<String>;

    fn name(&self) -> &'static str;
}
