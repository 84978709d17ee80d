use super::compression::Compressor;
use super::executor::BackupExecutor;
use crate::config::{CloudProvider, DatabaseConnection, DatabaseProvider};
use crate::error::{BackupError, Result};
use crate::storage::{RemoteStore, StoreSelector, UploadRequest, UploadResult};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const ARCHIVE_CONTENT_TYPE: &str = "application/zip";

#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutcome {
    pub database: String,
    pub local_backup: PathBuf,
    pub local_zip: PathBuf,
    pub checksum: Option<String>,
    pub backup_created_at: DateTime<Utc>,
    pub upload: UploadResult,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectionReport {
    pub connection_name: String,
    pub success: bool,
    pub remote_url: Option<String>,
    pub error: Option<String>,
    pub duration_secs: u64,
}

/// Summary of one pass over the configured connections.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: bool,
    pub connections: Vec<ConnectionReport>,
}

impl RunReport {
    fn record(&mut self, report: ConnectionReport) {
        self.attempted += 1;
        if report.success {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
        self.connections.push(report);
    }
}

/// Backup, compress and upload, one connection at a time.
pub struct Pipeline {
    executor: Arc<dyn BackupExecutor>,
    compressor: Arc<dyn Compressor>,
    stores: StoreSelector,
    provider: CloudProvider,
    remote_folder_prefix: String,
}

impl Pipeline {
    pub fn new(
        executor: Arc<dyn BackupExecutor>,
        compressor: Arc<dyn Compressor>,
        stores: StoreSelector,
        provider: CloudProvider,
        remote_folder_prefix: String,
    ) -> Self {
        Self {
            executor,
            compressor,
            stores,
            provider,
            remote_folder_prefix,
        }
    }

    /// Store for the configured provider.
    pub fn store(&self) -> Result<Arc<dyn RemoteStore>> {
        self.stores.select(self.provider)
    }

    /// Runs all three steps for one connection. Backup and compression
    /// failures are returned; upload failures live in the outcome.
    pub async fn run_one(
        &self,
        connection: &DatabaseConnection,
        cancel: &CancellationToken,
    ) -> Result<PipelineOutcome> {
        let artifact = self.executor.backup(connection, cancel).await?;
        if !artifact.success {
            return Err(BackupError::ExternalTool(format!(
                "Backup file not created: {}",
                artifact.file_path.display()
            )));
        }

        let local_zip = self
            .compressor
            .compress(&artifact.file_path, None, None, cancel)
            .await?;
        info!(
            database = %connection.name,
            "Compression completed. Compressed file: {}",
            local_zip.display()
        );

        let store = self.store()?;
        let remote_file_name = local_zip
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let request = UploadRequest {
            local_path: local_zip.clone(),
            remote_folder: remote_folder(&self.remote_folder_prefix, connection.provider, Utc::now()),
            remote_file_name,
            content_type: Some(ARCHIVE_CONTENT_TYPE.to_string()),
            overwrite: true,
        };

        let mut upload = store.upload(&request, cancel).await;
        if !upload.success && cancel.is_cancelled() {
            return Err(BackupError::Cancelled);
        }

        if upload.success && upload.remote_url.is_none() {
            if let Some(id) = upload.remote_id.as_deref() {
                upload.remote_url = store.get_public_url(id, cancel).await;
            }
        }

        if upload.success {
            info!(
                database = %connection.name,
                "Uploaded to {} as {} ({})",
                store.name(),
                upload.remote_id.as_deref().unwrap_or_default(),
                upload.remote_url.as_deref().unwrap_or("no link")
            );
        } else {
            error!(
                database = %connection.name,
                "Upload to {} failed: {}",
                store.name(),
                upload.message
            );
        }

        Ok(PipelineOutcome {
            database: connection.name.clone(),
            local_backup: artifact.file_path,
            local_zip,
            checksum: artifact.checksum,
            backup_created_at: artifact.created_at,
            upload,
        })
    }

    /// Attempts every connection in order; a failing connection never stops
    /// the run, only cancellation does.
    pub async fn run_all(&self, connections: &[DatabaseConnection], cancel: &CancellationToken) -> RunReport {
        info!("Backup pipeline started at {} for {} connection(s)", Utc::now(), connections.len());
        let mut report = RunReport::default();

        for connection in connections {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            info!(database = %connection.name, "Starting backup for database");
            let started = Instant::now();

            match self.run_one(connection, cancel).await {
                Ok(outcome) => report.record(ConnectionReport {
                    connection_name: connection.name.clone(),
                    success: outcome.upload.success,
                    remote_url: outcome.upload.remote_url.clone(),
                    error: (!outcome.upload.success).then(|| outcome.upload.message.clone()),
                    duration_secs: started.elapsed().as_secs(),
                }),
                Err(e) if e.is_cancelled() => {
                    warn!(database = %connection.name, "Pipeline cancelled");
                    report.cancelled = true;
                    break;
                }
                Err(e) => {
                    error!(
                        database = %connection.name,
                        "An error occurred while processing database: {}",
                        e
                    );
                    report.record(ConnectionReport {
                        connection_name: connection.name.clone(),
                        success: false,
                        remote_url: None,
                        error: Some(e.to_string()),
                        duration_secs: started.elapsed().as_secs(),
                    });
                }
            }
        }

        info!(
            "Backup pipeline finished at {}: {}/{} succeeded{}",
            Utc::now(),
            report.succeeded,
            report.attempted,
            if report.cancelled { " (cancelled)" } else { "" }
        );
        report
    }
}

/// `<prefix>/<provider>/<yyyy>/<MM>`
pub fn remote_folder(prefix: &str, provider: DatabaseProvider, at: DateTime<Utc>) -> String {
    let prefix = prefix.trim_matches('/');
    let dated = format!("{}/{}", provider.slug(), at.format("%Y/%m"));
    if prefix.is_empty() {
        dated
    } else {
        format!("{}/{}", prefix, dated)
    }
}
