use super::checksum::calculate_sha256;
use super::tool::{run_tool, ToolInvocation};
use crate::config::{DatabaseConnection, DatabaseProvider, ToolsConfig};
use crate::error::{BackupError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Local, Utc};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct BackupArtifact {
    pub file_path: PathBuf,
    /// Only populated for successful backups.
    pub checksum: Option<String>,
    pub success: bool,
    pub created_at: DateTime<Utc>,
}

impl BackupArtifact {
    fn succeeded(file_path: PathBuf, checksum: String) -> Self {
        Self {
            file_path,
            checksum: Some(checksum),
            success: true,
            created_at: Utc::now(),
        }
    }

    fn missing(file_path: PathBuf) -> Self {
        Self {
            file_path,
            checksum: None,
            success: false,
            created_at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait BackupExecutor: Send + Sync {
    async fn backup(
        &self,
        connection: &DatabaseConnection,
        cancel: &CancellationToken,
    ) -> Result<BackupArtifact>;
}

/// Backs a connection up with its vendor command-line tool.
pub struct VendorToolExecutor {
    tools: ToolsConfig,
    default_dir: PathBuf,
    base_dir: PathBuf,
}

impl VendorToolExecutor {
    pub fn new(tools: ToolsConfig, default_dir: PathBuf) -> Self {
        let base_dir = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."));

        Self {
            tools,
            default_dir,
            base_dir,
        }
    }

    #[cfg(test)]
    pub fn with_base_dir(mut self, base_dir: PathBuf) -> Self {
        self.base_dir = base_dir;
        self
    }

    fn target_dir(&self, connection: &DatabaseConnection) -> PathBuf {
        let configured = connection
            .backup_folder
            .clone()
            .unwrap_or_else(|| self.default_dir.join(&connection.name));
        resolve_backup_dir(&configured, &self.base_dir)
    }

    async fn run_backup(
        &self,
        connection: &DatabaseConnection,
        cancel: &CancellationToken,
    ) -> Result<BackupArtifact> {
        let backup_dir = self.target_dir(connection);
        if !backup_dir.exists() {
            tokio::fs::create_dir_all(&backup_dir).await?;
            info!("Created backup directory {}", backup_dir.display());
        }

        let backup_file = backup_dir.join(backup_file_name(connection, Local::now()));
        let invocation = build_invocation(&self.tools, connection, &backup_file);

        info!(
            database = %connection.name,
            server = %connection.server,
            username = %connection.username,
            "Starting {} backup to {}",
            connection.provider,
            backup_file.display()
        );

        let output = run_tool(&invocation, cancel).await?;
        if !output.succeeded() {
            error!(
                "{} backup failed. ExitCode={:?}, Error={}",
                invocation.program,
                output.exit_code,
                output.stderr.trim()
            );
            return Err(BackupError::ExternalTool(format!(
                "{} backup failed: {}",
                invocation.program,
                output.stderr.trim()
            )));
        }

        if !output.stdout.trim().is_empty() {
            debug!("{} output: {}", invocation.program, output.stdout.trim());
        }

        if !backup_file.exists() {
            error!("Backup file not created: {}", backup_file.display());
            return Ok(BackupArtifact::missing(backup_file));
        }

        let checksum = calculate_sha256(&backup_file).await?;
        info!("Backup completed successfully at {}", backup_file.display());

        Ok(BackupArtifact::succeeded(backup_file, checksum))
    }
}

#[async_trait]
impl BackupExecutor for VendorToolExecutor {
    async fn backup(
        &self,
        connection: &DatabaseConnection,
        cancel: &CancellationToken,
    ) -> Result<BackupArtifact> {
        match self.run_backup(connection, cancel).await {
            Ok(artifact) => Ok(artifact),
            Err(e) if e.is_cancelled() => {
                warn!(database = %connection.name, "Backup cancelled");
                Err(e)
            }
            Err(e) => {
                error!(
                    database = %connection.name,
                    server = %connection.server,
                    username = %connection.username,
                    "Error backing up database: {}",
                    e
                );
                Err(e)
            }
        }
    }
}

/// `<name>_<yyyyMMddHHmmss>.<ext>`
pub fn backup_file_name(connection: &DatabaseConnection, now: DateTime<Local>) -> String {
    format!(
        "{}_{}.{}",
        connection.name,
        now.format("%Y%m%d%H%M%S"),
        connection.provider.extension()
    )
}

/// Rooted folders are used as-is, anything else hangs off `base_dir`.
pub fn resolve_backup_dir(configured: &Path, base_dir: &Path) -> PathBuf {
    if configured.is_absolute() || configured.has_root() {
        configured.to_path_buf()
    } else {
        base_dir.join(configured)
    }
}

pub fn build_invocation(
    tools: &ToolsConfig,
    connection: &DatabaseConnection,
    target: &Path,
) -> ToolInvocation {
    let target = target.to_string_lossy().into_owned();
    match connection.provider {
        DatabaseProvider::SqlServer => ToolInvocation {
            program: tools.sqlcmd.clone(),
            args: vec![
                "-Q".to_string(),
                format!(
                    "BACKUP DATABASE [{}] TO DISK='{}'",
                    connection.name,
                    target.replace('\'', "''")
                ),
                "-S".to_string(),
                connection.server.clone(),
                "-U".to_string(),
                connection.username.clone(),
                "-P".to_string(),
                connection.password.clone(),
            ],
            envs: vec![],
        },
        DatabaseProvider::PostgreSql => ToolInvocation {
            program: tools.pg_dump.clone(),
            args: vec![
                "-h".to_string(),
                connection.server.clone(),
                "-U".to_string(),
                connection.username.clone(),
                "-F".to_string(),
                "c".to_string(),
                "-f".to_string(),
                target,
                connection.name.clone(),
            ],
            envs: vec![("PGPASSWORD".to_string(), connection.password.clone())],
        },
    }
}
