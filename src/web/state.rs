use crate::backup::pipeline::{ConnectionReport, Pipeline, RunReport};
use crate::config::ConnectionRegistry;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

const HISTORY_LIMIT: usize = 50;
const LOG_LIMIT: usize = 100;

#[derive(Debug, Clone, Default, Serialize)]
pub struct SchedulerStatus {
    pub running: bool,

    pub next_run: Option<DateTime<Utc>>,

    pub schedule: String,

    pub connection_count: usize,

    pub last_run: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BackupEntry {
    pub timestamp: DateTime<Utc>,

    pub connection_name: String,

    pub success: bool,

    pub remote_url: Option<String>,

    pub duration_secs: u64,

    pub error: Option<String>,
}

impl From<&ConnectionReport> for BackupEntry {
    fn from(report: &ConnectionReport) -> Self {
        Self {
            timestamp: Utc::now(),
            connection_name: report.connection_name.clone(),
            success: report.success,
            remote_url: report.remote_url.clone(),
            duration_secs: report.duration_secs,
            error: report.error.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: String,
    pub message: String,
}

/// Shared between the scheduler, the HTTP handlers and `main`.
pub struct AppState {
    pub scheduler: RwLock<SchedulerStatus>,

    pub history: RwLock<Vec<BackupEntry>>,

    pub scheduler_logs: RwLock<Vec<LogEntry>>,

    pub pipeline: Arc<Pipeline>,

    pub registry: ConnectionRegistry,

    /// Cancelled on shutdown; on-demand runs use child tokens.
    pub shutdown: CancellationToken,

    credentials: (String, String),
}

impl AppState {
    pub fn new(
        pipeline: Arc<Pipeline>,
        registry: ConnectionRegistry,
        shutdown: CancellationToken,
        username: String,
        password: String,
    ) -> Arc<Self> {
        Arc::new(Self {
            scheduler: RwLock::new(SchedulerStatus::default()),
            history: RwLock::new(Vec::new()),
            scheduler_logs: RwLock::new(Vec::new()),
            pipeline,
            registry,
            shutdown,
            credentials: (username, password),
        })
    }

    /// No credentials configured means the API is open.
    pub fn auth_required(&self) -> bool {
        !(self.credentials.0.is_empty() && self.credentials.1.is_empty())
    }

    pub fn check_credentials(&self, username: &str, password: &str) -> bool {
        self.credentials.0 == username && self.credentials.1 == password
    }

    pub async fn update_scheduler(&self, status: SchedulerStatus) {
        let mut scheduler = self.scheduler.write().await;
        *scheduler = status;
    }

    pub async fn add_backup_entry(&self, entry: BackupEntry) {
        let mut history = self.history.write().await;
        history.insert(0, entry);
        history.truncate(HISTORY_LIMIT);
    }

    pub async fn add_log(&self, level: &str, message: &str) {
        let mut logs = self.scheduler_logs.write().await;
        logs.insert(0, LogEntry {
            timestamp: Utc::now(),
            level: level.to_string(),
            message: message.to_string(),
        });
        logs.truncate(LOG_LIMIT);
    }

    pub async fn record_run(&self, report: &RunReport) {
        for connection in &report.connections {
            self.add_backup_entry(BackupEntry::from(connection)).await;
            if connection.success {
                self.add_log(
                    "INFO",
                    &format!(
                        "Backup of {} completed in {} sec",
                        connection.connection_name, connection.duration_secs
                    ),
                )
                .await;
            } else {
                self.add_log(
                    "ERROR",
                    &format!(
                        "Backup of {} failed: {}",
                        connection.connection_name,
                        connection.error.as_deref().unwrap_or_default()
                    ),
                )
                .await;
            }
        }

        let summary = format!(
            "Run finished: {}/{} succeeded",
            report.succeeded, report.attempted
        );
        if report.cancelled {
            self.add_log("WARN", &format!("{} (cancelled)", summary)).await;
        } else {
            self.add_log("INFO", &summary).await;
        }
    }
}
