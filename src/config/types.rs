use chrono::{DateTime, Datelike, Duration, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseProvider {
    SqlServer,
    PostgreSql,
}

impl DatabaseProvider {
    /// File extension of the artifact the vendor tool produces.
    pub fn extension(&self) -> &'static str {
        match self {
            DatabaseProvider::SqlServer => "bak",
            DatabaseProvider::PostgreSql => "dump",
        }
    }

    pub fn slug(&self) -> &'static str {
        match self {
            DatabaseProvider::SqlServer => "sqlserver",
            DatabaseProvider::PostgreSql => "postgresql",
        }
    }
}

impl std::fmt::Display for DatabaseProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DatabaseProvider::SqlServer => write!(f, "SQL Server"),
            DatabaseProvider::PostgreSql => write!(f, "PostgreSQL"),
        }
    }
}
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConnection {
    pub name: String,
    #[serde(default = "default_database_provider")]
    pub provider: DatabaseProvider,
    pub server: String,
    pub username: String,
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_folder: Option<PathBuf>,
}

fn default_database_provider() -> DatabaseProvider {
    DatabaseProvider::SqlServer
}

impl Default for DatabaseConnection {
    fn default() -> Self {
        Self {
            name: String::new(),
            provider: DatabaseProvider::SqlServer,
            server: "localhost".to_string(),
            username: "sa".to_string(),
            password: String::new(),
            backup_folder: None,
        }
    }
}
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CloudProvider {
    GoogleDrive,
    Firebase,
    Local,
    AwsS3,
    AzureBlob,
}

impl CloudProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloudProvider::GoogleDrive => "google_drive",
            CloudProvider::Firebase => "firebase",
            CloudProvider::Local => "local",
            CloudProvider::AwsS3 => "aws_s3",
            CloudProvider::AzureBlob => "azure_blob",
        }
    }
}

impl std::fmt::Display for CloudProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DriveAuthMethod {
    #[serde(rename = "service_account")]
    ServiceAccount,
    #[serde(rename = "oauth2")]
    OAuth2,
    #[serde(rename = "access_token")]
    AccessToken,
}
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleDriveConfig {
    #[serde(default = "default_drive_method")]
    pub method: DriveAuthMethod,
    /// Service account key, or OAuth client secret file for `oauth2`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials_json_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default = "default_application_name")]
    pub application_name: String,
    /// Skips root resolution when the target folder id is already known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_folder_id: Option<String>,
}

fn default_drive_method() -> DriveAuthMethod {
    DriveAuthMethod::ServiceAccount
}

fn default_application_name() -> String {
    "AzuriteHub".to_string()
}
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FirebaseConfig {
    pub credentials_json_path: PathBuf,
    pub bucket_name: String,
}
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalStoreConfig {
    pub root: PathBuf,
}
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub provider: CloudProvider,
    #[serde(default = "default_true")]
    pub create_folders_if_not_exist: bool,
    #[serde(default = "default_root_path")]
    pub default_root_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub google_drive: Option<GoogleDriveConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firebase: Option<FirebaseConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local: Option<LocalStoreConfig>,
}

fn default_true() -> bool {
    true
}

fn default_root_path() -> Option<String> {
    Some("azuritehub".to_string())
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            provider: CloudProvider::Local,
            create_folders_if_not_exist: true,
            default_root_path: default_root_path(),
            google_drive: None,
            firebase: None,
            local: Some(LocalStoreConfig {
                root: PathBuf::from("remote"),
            }),
        }
    }
}
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Schedule {
    Minutes(u32),
    Hours(u32),
    Days(u32),
    Weekly { day: Weekday, hour: u32 },
}

impl Schedule {
    /// Next fire time strictly after `from`. Weekly schedules are evaluated in UTC.
    pub fn next_after(&self, from: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Schedule::Minutes(n) => from + Duration::minutes((*n).max(1) as i64),
            Schedule::Hours(n) => from + Duration::hours((*n).max(1) as i64),
            Schedule::Days(n) => from + Duration::days((*n).max(1) as i64),
            Schedule::Weekly { day, hour } => {
                let days_ahead = (7 + day.num_days_from_monday()
                    - from.weekday().num_days_from_monday())
                    % 7;
                let date = from.date_naive() + Duration::days(days_ahead as i64);
                let candidate = date
                    .and_hms_opt((*hour).min(23), 0, 0)
                    .map(|naive| naive.and_utc())
                    .unwrap_or(from);
                if candidate <= from {
                    candidate + Duration::days(7)
                } else {
                    candidate
                }
            }
        }
    }
}

impl Default for Schedule {
    fn default() -> Self {
        Schedule::Weekly {
            day: Weekday::Sun,
            hour: 0,
        }
    }
}

impl std::fmt::Display for Schedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Schedule::Minutes(n) => write!(f, "Every {} minute(s)", n),
            Schedule::Hours(n) => write!(f, "Every {} hour(s)", n),
            Schedule::Days(n) => write!(f, "Every {} day(s)", n),
            Schedule::Weekly { day, hour } => write!(f, "Every {} at {:02}:00 UTC", day, hour),
        }
    }
}
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "default_sqlcmd")]
    pub sqlcmd: String,
    #[serde(default = "default_pg_dump")]
    pub pg_dump: String,
}

fn default_sqlcmd() -> String {
    "sqlcmd".to_string()
}

fn default_pg_dump() -> String {
    "pg_dump".to_string()
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            sqlcmd: default_sqlcmd(),
            pg_dump: default_pg_dump(),
        }
    }
}
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    pub enabled: bool,
    pub port: u16,
    pub username: String,
    pub password: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 8080,
            username: String::new(),
            password: String::new(),
        }
    }
}
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub connections: Vec<DatabaseConnection>,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub schedule: Schedule,
    #[serde(default)]
    pub web: WebConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default = "default_local_backup_dir")]
    pub local_backup_dir: PathBuf,
    #[serde(default = "default_remote_folder_prefix")]
    pub remote_folder_prefix: String,
}

fn default_local_backup_dir() -> PathBuf {
    PathBuf::from("backups")
}

fn default_remote_folder_prefix() -> String {
    "backups".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            connections: Vec::new(),
            storage: StorageConfig::default(),
            schedule: Schedule::default(),
            web: WebConfig::default(),
            tools: ToolsConfig::default(),
            local_backup_dir: default_local_backup_dir(),
            remote_folder_prefix: default_remote_folder_prefix(),
        }
    }
}
