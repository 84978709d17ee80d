mod registry;
mod types;

pub use registry::ConnectionRegistry;
pub use types::*;

use crate::error::{BackupError, Result};
use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info};

pub const CONFIG_PATH_ENV: &str = "AZURITE_BACKUP_CONFIG";

pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".azurite_backup"))
        .unwrap_or_else(|| PathBuf::from(".azurite_backup"))
}
pub fn config_path() -> PathBuf {
    std::env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| config_dir().join("config.toml"))
}
pub fn load() -> Result<AppConfig> {
    load_from(&config_path())
}
pub fn load_from(path: &PathBuf) -> Result<AppConfig> {
    if !path.exists() {
        debug!("Config file not found at {:?}, using defaults", path);
        return Ok(AppConfig::default());
    }

    info!("Loading configuration from {:?}", path);
    let contents = fs::read_to_string(path)?;
    let config: AppConfig = toml::from_str(&contents)?;
    Ok(config)
}
impl AppConfig {
    /// Rejects configurations that cannot run before any backup starts.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for connection in &self.connections {
            let name = connection.name.trim();
            if name.is_empty() {
                return Err(BackupError::Config(
                    "Connection name must not be empty".to_string(),
                ));
            }
            if name == "." || name == ".." || name.contains(['/', '\\']) {
                return Err(BackupError::Config(format!(
                    "Connection name '{}' must not contain path separators",
                    name
                )));
            }
            if !seen.insert(name.to_lowercase()) {
                return Err(BackupError::Config(format!(
                    "Duplicate connection name '{}'",
                    name
                )));
            }
        }

        let storage = &self.storage;
        let section_present = match storage.provider {
            CloudProvider::GoogleDrive => storage.google_drive.is_some(),
            CloudProvider::Firebase => storage.firebase.is_some(),
            CloudProvider::Local => storage.local.is_some(),
            CloudProvider::AwsS3 | CloudProvider::AzureBlob => true,
        };
        if !section_present {
            return Err(BackupError::Config(format!(
                "Storage provider '{}' selected but [storage.{}] is missing",
                storage.provider, storage.provider
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Weekday;
    use tempfile::tempdir;

    fn sample_config() -> AppConfig {
        AppConfig {
            connections: vec![DatabaseConnection {
                name: "Sales".to_string(),
                provider: DatabaseProvider::SqlServer,
                server: "localhost".to_string(),
                username: "sa".to_string(),
                password: "secret".to_string(),
                backup_folder: Some(PathBuf::from("backups/sales")),
            }],
            storage: StorageConfig {
                provider: CloudProvider::GoogleDrive,
                google_drive: Some(GoogleDriveConfig {
                    method: DriveAuthMethod::AccessToken,
                    credentials_json_path: None,
                    refresh_token: None,
                    access_token: Some("token".to_string()),
                    application_name: "AzuriteHub".to_string(),
                    root_folder_id: None,
                }),
                ..StorageConfig::default()
            },
            schedule: Schedule::Weekly {
                day: Weekday::Sun,
                hour: 0,
            },
            ..AppConfig::default()
        }
    }

    #[test]
    fn test_config_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let config = sample_config();
        fs::write(&path, toml::to_string_pretty(&config).unwrap()).unwrap();
        let loaded = load_from(&path).unwrap();

        assert_eq!(loaded.connections.len(), 1);
        assert_eq!(loaded.connections[0].name, "Sales");
        assert_eq!(loaded.storage.provider, CloudProvider::GoogleDrive);
        assert!(loaded.storage.google_drive.is_some());
        assert_eq!(loaded.schedule, config.schedule);
    }

    #[test]
    fn test_parse_minimal_toml() {
        let config: AppConfig = toml::from_str(
            r#"
            [[connections]]
            name = "Sales"
            server = "db01"
            username = "sa"
            password = "pw"

            [storage]
            provider = "firebase"

            [storage.firebase]
            credentials_json_path = "sa.json"
            bucket_name = "app.appspot.com"

            [schedule]
            type = "hours"
            value = 6
            "#,
        )
        .unwrap();

        assert_eq!(config.connections[0].provider, DatabaseProvider::SqlServer);
        assert!(config.storage.create_folders_if_not_exist);
        assert_eq!(config.storage.default_root_path.as_deref(), Some("azuritehub"));
        assert_eq!(config.schedule, Schedule::Hours(6));
        assert_eq!(config.remote_folder_prefix, "backups");
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_duplicate_names() {
        let mut config = sample_config();
        let mut duplicate = config.connections[0].clone();
        duplicate.name = "SALES".to_string();
        config.connections.push(duplicate);

        assert!(matches!(config.validate(), Err(BackupError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_path_like_names() {
        for name in ["../etc", "a/b", "a\\b", ".."] {
            let mut config = sample_config();
            config.connections[0].name = name.to_string();
            assert!(
                matches!(config.validate(), Err(BackupError::Config(_))),
                "{} should be rejected",
                name
            );
        }

        let mut config = sample_config();
        config.connections[0].name = "Sales.v2".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_missing_provider_section() {
        let mut config = sample_config();
        config.storage.google_drive = None;

        assert!(matches!(config.validate(), Err(BackupError::Config(_))));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let loaded = load_from(&dir.path().join("absent.toml")).unwrap();
        assert!(loaded.connections.is_empty());
        assert_eq!(loaded.storage.provider, CloudProvider::Local);
    }

    #[test]
    fn test_schedule_next_after() {
        let from = chrono::DateTime::parse_from_rfc3339("2025-08-13T10:30:00Z")
            .unwrap()
            .with_timezone(&chrono::Utc);

        assert_eq!(
            Schedule::Minutes(5).next_after(from).to_rfc3339(),
            "2025-08-13T10:35:00+00:00"
        );
        assert_eq!(
            Schedule::Days(1).next_after(from).to_rfc3339(),
            "2025-08-14T10:30:00+00:00"
        );
        // 2025-08-13 is a Wednesday.
        let weekly = Schedule::Weekly {
            day: Weekday::Sun,
            hour: 0,
        };
        assert_eq!(
            weekly.next_after(from).to_rfc3339(),
            "2025-08-17T00:00:00+00:00"
        );
        let same_day_passed = Schedule::Weekly {
            day: Weekday::Wed,
            hour: 2,
        };
        assert_eq!(
            same_day_passed.next_after(from).to_rfc3339(),
            "2025-08-20T02:00:00+00:00"
        );
    }
}
