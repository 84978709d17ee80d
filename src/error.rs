use std::fmt;
use std::io;
#[derive(Debug)]
pub enum BackupError {
    Config(String),
    ExternalTool(String),
    Compression(String),
    FolderNotFound(String),
    RemoteStore(String),
    Cancelled,
    Io(io::Error),
    Serialization(String),
}

impl BackupError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, BackupError::Cancelled)
    }
}

impl fmt::Display for BackupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackupError::Config(msg) => write!(f, "Configuration error: {}", msg),
            BackupError::ExternalTool(msg) => write!(f, "External tool error: {}", msg),
            BackupError::Compression(msg) => write!(f, "Compression error: {}", msg),
            BackupError::FolderNotFound(msg) => write!(f, "Folder not found: {}", msg),
            BackupError::RemoteStore(msg) => write!(f, "Remote store error: {}", msg),
            BackupError::Cancelled => write!(f, "Operation cancelled"),
            BackupError::Io(err) => write!(f, "IO error: {}", err),
            BackupError::Serialization(msg) => write!(f, "Serialization error: {}", msg),
        }
    }
}

impl std::error::Error for BackupError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BackupError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for BackupError {
    fn from(err: io::Error) -> Self {
        BackupError::Io(err)
    }
}

impl From<toml::de::Error> for BackupError {
    fn from(err: toml::de::Error) -> Self {
        BackupError::Serialization(err.to_string())
    }
}

impl From<toml::ser::Error> for BackupError {
    fn from(err: toml::ser::Error) -> Self {
        BackupError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for BackupError {
    fn from(err: serde_json::Error) -> Self {
        BackupError::Serialization(err.to_string())
    }
}

impl From<reqwest::Error> for BackupError {
    fn from(err: reqwest::Error) -> Self {
        BackupError::RemoteStore(err.to_string())
    }
}

impl From<jsonwebtoken::errors::Error> for BackupError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        BackupError::RemoteStore(format!("Failed to sign token request: {}", err))
    }
}

impl From<zip::result::ZipError> for BackupError {
    fn from(err: zip::result::ZipError) -> Self {
        BackupError::Compression(err.to_string())
    }
}

impl From<walkdir::Error> for BackupError {
    fn from(err: walkdir::Error) -> Self {
        BackupError::Compression(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BackupError>;
