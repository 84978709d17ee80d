use super::DatabaseConnection;
use crate::error::{BackupError, Result};
use std::sync::Arc;

/// Ordered, read-only set of configured database connections.
#[derive(Debug, Clone, Default)]
pub struct ConnectionRegistry {
    connections: Arc<Vec<DatabaseConnection>>,
}

impl ConnectionRegistry {
    pub fn new(connections: Vec<DatabaseConnection>) -> Self {
        Self {
            connections: Arc::new(connections),
        }
    }

    pub fn all(&self) -> &[DatabaseConnection] {
        &self.connections
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Case-insensitive lookup by connection name.
    pub fn find(&self, name: &str) -> Result<&DatabaseConnection> {
        self.connections
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| {
                BackupError::Config(format!("Database '{}' not found in configuration", name))
            })
    }
}
