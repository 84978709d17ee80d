use super::cloud::{CloudStore, FolderOptions};
use super::drive::DriveBackend;
use super::firebase::FirebaseBackend;
use super::local::LocalBackend;
use super::remote::RemoteStore;
use crate::config::{CloudProvider, StorageConfig};
use crate::error::{BackupError, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Fixed mapping from provider tag to a constructed store.
#[derive(Clone, Default)]
pub struct StoreSelector {
    stores: HashMap<CloudProvider, Arc<dyn RemoteStore>>,
}

impl StoreSelector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_store(mut self, provider: CloudProvider, store: Arc<dyn RemoteStore>) -> Self {
        self.stores.insert(provider, store);
        self
    }

    /// Builds every provider that has a configuration section.
    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        let mut selector = Self::new();

        if let Some(drive) = &config.google_drive {
            let options = FolderOptions {
                root_folder_id: drive.root_folder_id.clone(),
                ..folder_options(config)
            };
            let store = CloudStore::new(DriveBackend::from_config(drive)?, options);
            selector = selector.with_store(CloudProvider::GoogleDrive, Arc::new(store));
        }
        if let Some(firebase) = &config.firebase {
            let store = CloudStore::new(FirebaseBackend::from_config(firebase)?, folder_options(config));
            selector = selector.with_store(CloudProvider::Firebase, Arc::new(store));
        }
        if let Some(local) = &config.local {
            let store = CloudStore::new(LocalBackend::from_config(local)?, folder_options(config));
            selector = selector.with_store(CloudProvider::Local, Arc::new(store));
        }

        info!("Configured {} remote store(s)", selector.stores.len());
        Ok(selector)
    }

    pub fn select(&self, provider: CloudProvider) -> Result<Arc<dyn RemoteStore>> {
        self.stores
            .get(&provider)
            .cloned()
            .ok_or_else(|| BackupError::Config(format!("Provider '{}' not supported", provider)))
    }
}

fn folder_options(config: &StorageConfig) -> FolderOptions {
    FolderOptions {
        root_folder_id: None,
        default_root_path: config.default_root_path.clone(),
        create_folders: config.create_folders_if_not_exist,
    }
}
