//! Folder resolution and upload sequencing shared by every provider.
//!
//! Providers only implement the small set of primitives in [`StorageBackend`];
//! [`CloudStore`] turns them into the [`RemoteStore`] capability set.

use super::remote::{RemoteStore, UploadRequest, UploadResult, DEFAULT_CONTENT_TYPE};
use crate::error::{BackupError, Result};
use async_trait::async_trait;
use std::future::Future;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Folder,
    Object,
}

#[derive(Debug, Clone)]
pub struct RemoteEntry {
    pub id: String,
    pub name: String,
    pub kind: EntryKind,
    pub web_link: Option<String>,
    /// True once anyone holding `web_link` may read the object.
    pub shared_publicly: bool,
}

#[async_trait]
pub trait StorageBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Id of the provider's top-level namespace.
    fn top_level_id(&self) -> String;

    /// Child of `parent_id` with exactly `name` and `kind`, ignoring deleted entries.
    async fn find_child(&self, parent_id: &str, name: &str, kind: EntryKind) -> Result<Option<RemoteEntry>>;

    async fn create_folder(&self, parent_id: &str, name: &str) -> Result<String>;

    /// Streams `local_path` into a new object under `parent_id`.
    async fn create_object(
        &self,
        parent_id: &str,
        name: &str,
        content_type: &str,
        local_path: &Path,
    ) -> Result<RemoteEntry>;

    /// `Ok(false)` when nothing with that id exists.
    async fn delete_entry(&self, id: &str) -> Result<bool>;

    async fn get_entry(&self, id: &str) -> Result<Option<RemoteEntry>>;

    async fn grant_public_read(&self, id: &str) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct FolderOptions {
    pub root_folder_id: Option<String>,
    pub default_root_path: Option<String>,
    pub create_folders: bool,
}

impl Default for FolderOptions {
    fn default() -> Self {
        Self {
            root_folder_id: None,
            default_root_path: None,
            create_folders: true,
        }
    }
}

pub struct CloudStore<B> {
    backend: B,
    options: FolderOptions,
}

impl<B: StorageBackend> CloudStore<B> {
    pub fn new(backend: B, options: FolderOptions) -> Self {
        Self { backend, options }
    }

    #[cfg(test)]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    async fn resolve_root(&self, cancel: &CancellationToken) -> Result<String> {
        if let Some(id) = self.options.root_folder_id.as_deref().filter(|id| !id.trim().is_empty()) {
            return Ok(id.to_string());
        }

        let top = self.backend.top_level_id();
        let root_name = match self
            .options
            .default_root_path
            .as_deref()
            .map(|p| p.trim_matches(|c| c == '/' || c == '\\'))
            .filter(|p| !p.is_empty())
        {
            Some(name) => name,
            None => return Ok(top),
        };

        self.find_or_create_folder(&top, root_name, cancel).await
    }

    async fn find_or_create_folder(&self, parent_id: &str, name: &str, cancel: &CancellationToken) -> Result<String> {
        let existing = cancellable(cancel, self.backend.find_child(parent_id, name, EntryKind::Folder)).await?;
        if let Some(folder) = existing {
            return Ok(folder.id);
        }

        if !self.options.create_folders {
            return Err(BackupError::FolderNotFound(format!(
                "Folder '{}' not found and auto-create disabled",
                name
            )));
        }

        let id = cancellable(cancel, self.backend.create_folder(parent_id, name)).await?;
        info!("Created folder: {} ({})", name, id);
        Ok(id)
    }

    async fn upload_to_folder(&self, request: &UploadRequest, cancel: &CancellationToken) -> Result<UploadResult> {
        let folder_id = self.ensure_folder(&request.remote_folder, cancel).await?;

        if request.overwrite {
            while let Some(existing) = cancellable(
                cancel,
                self.backend
                    .find_child(&folder_id, &request.remote_file_name, EntryKind::Object),
            )
            .await?
            {
                if !cancellable(cancel, self.backend.delete_entry(&existing.id)).await? {
                    break;
                }
                info!("Overwrote existing file: {} ({})", request.remote_file_name, existing.id);
            }
        }

        let content_type = request.content_type.as_deref().unwrap_or(DEFAULT_CONTENT_TYPE);
        let entry = cancellable(
            cancel,
            self.backend.create_object(
                &folder_id,
                &request.remote_file_name,
                content_type,
                &request.local_path,
            ),
        )
        .await?;

        info!(
            "Upload completed. {} ({}), Link: {}",
            entry.name,
            entry.id,
            entry.web_link.as_deref().unwrap_or("-")
        );
        Ok(UploadResult::uploaded(entry.id, entry.web_link))
    }

    async fn resolve_public_url(&self, id: &str, cancel: &CancellationToken) -> Result<Option<String>> {
        let entry = match cancellable(cancel, self.backend.get_entry(id)).await? {
            Some(entry) => entry,
            None => {
                warn!("Object {} not found while resolving public link", id);
                return Ok(None);
            }
        };

        if entry.kind == EntryKind::Folder {
            warn!("{} is a folder, no public link resolved", id);
            return Ok(None);
        }

        if entry.shared_publicly && entry.web_link.is_some() {
            return Ok(entry.web_link);
        }

        cancellable(cancel, self.backend.grant_public_read(id)).await?;
        debug!("Granted public read on {}", id);

        let refreshed = cancellable(cancel, self.backend.get_entry(id)).await?;
        Ok(refreshed.and_then(|e| e.web_link))
    }
}

#[async_trait]
impl<B: StorageBackend> RemoteStore for CloudStore<B> {
    async fn upload(&self, request: &UploadRequest, cancel: &CancellationToken) -> UploadResult {
        if !request.local_path.is_file() {
            return UploadResult::failed(format!("File not found: {}", request.local_path.display()));
        }
        if request.remote_file_name.trim().is_empty() {
            return UploadResult::failed("Remote file name is required");
        }

        info!(
            "Uploading to {}: {}/{}",
            self.backend.name(),
            request.remote_folder,
            request.remote_file_name
        );

        match self.upload_to_folder(request, cancel).await {
            Ok(result) => result,
            Err(e) => {
                if e.is_cancelled() {
                    warn!("Upload cancelled for {}", request.local_path.display());
                } else {
                    error!("Upload failed for {}: {}", request.local_path.display(), e);
                }
                UploadResult::failed(e.to_string())
            }
        }
    }

    async fn ensure_folder(&self, logical_path: &str, cancel: &CancellationToken) -> Result<String> {
        let root_id = self.resolve_root(cancel).await?;

        let segments = split_segments(logical_path);
        if segments.is_empty() {
            return Ok(root_id);
        }

        debug!("Resolving remote path {}", logical_path);

        let mut current_id = root_id;
        for segment in segments {
            current_id = self.find_or_create_folder(&current_id, segment, cancel).await?;
        }
        Ok(current_id)
    }

    async fn delete(&self, id_or_path: &str, cancel: &CancellationToken) -> Result<()> {
        if cancellable(cancel, self.backend.delete_entry(id_or_path)).await? {
            info!("Deleted remote object: {}", id_or_path);
        } else {
            warn!("Object {} not found for deletion", id_or_path);
        }
        Ok(())
    }

    async fn get_public_url(&self, id_or_path: &str, cancel: &CancellationToken) -> Option<String> {
        match self.resolve_public_url(id_or_path, cancel).await {
            Ok(url) => url,
            Err(e) => {
                warn!("GetPublicUrl failed for {}: {}", id_or_path, e);
                None
            }
        }
    }

    fn name(&self) -> &'static str {
        self.backend.name()
    }
}

/// Splits a logical path on `/` and `\`, dropping empty segments.
pub fn split_segments(path: &str) -> Vec<&str> {
    path.split(['/', '\\']).filter(|s| !s.trim().is_empty()).collect()
}

async fn cancellable<T>(cancel: &CancellationToken, operation: impl Future<Output = Result<T>>) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(BackupError::Cancelled),
        result = operation => result,
    }
}
