use super::cloud::{EntryKind, RemoteEntry, StorageBackend};
use crate::config::LocalStoreConfig;
use crate::error::{BackupError, Result};
use async_trait::async_trait;
use reqwest::Url;
use std::path::{Path, PathBuf};

/// A directory tree on a mounted filesystem (NAS share, second disk).
/// Ids are `/`-separated paths relative to the root.
pub struct LocalBackend {
    root: PathBuf,
}

impl LocalBackend {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn from_config(config: &LocalStoreConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.root)?;
        Ok(Self::new(config.root.canonicalize()?))
    }

    fn resolve(&self, id: &str) -> Result<PathBuf> {
        let mut path = self.root.clone();
        for part in id.split('/').filter(|p| !p.is_empty()) {
            check_name(part)?;
            path.push(part);
        }
        Ok(path)
    }

    fn entry(&self, id: &str, path: &Path, kind: EntryKind) -> RemoteEntry {
        RemoteEntry {
            id: id.to_string(),
            name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            kind,
            web_link: match kind {
                EntryKind::Object => Url::from_file_path(path).ok().map(|u| u.to_string()),
                EntryKind::Folder => None,
            },
            shared_publicly: true,
        }
    }
}

fn check_name(name: &str) -> Result<()> {
    if name == "." || name == ".." || name.contains('\\') {
        return Err(BackupError::RemoteStore(format!("Invalid path segment '{}'", name)));
    }
    Ok(())
}

fn join_id(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", parent, name)
    }
}

#[async_trait]
impl StorageBackend for LocalBackend {
    fn name(&self) -> &'static str {
        "Local"
    }

    fn top_level_id(&self) -> String {
        String::new()
    }

    async fn find_child(&self, parent_id: &str, name: &str, kind: EntryKind) -> Result<Option<RemoteEntry>> {
        check_name(name)?;
        let id = join_id(parent_id, name);
        let path = self.resolve(&id)?;
        let matches = match tokio::fs::metadata(&path).await {
            Ok(meta) => match kind {
                EntryKind::Folder => meta.is_dir(),
                EntryKind::Object => meta.is_file(),
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => return Err(e.into()),
        };
        Ok(matches.then(|| self.entry(&id, &path, kind)))
    }

    async fn create_folder(&self, parent_id: &str, name: &str) -> Result<String> {
        check_name(name)?;
        let id = join_id(parent_id, name);
        tokio::fs::create_dir_all(self.resolve(&id)?).await?;
        Ok(id)
    }

    async fn create_object(
        &self,
        parent_id: &str,
        name: &str,
        _content_type: &str,
        local_path: &Path,
    ) -> Result<RemoteEntry> {
        check_name(name)?;
        let id = join_id(parent_id, name);
        let target = self.resolve(&id)?;

        let mut source = tokio::fs::File::open(local_path).await?;
        let mut destination = tokio::fs::File::create(&target).await?;
        tokio::io::copy(&mut source, &mut destination).await?;

        Ok(self.entry(&id, &target, EntryKind::Object))
    }

    async fn delete_entry(&self, id: &str) -> Result<bool> {
        let path = self.resolve(id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_entry(&self, id: &str) -> Result<Option<RemoteEntry>> {
        let path = self.resolve(id)?;
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(Some(self.entry(id, &path, EntryKind::Object))),
            Ok(_) => Ok(Some(self.entry(id, &path, EntryKind::Folder))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn grant_public_read(&self, _id: &str) -> Result<()> {
        Ok(())
    }
}
