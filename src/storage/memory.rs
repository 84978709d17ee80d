use super::cloud::{EntryKind, RemoteEntry, StorageBackend};
use crate::error::{BackupError, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

const TOP_LEVEL_ID: &str = "root";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub lookups: usize,
    pub folders_created: usize,
    pub objects_created: usize,
    pub deletes: usize,
    pub gets: usize,
    pub grants: usize,
}

impl CallCounts {
    pub fn total(&self) -> usize {
        self.lookups + self.folders_created + self.objects_created + self.deletes + self.gets + self.grants
    }
}

#[derive(Debug, Clone)]
struct Entry {
    name: String,
    parent: String,
    kind: EntryKind,
    trashed: bool,
    public: bool,
    size: u64,
}

#[derive(Debug, Default)]
struct State {
    next_id: u64,
    entries: BTreeMap<String, Entry>,
    counts: CallCounts,
    object_failure: Option<String>,
    hide_private_links: bool,
}

/// Drive-like backend kept in memory, with call counters for assertions.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    state: Mutex<State>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counts(&self) -> CallCounts {
        self.state.lock().unwrap().counts
    }

    pub fn seed_folder(&self, parent: &str, name: &str) -> String {
        let mut state = self.state.lock().unwrap();
        insert(&mut state, parent, name, EntryKind::Folder, 0)
    }

    pub fn trash(&self, id: &str) {
        if let Some(entry) = self.state.lock().unwrap().entries.get_mut(id) {
            entry.trashed = true;
        }
    }

    pub fn fail_object_creation(&self, message: &str) {
        self.state.lock().unwrap().object_failure = Some(message.to_string());
    }

    /// Objects expose no link until public read has been granted.
    pub fn hide_private_links(&self) {
        self.state.lock().unwrap().hide_private_links = true;
    }

    pub fn objects_named(&self, parent: &str, name: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .entries
            .values()
            .filter(|e| e.kind == EntryKind::Object && !e.trashed && e.parent == parent && e.name == name)
            .count()
    }

    pub fn object_count(&self) -> usize {
        self.state
            .lock()
            .unwrap()
            .entries
            .values()
            .filter(|e| e.kind == EntryKind::Object && !e.trashed)
            .count()
    }

    /// Names from below the top level down to `id`, joined with `/`.
    pub fn path_of(&self, id: &str) -> String {
        let state = self.state.lock().unwrap();
        let mut parts = Vec::new();
        let mut current = id.to_string();
        while let Some(entry) = state.entries.get(&current) {
            parts.push(entry.name.clone());
            current = entry.parent.clone();
        }
        parts.reverse();
        parts.join("/")
    }
}

fn insert(state: &mut State, parent: &str, name: &str, kind: EntryKind, size: u64) -> String {
    state.next_id += 1;
    let id = format!("id-{}", state.next_id);
    state.entries.insert(
        id.clone(),
        Entry {
            name: name.to_string(),
            parent: parent.to_string(),
            kind,
            trashed: false,
            public: false,
            size,
        },
    );
    id
}

fn to_remote(id: &str, entry: &Entry, hide_private_links: bool) -> RemoteEntry {
    RemoteEntry {
        id: id.to_string(),
        name: entry.name.clone(),
        kind: entry.kind,
        web_link: match entry.kind {
            EntryKind::Object if hide_private_links && !entry.public => None,
            EntryKind::Object => Some(format!("https://memory.invalid/{}/view?size={}", id, entry.size)),
            EntryKind::Folder => None,
        },
        shared_publicly: entry.public,
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "Memory"
    }

    fn top_level_id(&self) -> String {
        TOP_LEVEL_ID.to_string()
    }

    async fn find_child(&self, parent_id: &str, name: &str, kind: EntryKind) -> Result<Option<RemoteEntry>> {
        let mut state = self.state.lock().unwrap();
        state.counts.lookups += 1;
        Ok(state
            .entries
            .iter()
            .find(|(_, e)| e.parent == parent_id && e.name == name && e.kind == kind && !e.trashed)
            .map(|(id, e)| to_remote(id, e, state.hide_private_links)))
    }

    async fn create_folder(&self, parent_id: &str, name: &str) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        state.counts.folders_created += 1;
        Ok(insert(&mut state, parent_id, name, EntryKind::Folder, 0))
    }

    async fn create_object(
        &self,
        parent_id: &str,
        name: &str,
        _content_type: &str,
        local_path: &Path,
    ) -> Result<RemoteEntry> {
        let size = std::fs::metadata(local_path)?.len();
        let mut state = self.state.lock().unwrap();
        if let Some(message) = state.object_failure.clone() {
            return Err(BackupError::RemoteStore(message));
        }
        state.counts.objects_created += 1;
        let id = insert(&mut state, parent_id, name, EntryKind::Object, size);
        let entry = state.entries[&id].clone();
        Ok(to_remote(&id, &entry, state.hide_private_links))
    }

    async fn delete_entry(&self, id: &str) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        state.counts.deletes += 1;
        Ok(state.entries.remove(id).is_some())
    }

    async fn get_entry(&self, id: &str) -> Result<Option<RemoteEntry>> {
        let mut state = self.state.lock().unwrap();
        state.counts.gets += 1;
        Ok(state.entries.get(id).map(|e| to_remote(id, e, state.hide_private_links)))
    }

    async fn grant_public_read(&self, id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.counts.grants += 1;
        match state.entries.get_mut(id) {
            Some(entry) => {
                entry.public = true;
                Ok(())
            }
            None => Err(BackupError::RemoteStore(format!("File not found: {}", id))),
        }
    }
}
