use super::cloud::{EntryKind, RemoteEntry, StorageBackend};
use super::google_auth::TokenSource;
use crate::config::GoogleDriveConfig;
use crate::error::{BackupError, Result};
use async_trait::async_trait;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, LOCATION};
use reqwest::{Body, Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio_util::io::ReaderStream;
use tracing::debug;

const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";
const DRIVE_UPLOAD_BASE: &str = "https://www.googleapis.com/upload/drive/v3";
const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";
const FILE_FIELDS: &str = "id,name,mimeType,webViewLink,webContentLink,permissions(type,role)";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    mime_type: String,
    web_view_link: Option<String>,
    web_content_link: Option<String>,
    #[serde(default)]
    permissions: Vec<DrivePermission>,
}

#[derive(Debug, Serialize, Deserialize)]
struct DrivePermission {
    #[serde(rename = "type")]
    kind: String,
    role: String,
}

#[derive(Debug, Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
}

#[derive(Debug, Serialize)]
struct CreateFile<'a> {
    name: &'a str,
    #[serde(rename = "mimeType", skip_serializing_if = "Option::is_none")]
    mime_type: Option<&'a str>,
    parents: [&'a str; 1],
}

impl From<DriveFile> for RemoteEntry {
    fn from(file: DriveFile) -> Self {
        let kind = if file.mime_type == FOLDER_MIME_TYPE {
            EntryKind::Folder
        } else {
            EntryKind::Object
        };
        let shared_publicly = file.permissions.iter().any(|p| p.kind == "anyone");
        RemoteEntry {
            id: file.id,
            name: file.name,
            kind,
            web_link: file.web_view_link.or(file.web_content_link),
            shared_publicly,
        }
    }
}

/// Google Drive v3 over plain REST.
pub struct DriveBackend {
    client: Client,
    tokens: TokenSource,
    api_base: String,
    upload_base: String,
}

impl DriveBackend {
    pub fn from_config(config: &GoogleDriveConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(format!("{}/1.0", config.application_name))
            .build()?;
        let tokens = TokenSource::for_drive(client.clone(), config)?;
        Ok(Self::with_endpoints(client, tokens, DRIVE_API_BASE, DRIVE_UPLOAD_BASE))
    }

    pub fn with_endpoints(client: Client, tokens: TokenSource, api_base: &str, upload_base: &str) -> Self {
        Self {
            client,
            tokens,
            api_base: api_base.trim_end_matches('/').to_string(),
            upload_base: upload_base.trim_end_matches('/').to_string(),
        }
    }

    async fn authorized(&self, request: RequestBuilder) -> Result<RequestBuilder> {
        Ok(request.bearer_auth(self.tokens.access_token().await?))
    }

    async fn fetch_file(&self, id: &str) -> Result<Option<DriveFile>> {
        let url = format!("{}/files/{}", self.api_base, id);
        let request = self
            .client
            .get(&url)
            .query(&[("fields", FILE_FIELDS), ("supportsAllDrives", "true")]);
        let response = self.authorized(request).await?.send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = ensure_success(response, "get file").await?;
        Ok(Some(response.json().await?))
    }
}

async fn ensure_success(response: Response, action: &str) -> Result<Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    Err(BackupError::RemoteStore(format!(
        "Google Drive {} failed: {} - {}",
        action, status, text
    )))
}

/// Drive query for a named, non-trashed child of `parent_id`.
fn child_query(parent_id: &str, name: &str, kind: EntryKind) -> String {
    let operator = match kind {
        EntryKind::Folder => "=",
        EntryKind::Object => "!=",
    };
    let safe_name = name.replace('\\', "\\\\").replace('\'', "\\'");
    format!(
        "mimeType {} '{}' and name = '{}' and '{}' in parents and trashed = false",
        operator, FOLDER_MIME_TYPE, safe_name, parent_id
    )
}

#[async_trait]
impl StorageBackend for DriveBackend {
    fn name(&self) -> &'static str {
        "Google Drive"
    }

    fn top_level_id(&self) -> String {
        "root".to_string()
    }

    async fn find_child(&self, parent_id: &str, name: &str, kind: EntryKind) -> Result<Option<RemoteEntry>> {
        let q = child_query(parent_id, name, kind);
        let fields = format!("files({})", FILE_FIELDS);
        let request = self.client.get(format!("{}/files", self.api_base)).query(&[
            ("q", q.as_str()),
            ("fields", fields.as_str()),
            ("supportsAllDrives", "true"),
            ("includeItemsFromAllDrives", "true"),
        ]);
        let response = self.authorized(request).await?.send().await?;
        let list: FileList = ensure_success(response, "list files").await?.json().await?;

        Ok(list.files.into_iter().next().map(RemoteEntry::from))
    }

    async fn create_folder(&self, parent_id: &str, name: &str) -> Result<String> {
        let body = CreateFile {
            name,
            mime_type: Some(FOLDER_MIME_TYPE),
            parents: [parent_id],
        };
        let request = self
            .client
            .post(format!("{}/files", self.api_base))
            .query(&[("fields", "id"), ("supportsAllDrives", "true")])
            .json(&body);
        let response = self.authorized(request).await?.send().await?;
        let created: DriveFile = ensure_success(response, "create folder").await?.json().await?;
        Ok(created.id)
    }

    async fn create_object(
        &self,
        parent_id: &str,
        name: &str,
        content_type: &str,
        local_path: &Path,
    ) -> Result<RemoteEntry> {
        let file = tokio::fs::File::open(local_path).await?;
        let length = file.metadata().await?.len();

        let metadata = CreateFile {
            name,
            mime_type: None,
            parents: [parent_id],
        };
        let request = self
            .client
            .post(format!("{}/files", self.upload_base))
            .query(&[
                ("uploadType", "resumable"),
                ("supportsAllDrives", "true"),
                ("fields", FILE_FIELDS),
            ])
            .header("X-Upload-Content-Type", content_type)
            .header("X-Upload-Content-Length", length)
            .json(&metadata);
        let response = self.authorized(request).await?.send().await?;
        let response = ensure_success(response, "start upload session").await?;

        let session_url = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| BackupError::RemoteStore("Upload session has no location".to_string()))?;
        debug!("Streaming {} bytes to upload session", length);

        let request = self
            .client
            .put(&session_url)
            .header(CONTENT_TYPE, content_type)
            .header(CONTENT_LENGTH, length)
            .body(Body::wrap_stream(ReaderStream::new(file)));
        let response = self.authorized(request).await?.send().await?;
        let uploaded: DriveFile = ensure_success(response, "upload").await?.json().await?;

        Ok(uploaded.into())
    }

    async fn delete_entry(&self, id: &str) -> Result<bool> {
        let request = self
            .client
            .delete(format!("{}/files/{}", self.api_base, id))
            .query(&[("supportsAllDrives", "true")]);
        let response = self.authorized(request).await?.send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        ensure_success(response, "delete").await?;
        Ok(true)
    }

    async fn get_entry(&self, id: &str) -> Result<Option<RemoteEntry>> {
        Ok(self.fetch_file(id).await?.map(RemoteEntry::from))
    }

    async fn grant_public_read(&self, id: &str) -> Result<()> {
        let permission = DrivePermission {
            kind: "anyone".to_string(),
            role: "reader".to_string(),
        };
        let request = self
            .client
            .post(format!("{}/files/{}/permissions", self.api_base, id))
            .query(&[("supportsAllDrives", "true")])
            .json(&permission);
        let response = self.authorized(request).await?.send().await?;
        ensure_success(response, "grant permission").await?;
        Ok(())
    }
}
