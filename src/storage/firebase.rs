use super::cloud::{EntryKind, RemoteEntry, StorageBackend};
use super::google_auth::{TokenSource, STORAGE_SCOPE};
use crate::config::FirebaseConfig;
use crate::error::{BackupError, Result};
use async_trait::async_trait;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Body, Client, RequestBuilder, Response, StatusCode, Url};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tokio_util::io::ReaderStream;
use tracing::debug;

const STORAGE_API_BASE: &str = "https://storage.googleapis.com/storage/v1";
const STORAGE_UPLOAD_BASE: &str = "https://storage.googleapis.com/upload/storage/v1";
const DOWNLOAD_BASE: &str = "https://firebasestorage.googleapis.com/v0";
const DOWNLOAD_TOKEN_KEY: &str = "firebaseStorageDownloadTokens";

#[derive(Debug, Deserialize)]
struct StorageObject {
    name: String,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

/// Firebase / Cloud Storage bucket. The bucket is a flat key namespace, so
/// folders are `/`-joined key prefixes and exist implicitly.
pub struct FirebaseBackend {
    client: Client,
    tokens: TokenSource,
    bucket: String,
    api_base: String,
    upload_base: String,
    download_base: String,
}

impl FirebaseBackend {
    pub fn from_config(config: &FirebaseConfig) -> Result<Self> {
        let client = Client::builder().build()?;
        let tokens = TokenSource::service_account(client.clone(), &config.credentials_json_path, STORAGE_SCOPE)?;
        Ok(Self::with_endpoints(
            client,
            tokens,
            &config.bucket_name,
            STORAGE_API_BASE,
            STORAGE_UPLOAD_BASE,
            DOWNLOAD_BASE,
        ))
    }

    pub fn with_endpoints(
        client: Client,
        tokens: TokenSource,
        bucket: &str,
        api_base: &str,
        upload_base: &str,
        download_base: &str,
    ) -> Self {
        Self {
            client,
            tokens,
            bucket: bucket.to_string(),
            api_base: api_base.trim_end_matches('/').to_string(),
            upload_base: upload_base.trim_end_matches('/').to_string(),
            download_base: download_base.trim_end_matches('/').to_string(),
        }
    }

    fn object_url(&self, key: &str) -> Result<Url> {
        segment_url(&format!("{}/b/{}/o", self.api_base, self.bucket), key)
    }

    fn download_url(&self, key: &str, token: Option<&str>) -> Result<Url> {
        let mut url = segment_url(&format!("{}/b/{}/o", self.download_base, self.bucket), key)?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("alt", "media");
            if let Some(token) = token {
                query.append_pair("token", token);
            }
        }
        Ok(url)
    }

    fn to_entry(&self, object: StorageObject) -> Result<RemoteEntry> {
        let token = object
            .metadata
            .get(DOWNLOAD_TOKEN_KEY)
            .and_then(|tokens| tokens.split(',').next())
            .map(str::to_string);
        let web_link = self.download_url(&object.name, token.as_deref())?.to_string();
        Ok(RemoteEntry {
            name: object.name.rsplit('/').next().unwrap_or_default().to_string(),
            id: object.name,
            kind: EntryKind::Object,
            web_link: Some(web_link),
            shared_publicly: token.is_some(),
        })
    }

    async fn authorized(&self, request: RequestBuilder) -> Result<RequestBuilder> {
        Ok(request.bearer_auth(self.tokens.access_token().await?))
    }
}

fn segment_url(base: &str, key: &str) -> Result<Url> {
    let mut url = Url::parse(base).map_err(|e| BackupError::RemoteStore(format!("Invalid URL {}: {}", base, e)))?;
    url.path_segments_mut()
        .map_err(|_| BackupError::RemoteStore(format!("Invalid base URL {}", base)))?
        .push(key);
    Ok(url)
}

fn join_key(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", prefix.trim_end_matches('/'), name)
    }
}

async fn ensure_success(response: Response, action: &str) -> Result<Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    Err(BackupError::RemoteStore(format!(
        "Firebase Storage {} failed: {} - {}",
        action, status, text
    )))
}

#[async_trait]
impl StorageBackend for FirebaseBackend {
    fn name(&self) -> &'static str {
        "Firebase Storage"
    }

    fn top_level_id(&self) -> String {
        String::new()
    }

    async fn find_child(&self, parent_id: &str, name: &str, kind: EntryKind) -> Result<Option<RemoteEntry>> {
        let key = join_key(parent_id, name);
        match kind {
            EntryKind::Folder => Ok(Some(RemoteEntry {
                id: key,
                name: name.to_string(),
                kind: EntryKind::Folder,
                web_link: None,
                shared_publicly: false,
            })),
            EntryKind::Object => self.get_entry(&key).await,
        }
    }

    async fn create_folder(&self, parent_id: &str, name: &str) -> Result<String> {
        Ok(join_key(parent_id, name))
    }

    async fn create_object(
        &self,
        parent_id: &str,
        name: &str,
        content_type: &str,
        local_path: &Path,
    ) -> Result<RemoteEntry> {
        let key = join_key(parent_id, name);
        let file = tokio::fs::File::open(local_path).await?;
        let length = file.metadata().await?.len();
        debug!("Uploading {} bytes to gs://{}/{}", length, self.bucket, key);

        let request = self
            .client
            .post(format!("{}/b/{}/o", self.upload_base, self.bucket))
            .query(&[("uploadType", "media"), ("name", key.as_str())])
            .header(CONTENT_TYPE, content_type)
            .header(CONTENT_LENGTH, length)
            .body(Body::wrap_stream(ReaderStream::new(file)));
        let response = self.authorized(request).await?.send().await?;
        let object: StorageObject = ensure_success(response, "upload").await?.json().await?;

        self.to_entry(object)
    }

    async fn delete_entry(&self, id: &str) -> Result<bool> {
        let request = self.client.delete(self.object_url(id)?);
        let response = self.authorized(request).await?.send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        ensure_success(response, "delete").await?;
        Ok(true)
    }

    async fn get_entry(&self, id: &str) -> Result<Option<RemoteEntry>> {
        let request = self.client.get(self.object_url(id)?);
        let response = self.authorized(request).await?.send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let object: StorageObject = ensure_success(response, "get object").await?.json().await?;
        Ok(Some(self.to_entry(object)?))
    }

    async fn grant_public_read(&self, id: &str) -> Result<()> {
        let token = uuid::Uuid::new_v4().to_string();
        let body = serde_json::json!({ "metadata": { DOWNLOAD_TOKEN_KEY: token } });
        let request = self.client.patch(self.object_url(id)?).json(&body);
        let response = self.authorized(request).await?.send().await?;
        ensure_success(response, "add download token").await?;
        Ok(())
    }
}
