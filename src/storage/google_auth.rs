use crate::config::{DriveAuthMethod, GoogleDriveConfig};
use crate::error::{BackupError, Result};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

pub const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive";
pub const STORAGE_SCOPE: &str = "https://www.googleapis.com/auth/devstorage.read_write";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ClientSecret {
    client_id: String,
    client_secret: String,
    #[serde(default = "default_token_uri")]
    token_uri: String,
}

#[derive(Debug, Deserialize)]
struct ClientSecretFile {
    installed: Option<ClientSecret>,
    web: Option<ClientSecret>,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

enum Credentials {
    ServiceAccount(ServiceAccountKey),
    RefreshToken {
        secret: ClientSecret,
        refresh_token: String,
    },
    Fixed(String),
}

#[derive(Serialize)]
struct JwtClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: u64,
    exp: u64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// Hands out OAuth2 bearer tokens for Google APIs, refreshing them shortly
/// before they expire.
pub struct TokenSource {
    client: Client,
    credentials: Credentials,
    scope: String,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenSource {
    pub fn fixed(token: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            credentials: Credentials::Fixed(token.into()),
            scope: String::new(),
            cached: Mutex::new(None),
        }
    }

    pub fn service_account(client: Client, key_path: &Path, scope: &str) -> Result<Self> {
        let key: ServiceAccountKey = serde_json::from_str(&std::fs::read_to_string(key_path)?)?;
        Ok(Self {
            client,
            credentials: Credentials::ServiceAccount(key),
            scope: scope.to_string(),
            cached: Mutex::new(None),
        })
    }

    pub fn for_drive(client: Client, config: &GoogleDriveConfig) -> Result<Self> {
        match config.method {
            DriveAuthMethod::AccessToken => {
                let token = config.access_token.clone().ok_or_else(|| {
                    BackupError::Config("google_drive.access_token is required".to_string())
                })?;
                Ok(Self::fixed(token))
            }
            DriveAuthMethod::ServiceAccount => {
                let path = credentials_path(config)?;
                Self::service_account(client, path, DRIVE_SCOPE)
            }
            DriveAuthMethod::OAuth2 => {
                let path = credentials_path(config)?;
                let file: ClientSecretFile = serde_json::from_str(&std::fs::read_to_string(path)?)?;
                let secret = file.installed.or(file.web).ok_or_else(|| {
                    BackupError::Config(format!(
                        "{} is not an OAuth client secret file",
                        path.display()
                    ))
                })?;
                let refresh_token = config.refresh_token.clone().ok_or_else(|| {
                    BackupError::Config("google_drive.refresh_token is required for oauth2".to_string())
                })?;
                Ok(Self {
                    client,
                    credentials: Credentials::RefreshToken {
                        secret,
                        refresh_token,
                    },
                    scope: DRIVE_SCOPE.to_string(),
                    cached: Mutex::new(None),
                })
            }
        }
    }

    pub async fn access_token(&self) -> Result<String> {
        if let Credentials::Fixed(token) = &self.credentials {
            return Ok(token.clone());
        }

        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() + EXPIRY_MARGIN < token.expires_at {
                return Ok(token.value.clone());
            }
        }

        let response = self.request_token().await?;
        debug!("Obtained Google access token valid for {}s", response.expires_in);
        let value = response.access_token.clone();
        *cached = Some(CachedToken {
            value: response.access_token,
            expires_at: Instant::now() + Duration::from_secs(response.expires_in),
        });
        Ok(value)
    }

    async fn request_token(&self) -> Result<TokenResponse> {
        let request = match &self.credentials {
            Credentials::ServiceAccount(key) => {
                let iat = chrono::Utc::now().timestamp().max(0) as u64;
                let claims = JwtClaims {
                    iss: &key.client_email,
                    scope: &self.scope,
                    aud: &key.token_uri,
                    iat,
                    exp: iat + 3600,
                };
                let assertion = jsonwebtoken::encode(
                    &Header::new(Algorithm::RS256),
                    &claims,
                    &EncodingKey::from_rsa_pem(key.private_key.as_bytes())?,
                )?;
                self.client.post(&key.token_uri).form(&[
                    ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                    ("assertion", assertion.as_str()),
                ])
            }
            Credentials::RefreshToken {
                secret,
                refresh_token,
            } => self.client.post(&secret.token_uri).form(&[
                ("grant_type", "refresh_token"),
                ("client_id", secret.client_id.as_str()),
                ("client_secret", secret.client_secret.as_str()),
                ("refresh_token", refresh_token.as_str()),
            ]),
            Credentials::Fixed(token) => {
                return Ok(TokenResponse {
                    access_token: token.clone(),
                    expires_in: default_expires_in(),
                })
            }
        };

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(BackupError::RemoteStore(format!(
                "Token request failed: {} - {}",
                status, text
            )));
        }
        Ok(response.json().await?)
    }
}

fn credentials_path(config: &GoogleDriveConfig) -> Result<&Path> {
    config.credentials_json_path.as_deref().ok_or_else(|| {
        BackupError::Config("google_drive.credentials_json_path is required".to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_fixed_token() {
        let source = TokenSource::fixed("abc");
        assert_eq!(source.access_token().await.unwrap(), "abc");
    }

    #[tokio::test]
    async fn test_refresh_token_is_cached() {
        let server = MockServer::start_async().await;
        let token = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/token")
                    .body_contains("grant_type=refresh_token")
                    .body_contains("refresh_token=r1");
                then.status(200)
                    .json_body(serde_json::json!({ "access_token": "ya29.test", "expires_in": 3600 }));
            })
            .await;

        let dir = tempdir().unwrap();
        let secret_path = dir.path().join("client_secret.json");
        std::fs::write(
            &secret_path,
            serde_json::json!({
                "installed": {
                    "client_id": "cid",
                    "client_secret": "csecret",
                    "token_uri": server.url("/token")
                }
            })
            .to_string(),
        )
        .unwrap();

        let config = GoogleDriveConfig {
            method: DriveAuthMethod::OAuth2,
            credentials_json_path: Some(secret_path),
            refresh_token: Some("r1".to_string()),
            access_token: None,
            application_name: "AzuriteHub".to_string(),
            root_folder_id: None,
        };
        let source = TokenSource::for_drive(Client::new(), &config).unwrap();

        assert_eq!(source.access_token().await.unwrap(), "ya29.test");
        assert_eq!(source.access_token().await.unwrap(), "ya29.test");
        token.assert_hits_async(1).await;
    }

    #[test]
    fn test_missing_access_token_is_config_error() {
        let config = GoogleDriveConfig {
            method: DriveAuthMethod::AccessToken,
            credentials_json_path: None,
            refresh_token: None,
            access_token: None,
            application_name: "AzuriteHub".to_string(),
            root_folder_id: None,
        };
        assert!(matches!(
            TokenSource::for_drive(Client::new(), &config),
            Err(BackupError::Config(_))
        ));
    }
}
