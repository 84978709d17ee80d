use super::state::{AppState, BackupEntry};
use crate::backup::pipeline::ConnectionReport;
use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

#[derive(Serialize)]
struct ApiResponse<T: Serialize> {
    success: bool,
    data: T,
}

#[derive(Deserialize)]
struct ObjectQuery {
    id: String,
}

#[derive(Serialize)]
struct BackupResponse {
    database: String,
    local_backup: PathBuf,
    local_zip: PathBuf,
    checksum: Option<String>,
    created_at: DateTime<Utc>,
    remote_id: Option<String>,
    remote_url: Option<String>,
    message: String,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/hello", get(hello_handler))
        .route("/api/v1/backups/:name", get(backup_handler))
        .route("/api/v1/objects", delete(delete_object_handler))
        .route("/api/v1/objects/link", get(object_link_handler))
        .route("/api/status", get(status_handler))
        .route("/api/history", get(history_handler))
        .route("/api/scheduler", get(scheduler_handler))
        .with_state(state)
}

pub async fn start_server(state: Arc<AppState>, port: u16) {
    let shutdown = state.shutdown.clone();
    let app = router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!("Starting HTTP API on http://localhost:{}", port);

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            return;
        }
    };

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await;
    if let Err(e) = served {
        error!("Web server error: {}", e);
    }
}

fn check_auth(headers: &HeaderMap, state: &AppState) -> bool {
    if !state.auth_required() {
        return true;
    }

    let Some(auth_str) = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
    else {
        return false;
    };

    let Some(encoded) = auth_str.strip_prefix("Basic ") else {
        return false;
    };
    let Some(credentials) = STANDARD
        .decode(encoded)
        .ok()
        .and_then(|d| String::from_utf8(d).ok())
    else {
        return false;
    };

    match credentials.split_once(':') {
        Some((username, password)) => state.check_credentials(username, password),
        None => false,
    }
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, "Basic realm=\"Azurite Backup\"")],
        "Unauthorized",
    )
        .into_response()
}

fn failure(status: StatusCode, message: String) -> Response {
    (status, Json(json!({ "success": false, "error": message }))).into_response()
}

async fn hello_handler() -> &'static str {
    "Hello world, this is Azurite Backup."
}

async fn backup_handler(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    headers: HeaderMap,
) -> Response {
    if !check_auth(&headers, &state) {
        return unauthorized();
    }

    let connection = match state.registry.find(&name) {
        Ok(c) => c.clone(),
        Err(e) => return failure(StatusCode::NOT_FOUND, e.to_string()),
    };

    info!(database = %connection.name, "On-demand backup requested");
    let started = Instant::now();
    let cancel = state.shutdown.child_token();

    match state.pipeline.run_one(&connection, &cancel).await {
        Ok(outcome) => {
            state
                .add_backup_entry(BackupEntry::from(&ConnectionReport {
                    connection_name: outcome.database.clone(),
                    success: outcome.upload.success,
                    remote_url: outcome.upload.remote_url.clone(),
                    error: (!outcome.upload.success).then(|| outcome.upload.message.clone()),
                    duration_secs: started.elapsed().as_secs(),
                }))
                .await;

            Json(BackupResponse {
                database: outcome.database,
                local_backup: outcome.local_backup,
                local_zip: outcome.local_zip,
                checksum: outcome.checksum,
                created_at: outcome.backup_created_at,
                remote_id: outcome.upload.remote_id,
                remote_url: outcome.upload.remote_url,
                message: outcome.upload.message,
            })
            .into_response()
        }
        Err(e) => {
            error!(database = %connection.name, "Backup failed: {}", e);
            state
                .add_backup_entry(BackupEntry::from(&ConnectionReport {
                    connection_name: connection.name.clone(),
                    success: false,
                    remote_url: None,
                    error: Some(e.to_string()),
                    duration_secs: started.elapsed().as_secs(),
                }))
                .await;
            failure(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Backup failed for {}: {}", connection.name, e),
            )
        }
    }
}

async fn object_link_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ObjectQuery>,
    headers: HeaderMap,
) -> Response {
    if !check_auth(&headers, &state) {
        return unauthorized();
    }

    let store = match state.pipeline.store() {
        Ok(store) => store,
        Err(e) => return failure(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };
    match store.get_public_url(&query.id, &state.shutdown.child_token()).await {
        Some(url) => Json(ApiResponse {
            success: true,
            data: json!({ "id": query.id, "url": url }),
        })
        .into_response(),
        None => failure(StatusCode::NOT_FOUND, format!("No public link for {}", query.id)),
    }
}

async fn delete_object_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ObjectQuery>,
    headers: HeaderMap,
) -> Response {
    if !check_auth(&headers, &state) {
        return unauthorized();
    }

    let store = match state.pipeline.store() {
        Ok(store) => store,
        Err(e) => return failure(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };
    match store.delete(&query.id, &state.shutdown.child_token()).await {
        Ok(()) => Json(ApiResponse {
            success: true,
            data: json!({ "id": query.id }),
        })
        .into_response(),
        Err(e) => {
            error!("Delete of {} failed: {}", query.id, e);
            failure(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

async fn status_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Response {
    if !check_auth(&headers, &state) {
        return unauthorized();
    }

    let scheduler = state.scheduler.read().await;
    let history = state.history.read().await;

    let total_backups = history.len();
    let successful_backups = history.iter().filter(|b| b.success).count();

    #[derive(Serialize)]
    struct StatusData {
        scheduler_running: bool,
        next_run: Option<String>,
        schedule: String,
        total_backups: usize,
        successful_backups: usize,
        success_rate: f64,
        database_connections: usize,
    }

    let data = StatusData {
        scheduler_running: scheduler.running,
        next_run: scheduler.next_run.map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string()),
        schedule: scheduler.schedule.clone(),
        total_backups,
        successful_backups,
        success_rate: if total_backups > 0 {
            (successful_backups as f64 / total_backups as f64) * 100.0
        } else {
            100.0
        },
        database_connections: state.registry.len(),
    };

    Json(ApiResponse { success: true, data }).into_response()
}

async fn history_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Response {
    if !check_auth(&headers, &state) {
        return unauthorized();
    }

    let history = state.history.read().await;
    Json(ApiResponse {
        success: true,
        data: history.clone(),
    })
    .into_response()
}

async fn scheduler_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Response {
    if !check_auth(&headers, &state) {
        return unauthorized();
    }

    let scheduler = state.scheduler.read().await.clone();
    let logs = state.scheduler_logs.read().await.clone();
    Json(ApiResponse {
        success: true,
        data: json!({ "status": scheduler, "logs": logs }),
    })
    .into_response()
}
