//! Upload and download routes
//!
//! `POST /` and `PUT /` accept a multipart form with a `file` field and an
//! optional `x-ttl` header. `GET /` returns the blob named by `x-file-id`.

use std::io::Cursor;
use std::net::SocketAddr;

use axum::{
    body::Body,
    extract::{multipart::MultipartError, ConnectInfo, Multipart, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::{FILE_ID_HEADER, TTL_HEADER};
use crate::duration::format_duration;
use crate::error::{AppError, Result};
use crate::state::AppState;
use crate::upload::UploadContext;

/// Create the files router
pub fn router() -> Router<AppState> {
    Router::new().route("/", get(download).post(upload).put(upload))
}

#[derive(Serialize)]
pub struct UploadResponse {
    pub id: String,
    pub ttl: String,
    pub expires_at: DateTime<Utc>,
}

/// Remote address for audit logs: `X-Real-IP` if present, else the peer
fn remote_addr(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

fn multipart_error(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge("Upload exceeds the configured limit".to_string())
    } else {
        tracing::warn!("Failed to read multipart upload: {}", e);
        AppError::BadRequest("Failed to read upload".to_string())
    }
}

/// Accept a multipart upload
async fn upload(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Response> {
    let remote_addr = remote_addr(&headers, peer.map(|ConnectInfo(addr)| addr));
    let requested_ttl = headers
        .get(TTL_HEADER)
        .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned());

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("file") {
            tracing::debug!("Ignoring multipart field {:?}", field.name());
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        let data = field.bytes().await.map_err(multipart_error)?;
        let size = data.len() as u64;

        let ctx = UploadContext {
            filename,
            remote_addr,
            requested_ttl,
        };
        let coordinator = state.coordinator().clone();
        let receipt =
            tokio::task::spawn_blocking(move || coordinator.accept(&ctx, size, Cursor::new(data)))
                .await
                .map_err(|e| AppError::Internal(format!("Upload task failed: {}", e)))??;

        let id = receipt.id.to_string();
        let ttl = format_duration(receipt.ttl);
        let body = Json(UploadResponse {
            id: id.clone(),
            ttl: ttl.clone(),
            expires_at: receipt.expires_at,
        });

        return Ok(([(FILE_ID_HEADER, id), (TTL_HEADER, ttl)], body).into_response());
    }

    tracing::warn!(remote_addr = %remote_addr, "No file field found in multipart upload");
    Err(AppError::BadRequest(
        "No file provided. Use field name 'file'".to_string(),
    ))
}

/// Serve a blob by identifier
async fn download(State(state): State<AppState>, headers: HeaderMap) -> Result<Response> {
    let id = headers
        .get(FILE_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| AppError::BadRequest(format!("Missing {} header", FILE_ID_HEADER)))?
        .to_string();

    let store = state.store().clone();
    let bytes = tokio::task::spawn_blocking(move || store.get(&id))
        .await
        .map_err(|e| AppError::Internal(format!("Download task failed: {}", e)))??;

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(header::CONTENT_LENGTH, bytes.len())
        .body(Body::from(bytes))
        .map_err(|e| AppError::Internal(e.to_string()))
}
