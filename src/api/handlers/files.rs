use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use std::sync::Arc;

use crate::api::response::{ApiError, Empty, Envelope};
use crate::codec;
use crate::registry::{Direction, TransferRecord};
use crate::storage::StorageError;
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSummary {
    pub id: String,
    pub name: String,
    pub size: u64,
    pub mime_type: String,
    pub direction: Direction,
    pub download_url: String,
}

#[derive(Debug, Serialize)]
pub struct FileList {
    pub files: Vec<FileSummary>,
}

/// Download variant for clients that can only consume text payloads.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataUriDownload {
    pub filename: String,
    pub data_uri: String,
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn list_files(State(state): State<Arc<AppState>>) -> Json<Envelope<FileList>> {
    let files = state.registry.list();
    Envelope::success(FileList {
        files: files.iter().map(file_to_summary).collect(),
    })
}

pub async fn download_file(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let file = state
        .registry
        .get(&id)
        .ok_or_else(|| ApiError::not_found("File not found"))?;

    if wants_json(&headers) {
        let data = state
            .storage
            .read(&file.storage_ref)
            .await
            .map_err(|e| read_error(&file, e))?;

        return Ok(Envelope::success(DataUriDownload {
            data_uri: codec::data_uri(&file.mime_type, &data),
            filename: file.name,
        })
        .into_response());
    }

    let (stream, len) = state
        .storage
        .open(&file.storage_ref)
        .await
        .map_err(|e| read_error(&file, e))?;

    let mut response = (StatusCode::OK, Body::from_stream(stream)).into_response();
    let headers = response.headers_mut();

    headers.insert(
        header::CONTENT_TYPE,
        file.mime_type
            .parse()
            .unwrap_or(HeaderValue::from_static("application/octet-stream")),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    if let Ok(value) = HeaderValue::from_str(&content_disposition(&file.name)) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }

    tracing::debug!(file_id = %file.id, bytes = len, "Serving file");
    Ok(response)
}

/// Remove a file from the session. Unknown ids are not an error.
pub async fn delete_file(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Json<Envelope<Empty>> {
    if let Some(file) = state.registry.remove(&id) {
        // Only uploads are ours to delete; shared files belong to the device.
        if file.direction == Direction::Received {
            if let Err(e) = state.storage.delete(&file.storage_ref).await {
                tracing::warn!(file_id = %id, error = %e, "Failed to delete stored file");
            }
        }
        tracing::info!(file_id = %id, name = %file.name, "Removed file");
    }

    Envelope::success(Empty {})
}

// ============================================================================
// Helpers
// ============================================================================

fn file_to_summary(file: &TransferRecord) -> FileSummary {
    FileSummary {
        id: file.id.clone(),
        name: file.name.clone(),
        size: file.size,
        mime_type: file.mime_type.clone(),
        direction: file.direction,
        download_url: format!("/api/files/{}", urlencoding::encode(&file.id)),
    }
}

fn wants_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .and_then(|accept| accept.split(',').next())
        .is_some_and(|first| first.trim().starts_with("application/json"))
}

fn read_error(file: &TransferRecord, e: StorageError) -> ApiError {
    tracing::warn!(file_id = %file.id, storage_ref = %file.storage_ref, error = %e, "Failed to read stored file");
    ApiError::not_found("File not found")
}

/// `attachment` disposition with an ASCII fallback name plus the exact
/// UTF-8 name.
fn content_disposition(name: &str) -> String {
    let fallback: String = name
        .chars()
        .map(|c| {
            if (c.is_ascii_graphic() && c != '"' && c != '\\') || c == ' ' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!(
        "attachment; filename=\"{fallback}\"; filename*=UTF-8''{}",
        urlencoding::encode(name)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_disposition_ascii() {
        assert_eq!(
            content_disposition("a.txt"),
            "attachment; filename=\"a.txt\"; filename*=UTF-8''a.txt"
        );
    }

    #[test]
    fn test_content_disposition_escapes_quotes_and_unicode() {
        let value = content_disposition("my \"cv\" é.pdf");
        assert!(value.starts_with("attachment; filename=\"my _cv_ _.pdf\""));
        assert!(value.ends_with("filename*=UTF-8''my%20%22cv%22%20%C3%A9.pdf"));
        assert!(HeaderValue::from_str(&value).is_ok());
    }

    #[test]
    fn test_wants_json() {
        let mut headers = HeaderMap::new();
        assert!(!wants_json(&headers));

        headers.insert(header::ACCEPT, HeaderValue::from_static("*/*"));
        assert!(!wants_json(&headers));

        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("application/json, text/plain, */*"),
        );
        assert!(wants_json(&headers));
    }

    #[test]
    fn test_download_url_is_percent_encoded() {
        let record = TransferRecord {
            id: "doc 1/2".to_string(),
            name: "a".to_string(),
            storage_ref: "/tmp/a".to_string(),
            size: 1,
            mime_type: "text/plain".to_string(),
            created_at: chrono::Utc::now(),
            direction: Direction::Sent,
        };
        assert_eq!(file_to_summary(&record).download_url, "/api/files/doc%201%2F2");
    }
}
