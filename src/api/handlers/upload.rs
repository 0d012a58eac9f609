use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::api::response::{ApiError, Envelope};
use crate::codec;
use crate::multipart::{self, DEFAULT_MIME_TYPE};
use crate::registry::{generate_id, guess_mime_type, Direction, TransferRecord};
use crate::storage::{sanitize_file_name, StorageError};
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

/// JSON upload body, for clients without multipart support.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JsonUpload {
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
    /// File content, base64 encoded
    #[serde(default)]
    pub data: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub file: TransferRecord,
}

/// An upload reduced to what storage needs, whichever format it came in.
struct IncomingFile {
    filename: Option<String>,
    mime_type: Option<String>,
    encoded: String,
}

// ============================================================================
// Handler
// ============================================================================

/// Accept one file as `application/json` or `multipart/form-data`.
pub async fn upload_file(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<Envelope<UploadResponse>>, ApiError> {
    let body = body.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::payload_too_large(format!(
                "File exceeds maximum upload size of {} bytes",
                state.config.max_upload_size
            ))
        } else {
            ApiError::bad_request(format!("Failed to read request body: {rejection}"))
        }
    })?;

    if body.is_empty() {
        return Err(ApiError::bad_request("No data received"));
    }

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    let incoming = if is_json(content_type) {
        from_json(&body)?
    } else {
        from_multipart(content_type, &body)?
    };

    let file = store_upload(&state, incoming).await?;
    Ok(Envelope::success(UploadResponse { file }))
}

// ============================================================================
// Helpers
// ============================================================================

fn is_json(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .is_some_and(|essence| essence.trim().eq_ignore_ascii_case("application/json"))
}

fn from_json(body: &[u8]) -> Result<IncomingFile, ApiError> {
    let upload: JsonUpload = serde_json::from_slice(body)
        .map_err(|_| ApiError::bad_request("Malformed JSON in request body"))?;

    let encoded = upload
        .data
        .filter(|data| !data.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("No file data provided"))?;

    Ok(IncomingFile {
        filename: upload.filename,
        mime_type: upload.mime_type,
        encoded,
    })
}

/// Browsers send the boundary in `Content-Type`; bridges that drop headers
/// leave it to be sniffed from the body.
fn from_multipart(content_type: &str, body: &[u8]) -> Result<IncomingFile, ApiError> {
    let boundary = multipart::boundary_from_content_type(content_type)
        .or_else(|| multipart::extract_boundary(body))
        .ok_or_else(|| ApiError::bad_request("Invalid upload: no multipart boundary found"))?;

    let field = multipart::decode(body, &boundary)
        .map_err(|e| ApiError::bad_request(format!("Invalid upload: {e}")))?;

    Ok(IncomingFile {
        filename: Some(field.filename),
        mime_type: Some(field.mime_type),
        encoded: codec::encode(&field.raw_bytes),
    })
}

/// Write the payload, then register it. The record only becomes visible once
/// the file is complete on disk.
async fn store_upload(state: &AppState, incoming: IncomingFile) -> Result<TransferRecord, ApiError> {
    let name = incoming
        .filename
        .as_deref()
        .filter(|n| !n.trim().is_empty())
        .map(sanitize_file_name)
        .unwrap_or_else(|| format!("upload_{}", Utc::now().timestamp_millis()));

    // Prefer the declared type unless it is the generic fallback
    let mime_type = incoming
        .mime_type
        .filter(|m| !m.trim().is_empty() && m != DEFAULT_MIME_TYPE)
        .unwrap_or_else(|| guess_mime_type(&name));

    let id = generate_id("upload");
    let stored = state
        .storage
        .write_encoded(&id, &name, &incoming.encoded)
        .await
        .map_err(|e| match e {
            StorageError::Encoding(e) => ApiError::bad_request(format!("Invalid upload: {e}")),
            e => ApiError::internal(format!("Upload failed: {e}")),
        })?;

    let record = TransferRecord {
        id,
        name,
        storage_ref: stored.storage_ref,
        size: stored.size,
        mime_type,
        created_at: Utc::now(),
        direction: Direction::Received,
    };

    if !state.registry.add(record.clone()) {
        if let Err(e) = state.storage.delete(&record.storage_ref).await {
            tracing::warn!(file_id = %record.id, error = %e, "Failed to delete stored file");
        }
        return Err(ApiError::internal("Upload failed: duplicate file id"));
    }

    tracing::info!(
        file_id = %record.id,
        name = %record.name,
        bytes = record.size,
        "Received file"
    );
    Ok(record)
}
