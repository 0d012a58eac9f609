use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::multipart::DEFAULT_MIME_TYPE;

/// Which way a file travels relative to this device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Offered by the device to peers.
    Sent,
    /// Uploaded by a peer.
    Received,
}

/// A file known to the current session.
///
/// The registry only ever holds metadata and a reference to a file that is
/// already fully written to device storage; records are never edited in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRecord {
    pub id: String,
    pub name: String,
    pub storage_ref: String,
    pub size: u64,
    pub mime_type: String,
    pub created_at: DateTime<Utc>,
    pub direction: Direction,
}

impl TransferRecord {
    /// Describe a file the device offers to peers, e.g. one picked by the user.
    pub fn shared_from_path(path: &Path) -> std::io::Result<Self> {
        let metadata = std::fs::metadata(path)?;
        if !metadata.is_file() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{} is not a regular file", path.display()),
            ));
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("doc_{}", Utc::now().timestamp_millis()));

        Ok(Self {
            id: generate_id("doc"),
            mime_type: guess_mime_type(&name),
            name,
            storage_ref: path.to_string_lossy().into_owned(),
            size: metadata.len(),
            created_at: Utc::now(),
            direction: Direction::Sent,
        })
    }
}

/// Build a record id from a prefix, the current time in milliseconds and a
/// random suffix, e.g. `upload_1718000000000_3f9c2a71b`.
pub fn generate_id(prefix: &str) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!(
        "{prefix}_{}_{}",
        Utc::now().timestamp_millis(),
        &suffix[..9]
    )
}

/// Guess a MIME type from a file name, falling back to `application/octet-stream`.
pub fn guess_mime_type(file_name: &str) -> String {
    mime_guess::from_path(file_name)
        .first()
        .map(|m| m.to_string())
        .unwrap_or_else(|| DEFAULT_MIME_TYPE.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_id_shape() {
        let id = generate_id("upload");
        let parts: Vec<&str> = id.split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "upload");
        assert!(parts[1].parse::<i64>().is_ok());
        assert_eq!(parts[2].len(), 9);
        assert_ne!(id, generate_id("upload"));
    }

    #[test]
    fn test_guess_mime_type() {
        assert_eq!(guess_mime_type("photo.JPG"), "image/jpeg");
        assert_eq!(guess_mime_type("notes.txt"), "text/plain");
        assert_eq!(guess_mime_type("no-extension"), DEFAULT_MIME_TYPE);
    }

    #[test]
    fn test_record_wire_format() {
        let record = TransferRecord {
            id: "doc_1_abc".to_string(),
            name: "a.txt".to_string(),
            storage_ref: "/tmp/a.txt".to_string(),
            size: 5,
            mime_type: "text/plain".to_string(),
            created_at: Utc::now(),
            direction: Direction::Received,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["storageRef"], "/tmp/a.txt");
        assert_eq!(json["mimeType"], "text/plain");
        assert_eq!(json["direction"], "received");
        assert!(json["createdAt"].is_string());
    }

    #[test]
    fn test_shared_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.pdf");
        std::fs::write(&path, b"%PDF-1.7").unwrap();

        let record = TransferRecord::shared_from_path(&path).unwrap();
        assert!(record.id.starts_with("doc_"));
        assert_eq!(record.name, "report.pdf");
        assert_eq!(record.size, 8);
        assert_eq!(record.mime_type, "application/pdf");
        assert_eq!(record.direction, Direction::Sent);

        assert!(TransferRecord::shared_from_path(dir.path()).is_err());
    }
}
