mod local;

pub use local::LocalStorage;

use std::io;
use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::Stream;
use thiserror::Error;

use crate::codec::{self, CodecError};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("File not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Encoding(#[from] CodecError),
}

/// Where a completed write landed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub storage_ref: String,
    pub size: u64,
}

pub type ByteStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>;

/// Device storage as seen by the transfer server.
///
/// Writes accept base64 text only, the same contract the device's native
/// write primitive offers. A written file becomes visible under its final
/// `storage_ref` only once it is complete.
#[async_trait]
pub trait DeviceStorage: Send + Sync {
    /// Store a base64 payload as `file_name` in a slot reserved for `key`.
    async fn write_encoded(
        &self,
        key: &str,
        file_name: &str,
        encoded: &str,
    ) -> Result<StoredFile, StorageError>;

    async fn read(&self, storage_ref: &str) -> Result<Bytes, StorageError>;

    /// Open a file for streaming. Returns the stream and the file length.
    async fn open(&self, storage_ref: &str) -> Result<(ByteStream, u64), StorageError>;

    async fn delete(&self, storage_ref: &str) -> Result<(), StorageError>;

    async fn read_encoded(&self, storage_ref: &str) -> Result<String, StorageError> {
        let data = self.read(storage_ref).await?;
        Ok(codec::encode(&data))
    }
}

/// Reduce an uploaded name to a single safe path component.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base.chars().filter(|c| !c.is_control()).collect();
    match cleaned.trim() {
        "" | "." | ".." => crate::multipart::DEFAULT_FILENAME.to_string(),
        name => name.to_string(),
    }
}
