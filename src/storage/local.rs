use async_trait::async_trait;
use bytes::Bytes;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

use super::{ByteStream, DeviceStorage, StorageError, StoredFile};
use crate::codec;

/// Device storage rooted in a local directory.
///
/// Uploads land at `<base>/<key>/<file name>`, so the original name is kept on
/// disk and two uploads with the same name never collide.
pub struct LocalStorage {
    base_path: PathBuf,
}

impl LocalStorage {
    pub fn new<P: AsRef<Path>>(base_path: P) -> Result<Self, std::io::Error> {
        let base_path = base_path.as_ref().to_path_buf();
        std::fs::create_dir_all(&base_path)?;
        Ok(Self { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }
}

fn not_found(storage_ref: &str, e: std::io::Error) -> StorageError {
    if e.kind() == ErrorKind::NotFound {
        StorageError::NotFound(storage_ref.to_string())
    } else {
        StorageError::Io(e)
    }
}

async fn write_then_rename(partial: &Path, path: &Path, data: &[u8]) -> std::io::Result<()> {
    tokio::fs::write(partial, data).await?;
    tokio::fs::rename(partial, path).await
}

/// Remove what a failed write left behind: the partial file, then the
/// upload slot if nothing else is in it.
async fn discard_partial(dir: &Path, partial: &Path) {
    match tokio::fs::remove_file(partial).await {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!(path = %partial.display(), error = %e, "Failed to remove partial file"),
    }
    if let Err(e) = tokio::fs::remove_dir(dir).await {
        debug!(path = %dir.display(), error = %e, "Upload slot left in place");
    }
}

#[async_trait]
impl DeviceStorage for LocalStorage {
    async fn write_encoded(
        &self,
        key: &str,
        file_name: &str,
        encoded: &str,
    ) -> Result<StoredFile, StorageError> {
        let data = codec::decode(encoded)?;

        let dir = self.base_path.join(key);
        tokio::fs::create_dir_all(&dir).await?;

        let path = dir.join(file_name);
        let partial = dir.join(format!(".{file_name}.part"));
        if let Err(e) = write_then_rename(&partial, &path, &data).await {
            discard_partial(&dir, &partial).await;
            return Err(e.into());
        }

        Ok(StoredFile {
            storage_ref: path.to_string_lossy().into_owned(),
            size: data.len() as u64,
        })
    }

    async fn read(&self, storage_ref: &str) -> Result<Bytes, StorageError> {
        let data = tokio::fs::read(storage_ref)
            .await
            .map_err(|e| not_found(storage_ref, e))?;
        Ok(Bytes::from(data))
    }

    async fn open(&self, storage_ref: &str) -> Result<(ByteStream, u64), StorageError> {
        let file = tokio::fs::File::open(storage_ref)
            .await
            .map_err(|e| not_found(storage_ref, e))?;
        let len = file.metadata().await?.len();
        Ok((Box::pin(ReaderStream::new(file)), len))
    }

    async fn delete(&self, storage_ref: &str) -> Result<(), StorageError> {
        let path = Path::new(storage_ref);
        match tokio::fs::remove_file(path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        }

        // Drop the per-upload slot once it is empty.
        if let Some(parent) = path.parent() {
            if parent != self.base_path && parent.starts_with(&self.base_path) {
                let _ = tokio::fs::remove_dir(parent).await;
            }
        }
        Ok(())
    }
}
