use std::sync::Arc;

use tokio::sync::watch;

use super::{FileRegistry, Snapshot, TransferRecord};

/// In-memory registry for the current session.
///
/// The list lives in a watch channel: each mutation swaps in a new snapshot,
/// so readers never observe a half-applied change and the embedding
/// application can subscribe to updates.
pub struct SessionRegistry {
    files: watch::Sender<Snapshot>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        let (files, _) = watch::channel(Arc::new(Vec::new()));
        Self { files }
    }

    /// Receive every new snapshot after a mutation.
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.files.subscribe()
    }

    pub fn len(&self) -> usize {
        self.files.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.borrow().is_empty()
    }
}

impl FileRegistry for SessionRegistry {
    fn list(&self) -> Snapshot {
        Arc::clone(&self.files.borrow())
    }

    fn add(&self, record: TransferRecord) -> bool {
        let id = record.id.clone();
        let added = self.files.send_if_modified(|files| {
            if files.iter().any(|f| f.id == record.id) {
                return false;
            }
            let mut next = Vec::with_capacity(files.len() + 1);
            next.extend(files.iter().cloned());
            next.push(record);
            *files = Arc::new(next);
            true
        });

        if added {
            tracing::debug!(file_id = %id, "Registered file");
        } else {
            tracing::warn!(file_id = %id, "Ignoring duplicate file id");
        }
        added
    }

    fn remove(&self, id: &str) -> Option<TransferRecord> {
        let mut removed = None;
        self.files.send_if_modified(|files| {
            let Some(index) = files.iter().position(|f| f.id == id) else {
                return false;
            };
            let mut next: Vec<TransferRecord> = files.as_ref().clone();
            removed = Some(next.remove(index));
            *files = Arc::new(next);
            true
        });

        if removed.is_some() {
            tracing::debug!(file_id = %id, "Unregistered file");
        }
        removed
    }
}
