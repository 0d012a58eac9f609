pub mod models;
mod session;

pub use models::{generate_id, guess_mime_type, Direction, TransferRecord};
pub use session::SessionRegistry;

use std::sync::Arc;

/// An immutable view of the registry at one point in time.
pub type Snapshot = Arc<Vec<TransferRecord>>;

/// The registry contract the HTTP layer is handed by the embedding application.
///
/// Every call is a single atomic read or write. Implementations must keep
/// insertion order and never hold their lock across file-system I/O.
pub trait FileRegistry: Send + Sync {
    /// Current records in insertion order.
    fn list(&self) -> Snapshot;

    /// Append a record. Returns `false` if a record with the same id exists.
    fn add(&self, record: TransferRecord) -> bool;

    /// Remove a record by id, returning it if it was present.
    fn remove(&self, id: &str) -> Option<TransferRecord>;

    fn get(&self, id: &str) -> Option<TransferRecord> {
        self.list().iter().find(|r| r.id == id).cloned()
    }
}
