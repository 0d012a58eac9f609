mod files;
mod page;
mod status;
mod upload;

use crate::api::response::ApiError;

pub use files::{delete_file, download_file, list_files};
pub use page::index;
pub use status::status;
pub use upload::upload_file;

/// Fallback for unknown paths and unsupported methods.
pub async fn not_found() -> ApiError {
    ApiError::not_found("Not found")
}
