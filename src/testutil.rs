//! Shared test helpers for localdrop unit tests.

use std::sync::Arc;

use crate::config::{Config, DiscoveryConfig, ServerConfig};
use crate::registry::SessionRegistry;
use crate::storage::LocalStorage;
use crate::AppState;

/// Create a test AppState with an empty session and local storage in a temp dir.
pub fn test_state(temp_dir: &tempfile::TempDir) -> Arc<AppState> {
    let storage_dir = temp_dir.path().join("files");

    let config = Config {
        server: ServerConfig {
            bind_host: "127.0.0.1".parse().expect("valid loopback address"),
            port: 0,
            ..ServerConfig::default()
        },
        discovery: DiscoveryConfig {
            enabled: false,
            ..DiscoveryConfig::default()
        },
        storage_dir: storage_dir.clone(),
        max_upload_size: 10 * 1024 * 1024, // 10MB for tests
        share_paths: Vec::new(),
    };

    let storage = LocalStorage::new(&storage_dir).expect("Failed to create test storage");

    Arc::new(AppState::new(
        config,
        Arc::new(SessionRegistry::new()),
        Arc::new(storage),
    ))
}
