//! localdrop - move files between a device and a browser on the same network
//!
//! This crate provides the server core of a local file-drop service:
//! - A shared session registry of transfer records, mutated by both the
//!   embedding application and HTTP peers
//! - A raw-bytes multipart/form-data scanner and a base64 codec
//! - A REST API with uniform CORS headers and JSON envelopes
//! - Listener lifecycle management and mDNS advertisement

pub mod api;
pub mod codec;
pub mod config;
pub mod discovery;
pub mod multipart;
pub mod registry;
pub mod server;
pub mod storage;
#[cfg(test)]
pub mod testutil;

use std::sync::Arc;

use tokio::sync::watch;

use config::Config;
use registry::FileRegistry;
use server::{ServerAddress, ServerState, ServerStatus};
use storage::DeviceStorage;

/// Shared application state
pub struct AppState {
    pub config: Config,
    pub registry: Arc<dyn FileRegistry>,
    pub storage: Arc<dyn DeviceStorage>,
    pub status: watch::Sender<ServerStatus>,
}

impl AppState {
    pub fn new(
        config: Config,
        registry: Arc<dyn FileRegistry>,
        storage: Arc<dyn DeviceStorage>,
    ) -> Self {
        let (status, _) = watch::channel(ServerStatus {
            state: ServerState::Stopped,
            address: ServerAddress {
                ip: config.server.advertise_ip,
                port: config.server.port,
            },
        });

        Self {
            config,
            registry,
            storage,
            status,
        }
    }

    /// The address peers should use, as currently known.
    pub fn address(&self) -> ServerAddress {
        self.status.borrow().address
    }
}
