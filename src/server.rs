//! Listener lifecycle: `Stopped -> Starting -> Running -> Stopped`.
//!
//! The router reads the registry through `AppState` on every request, so
//! registry changes never require a restart. The manager's job is to own the
//! socket: bind it, serve it, and make sure it is closed before `stop()`
//! returns.

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::api;
use crate::AppState;

/// How long `stop()` waits for in-flight requests before dropping them.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerState {
    Stopped,
    Starting,
    Running,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerAddress {
    /// Unknown until the device's network address has been resolved.
    pub ip: Option<IpAddr>,
    pub port: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerStatus {
    pub state: ServerState,
    pub address: ServerAddress,
}

impl ServerStatus {
    /// The endpoint to announce, once running with a known address.
    pub fn advertisable(&self) -> Option<(IpAddr, u16)> {
        match (self.state, self.address.ip) {
            (ServerState::Running, Some(ip)) => Some((ip, self.address.port)),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

struct Running {
    local_addr: SocketAddr,
    shutdown: CancellationToken,
    serve: JoinHandle<io::Result<()>>,
    resolver: JoinHandle<()>,
}

/// Owns the HTTP listener for one `AppState`.
pub struct Server {
    state: Arc<AppState>,
    running: Mutex<Option<Running>>,
}

impl Server {
    pub fn new(state: Arc<AppState>) -> Self {
        Self {
            state,
            running: Mutex::new(None),
        }
    }

    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    pub fn status(&self) -> ServerStatus {
        *self.state.status.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ServerStatus> {
        self.state.status.subscribe()
    }

    /// Bind the listener and start serving. Returns the bound address.
    ///
    /// Starting a server that is already running returns its current address.
    pub async fn start(&self) -> Result<SocketAddr, ServerError> {
        let mut running = self.running.lock().await;
        if let Some(current) = running.as_ref() {
            return Ok(current.local_addr);
        }

        self.state
            .status
            .send_modify(|s| s.state = ServerState::Starting);

        let addr = self.state.config.bind_address();
        let listener = match TcpListener::bind(addr).await {
            Ok(listener) => listener,
            Err(source) => {
                error!(%addr, error = %source, "Failed to bind listener");
                self.state
                    .status
                    .send_modify(|s| s.state = ServerState::Stopped);
                return Err(ServerError::Bind { addr, source });
            }
        };
        let local_addr = match listener.local_addr() {
            Ok(local_addr) => local_addr,
            Err(e) => {
                self.state
                    .status
                    .send_modify(|s| s.state = ServerState::Stopped);
                return Err(e.into());
            }
        };

        let app = api::create_router(Arc::clone(&self.state));
        let shutdown = CancellationToken::new();
        let signal = shutdown.clone();
        let serve = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { signal.cancelled().await })
                .await
        });

        self.state.status.send_modify(|s| {
            s.state = ServerState::Running;
            s.address.port = local_addr.port();
        });
        info!("Listening on: {}", local_addr);

        let resolver = tokio::spawn(resolve_address(Arc::clone(&self.state)));

        *running = Some(Running {
            local_addr,
            shutdown,
            serve,
            resolver,
        });
        Ok(local_addr)
    }

    /// Stop accepting connections and wait for the listener to close.
    /// Stopping a stopped server does nothing.
    ///
    /// The lifecycle lock is held until `Stopped` is published, so a
    /// concurrent `start()` waits for the drain to finish.
    pub async fn stop(&self) {
        let mut running = self.running.lock().await;
        let Some(current) = running.take() else {
            return;
        };

        current.resolver.abort();
        current.shutdown.cancel();

        let mut serve = current.serve;
        match tokio::time::timeout(DRAIN_TIMEOUT, &mut serve).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(e))) => warn!(error = %e, "Listener exited with an error"),
            Ok(Err(e)) => warn!(error = %e, "Listener task failed"),
            Err(_) => {
                warn!("In-flight requests did not drain in time, aborting");
                serve.abort();
                let _ = serve.await;
            }
        }

        self.state
            .status
            .send_modify(|s| s.state = ServerState::Stopped);
        info!(addr = %current.local_addr, "Server stopped");
        drop(running);
    }

    pub async fn restart(&self) -> Result<SocketAddr, ServerError> {
        self.stop().await;
        self.start().await
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }
}

/// Publish the device address once known. A configured address wins over
/// detection.
async fn resolve_address(state: Arc<AppState>) {
    let ip = match state.config.server.advertise_ip {
        Some(ip) => Some(ip),
        None => tokio::task::spawn_blocking(detect_local_ip)
            .await
            .ok()
            .flatten(),
    };

    match ip {
        Some(ip) => {
            state.status.send_if_modified(|s| {
                if s.state != ServerState::Running || s.address.ip == Some(ip) {
                    return false;
                }
                s.address.ip = Some(ip);
                true
            });
            info!(%ip, "Device address resolved");
        }
        None => warn!("Could not determine the device address, peers need it entered manually"),
    }
}

/// Find the address of the interface that routes to the wider network.
/// No packets are sent.
pub fn detect_local_ip() -> Option<IpAddr> {
    let socket = std::net::UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;
    let addr = socket.local_addr().ok()?;
    Some(addr.ip()).filter(|ip| !ip.is_unspecified())
}
