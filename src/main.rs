use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use localdrop::{
    config::Config,
    discovery::{Discovery, MdnsAdvertiser},
    registry::{FileRegistry, SessionRegistry, TransferRecord},
    server::Server,
    storage::LocalStorage,
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());

    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    match log_format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_target(true)
                        .with_span_list(false),
                )
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    info!(version = env!("CARGO_PKG_VERSION"), "localdrop starting");

    // Load configuration
    let config = Config::load()?;

    // Initialize device storage
    let storage = LocalStorage::new(&config.storage_dir)?;
    info!("Storing received files in: {}", config.storage_dir.display());

    // Offer the files listed in SHARE_PATHS
    let registry = Arc::new(SessionRegistry::new());
    for path in &config.share_paths {
        match TransferRecord::shared_from_path(path) {
            Ok(record) => {
                info!(file_id = %record.id, name = %record.name, "Sharing file");
                registry.add(record);
            }
            Err(e) => warn!(path = %path.display(), error = %e, "Skipping shared file"),
        }
    }

    // Create shared state
    let state = Arc::new(AppState::new(
        config.clone(),
        registry,
        Arc::new(storage),
    ));

    // Start the HTTP server
    let server = Server::new(Arc::clone(&state));
    if let Err(e) = server.start().await {
        error!(error = %e, "Failed to start the server");
        return Err(e.into());
    }

    // Advertise on the local network
    let discovery = if config.discovery.enabled {
        match MdnsAdvertiser::new(&config.discovery) {
            Ok(advertiser) => Some(Discovery::spawn(advertiser, server.subscribe())),
            Err(e) => {
                warn!(error = %e, "mDNS unavailable, peers must use the numeric address");
                None
            }
        }
    } else {
        None
    };

    shutdown_signal().await;

    // Cleanup: withdraw the advertisement, then close the listener
    if let Some(discovery) = discovery {
        discovery.shutdown().await;
    }
    server.stop().await;

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, draining connections");
}
