//! Best-effort mDNS advertisement of the running server.
//!
//! The coordinator follows `ServerStatus`: the service is announced while the
//! server is running with a known address and withdrawn otherwise. Failures
//! are logged and never stop the server; peers can always fall back to the
//! numeric address.

use std::net::IpAddr;

use mdns_sd::{ServiceDaemon, ServiceInfo};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::DiscoveryConfig;
use crate::server::ServerStatus;

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("mDNS error: {0}")]
    Mdns(#[from] mdns_sd::Error),
}

/// Something that can announce the service on the local network.
pub trait Advertiser: Send + 'static {
    fn advertise(&mut self, ip: IpAddr, port: u16) -> Result<(), DiscoveryError>;
    fn withdraw(&mut self) -> Result<(), DiscoveryError>;
}

/// Advertiser backed by an in-process mDNS responder.
pub struct MdnsAdvertiser {
    daemon: ServiceDaemon,
    service_type: String,
    instance_name: String,
    registered: Option<String>,
}

impl MdnsAdvertiser {
    pub fn new(config: &DiscoveryConfig) -> Result<Self, DiscoveryError> {
        Ok(Self {
            daemon: ServiceDaemon::new()?,
            service_type: config.service_type.clone(),
            instance_name: config.service_name.clone(),
            registered: None,
        })
    }

    fn host_name(&self) -> String {
        let host: String = self
            .instance_name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
            .collect();
        format!("{host}.local.")
    }
}

impl Advertiser for MdnsAdvertiser {
    fn advertise(&mut self, ip: IpAddr, port: u16) -> Result<(), DiscoveryError> {
        self.withdraw()?;

        let properties = [("path", "/")];
        let info = ServiceInfo::new(
            &self.service_type,
            &self.instance_name,
            &self.host_name(),
            ip,
            port,
            &properties[..],
        )?;
        let fullname = info.get_fullname().to_string();
        self.daemon.register(info)?;
        self.registered = Some(fullname);
        Ok(())
    }

    fn withdraw(&mut self) -> Result<(), DiscoveryError> {
        if let Some(fullname) = self.registered.take() {
            self.daemon.unregister(&fullname)?;
        }
        Ok(())
    }
}

impl Drop for MdnsAdvertiser {
    fn drop(&mut self) {
        if let Err(e) = self.withdraw() {
            debug!(error = %e, "Failed to withdraw mDNS service on drop");
        }
        let _ = self.daemon.shutdown();
    }
}

/// Handle to a running discovery coordinator.
pub struct Discovery {
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl Discovery {
    /// Follow `status` and keep the advertisement in sync with it.
    pub fn spawn<A: Advertiser>(advertiser: A, status: watch::Receiver<ServerStatus>) -> Self {
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(coordinate(advertiser, status, shutdown.clone()));
        Self { shutdown, task }
    }

    /// Withdraw the service and stop following the server.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        if let Err(e) = self.task.await {
            warn!(error = %e, "Discovery task failed");
        }
    }
}

async fn coordinate<A: Advertiser>(
    mut advertiser: A,
    mut status: watch::Receiver<ServerStatus>,
    shutdown: CancellationToken,
) {
    let mut advertised: Option<(IpAddr, u16)> = None;

    loop {
        let wanted = status.borrow_and_update().advertisable();

        if wanted != advertised {
            if advertised.take().is_some() {
                match advertiser.withdraw() {
                    Ok(()) => info!("mDNS service withdrawn"),
                    Err(e) => warn!(error = %e, "Failed to withdraw mDNS service"),
                }
            }
            if let Some((ip, port)) = wanted {
                match advertiser.advertise(ip, port) {
                    Ok(()) => {
                        info!(%ip, port, "mDNS service advertised");
                        advertised = wanted;
                    }
                    Err(e) => warn!(error = %e, "Failed to advertise mDNS service"),
                }
            }
        }

        tokio::select! {
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = shutdown.cancelled() => break,
        }
    }

    if advertised.is_some() {
        if let Err(e) = advertiser.withdraw() {
            warn!(error = %e, "Failed to withdraw mDNS service");
        }
    }
}
