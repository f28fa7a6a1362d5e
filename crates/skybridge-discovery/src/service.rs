//! Restartable discovery service
//!
//! Holds at most one running responder. Changing the port stops the current
//! responder, waits for its task to finish (which closes the socket), then binds a
//! new one. Probes arriving in between go unanswered.

use serde::Serialize;
use std::net::SocketAddr;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::responder::{DiscoveryError, DiscoveryResponder};

/// Snapshot of the discovery service for operators
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveryStatus {
    /// Configured UDP port
    pub port: u16,
    /// TCP port advertised in replies
    pub alpaca_port: u16,
    /// Whether a responder is currently bound
    pub running: bool,
    /// Actual bound address (differs from `port` when configured as 0)
    pub local_addr: Option<SocketAddr>,
}

struct Running {
    local_addr: SocketAddr,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

struct Inner {
    port: u16,
    running: Option<Running>,
}

/// Discovery responder lifecycle owner
pub struct DiscoveryService {
    alpaca_port: u16,
    inner: Mutex<Inner>,
}

impl DiscoveryService {
    /// Create a stopped service that will advertise `alpaca_port`
    pub fn new(alpaca_port: u16, port: u16) -> Self {
        Self {
            alpaca_port,
            inner: Mutex::new(Inner {
                port,
                running: None,
            }),
        }
    }

    /// Start on the configured port
    pub async fn start(&self) -> Result<SocketAddr, DiscoveryError> {
        let port = self.inner.lock().await.port;
        self.restart(port).await
    }

    /// Stop any running responder and start a new one on `port`
    ///
    /// The new port is recorded even when binding fails, so a later `start`
    /// retries it.
    pub async fn restart(&self, port: u16) -> Result<SocketAddr, DiscoveryError> {
        let mut inner = self.inner.lock().await;
        inner.port = port;
        if let Some(running) = inner.running.take() {
            shutdown(running).await;
        }

        let responder = match DiscoveryResponder::bind(port) {
            Ok(responder) => responder,
            Err(e) => {
                error!(port, error = %e, "Discovery server failed to start");
                return Err(e);
            }
        };
        let local_addr = responder.local_addr();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(responder.run(self.alpaca_port, cancel.clone()));

        inner.running = Some(Running {
            local_addr,
            cancel,
            handle,
        });
        Ok(local_addr)
    }

    /// Stop the running responder, if any
    pub async fn stop(&self) {
        let running = self.inner.lock().await.running.take();
        if let Some(running) = running {
            shutdown(running).await;
        }
    }

    pub async fn status(&self) -> DiscoveryStatus {
        let inner = self.inner.lock().await;
        DiscoveryStatus {
            port: inner.port,
            alpaca_port: self.alpaca_port,
            running: inner
                .running
                .as_ref()
                .is_some_and(|running| !running.handle.is_finished()),
            local_addr: inner.running.as_ref().map(|running| running.local_addr),
        }
    }
}

async fn shutdown(running: Running) {
    running.cancel.cancel();
    if let Err(e) = running.handle.await {
        error!(error = %e, "Discovery task ended abnormally");
    }
    info!(addr = %running.local_addr, "Discovery responder released");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::net::UdpSocket;
    use tokio::time::timeout;

    async fn probe(port: u16) -> Option<serde_json::Value> {
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client
            .send_to(b"alpacadiscovery1", ("127.0.0.1", port))
            .await
            .unwrap();
        let mut buf = [0u8; 128];
        match timeout(Duration::from_secs(2), client.recv_from(&mut buf)).await {
            Ok(Ok((len, _))) => serde_json::from_slice(&buf[..len]).ok(),
            _ => None,
        }
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let service = DiscoveryService::new(11111, 0);
        let addr = service.start().await.unwrap();

        let status = service.status().await;
        assert!(status.running);
        assert_eq!(status.local_addr, Some(addr));
        assert_eq!(status.alpaca_port, 11111);

        let reply = probe(addr.port()).await.unwrap();
        assert_eq!(reply["AlpacaPort"], 11111);

        service.stop().await;
        assert!(!service.status().await.running);
    }

    #[tokio::test]
    async fn test_restart_releases_old_port() {
        let service = DiscoveryService::new(8080, 0);
        let old = service.start().await.unwrap();
        let free = std::net::UdpSocket::bind("0.0.0.0:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let new = service.restart(free).await.unwrap();
        assert_eq!(new.port(), free);
        assert_eq!(service.status().await.port, free);

        // The old port can be bound without address reuse once released
        let rebind = std::net::UdpSocket::bind(("0.0.0.0", old.port()));
        assert!(rebind.is_ok());
        drop(rebind);

        let reply = probe(new.port()).await.unwrap();
        assert_eq!(reply["AlpacaPort"], 8080);
        service.stop().await;
    }

    #[tokio::test]
    async fn test_bind_failure_is_local() {
        let blocker = std::net::UdpSocket::bind("0.0.0.0:0").unwrap();
        let taken = blocker.local_addr().unwrap().port();

        let service = DiscoveryService::new(8080, taken);
        assert!(matches!(
            service.start().await,
            Err(DiscoveryError::Bind { .. })
        ));
        let status = service.status().await;
        assert_eq!(status.port, taken);
        assert!(!status.running);
    }
}
