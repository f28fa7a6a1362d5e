//! Application state management

use skybridge_core::{CommandTranslator, DeviceMapping, Registry, TransactionCounter};
use skybridge_discovery::DiscoveryService;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

use crate::config::Config;

/// Shared application state
pub struct AppState {
    /// Live bus device registry
    pub registry: Registry,
    /// ServerTransactionID source
    pub transactions: TransactionCounter,
    /// Alpaca command translation
    pub translator: Arc<dyn CommandTranslator>,
    /// Discovery responder lifecycle
    pub discovery: DiscoveryService,
    /// Configuration
    pub config: Config,
    /// Latest device mapping published for operators
    mapping: watch::Sender<Vec<DeviceMapping>>,
}

impl AppState {
    /// Create new application state; `alpaca_port` is the bound REST port
    pub fn new(
        config: Config,
        translator: Arc<dyn CommandTranslator>,
        alpaca_port: u16,
    ) -> Arc<Self> {
        let discovery = DiscoveryService::new(alpaca_port, config.discovery.port);
        let (mapping, _) = watch::channel(Vec::new());

        Arc::new(Self {
            registry: Registry::new(),
            transactions: TransactionCounter::new(),
            translator,
            discovery,
            config,
            mapping,
        })
    }

    /// Start background services enabled in configuration
    pub async fn start(&self) {
        if !self.config.discovery.enabled {
            info!("Discovery disabled by configuration");
            return;
        }
        // A bind failure only disables discovery; it has been logged already
        let _ = self.discovery.start().await;
    }

    /// Stop background services
    pub async fn shutdown(&self) {
        self.discovery.stop().await;
        info!("Background services stopped");
    }

    /// Rebuild and publish the operator device mapping
    pub fn publish_mapping(&self) {
        let mapping = self.registry.mapping();
        for row in &mapping {
            info!(number = row.number, label = %row.label, device = %row.device, "Device mapping");
        }
        self.mapping.send_replace(mapping);
    }

    /// Current operator device mapping
    pub fn mapping(&self) -> Vec<DeviceMapping> {
        self.mapping.borrow().clone()
    }

    /// Change the discovery port at runtime
    pub async fn set_discovery_port(&self, port: u16) -> anyhow::Result<std::net::SocketAddr> {
        info!(port, "Discovery port change requested");
        Ok(self.discovery.restart(port).await?)
    }
}
