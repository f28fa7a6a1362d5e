//! Configuration loading and validation

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use skybridge_core::interface;
use skybridge_discovery::DEFAULT_DISCOVERY_PORT;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default, rename = "device")]
    pub devices: Vec<DeviceConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Bind address for the Alpaca REST server
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:11111".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// UDP port answering Alpaca discovery probes (0 picks a free port)
    #[serde(default = "default_discovery_port")]
    pub port: u16,
    /// Run the discovery responder at startup
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            port: default_discovery_port(),
            enabled: true,
        }
    }
}

fn default_discovery_port() -> u16 {
    DEFAULT_DISCOVERY_PORT
}

fn default_true() -> bool {
    true
}

/// Server descriptor returned by `/management/v1/description`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_server_name")]
    pub name: String,
    #[serde(default = "default_manufacturer")]
    pub manufacturer: String,
    #[serde(default = "default_manufacturer_url")]
    pub manufacturer_url: String,
    #[serde(default)]
    pub location: String,
    /// Redirect target of `GET /setup`
    #[serde(default = "default_setup_page")]
    pub setup_page: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: default_server_name(),
            manufacturer: default_manufacturer(),
            manufacturer_url: default_manufacturer_url(),
            location: String::new(),
            setup_page: default_setup_page(),
        }
    }
}

fn default_server_name() -> String {
    "Skybridge Alpaca Bridge".to_string()
}

fn default_manufacturer() -> String {
    "Skybridge Contributors".to_string()
}

fn default_manufacturer_url() -> String {
    "https://github.com/skybridge-astro/skybridge".to_string()
}

fn default_setup_page() -> String {
    "/mng.html".to_string()
}

/// Capability given either as a raw mask or a symbolic name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InterfaceSpec {
    Mask(u64),
    Name(String),
}

impl InterfaceSpec {
    pub fn mask(&self) -> Result<u64> {
        match self {
            InterfaceSpec::Mask(mask) => Ok(*mask),
            InterfaceSpec::Name(name) => interface::from_name(name)
                .or_else(|| name.parse().ok())
                .with_context(|| format!("Unknown device interface: {}", name)),
        }
    }
}

/// A device announced on the bus at startup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Bus device name
    pub name: String,
    /// Capability mask or name (camera, mount, focuser, ...)
    pub interface: InterfaceSpec,
    /// Name reported to Alpaca clients
    pub display_name: Option<String>,
    /// Driver descriptor
    pub driver: Option<String>,
    /// Driver version
    pub version: Option<String>,
    /// Whether the device starts connected
    #[serde(default)]
    pub connected: bool,
    /// Additional single-item properties: property name -> value
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl Config {
    /// Reject configurations that cannot be fed to the bus
    pub fn validate(&self) -> Result<()> {
        for device in &self.devices {
            if device.name.is_empty() {
                anyhow::bail!("Device entries must have a non-empty name");
            }
            device.interface.mask()?;
        }
        Ok(())
    }

    /// Example configuration written by `--print-default-config`
    pub fn example() -> Self {
        Self {
            daemon: DaemonConfig::default(),
            discovery: DiscoveryConfig::default(),
            server: ServerConfig::default(),
            devices: vec![DeviceConfig {
                name: "CCD Imager Simulator".to_string(),
                interface: InterfaceSpec::Name("camera".to_string()),
                display_name: Some("Imager".to_string()),
                driver: Some("ccd_simulator".to_string()),
                version: Some("2.0".to_string()),
                connected: false,
                properties: BTreeMap::new(),
            }],
        }
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<Config> {
    let config = if path.exists() {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Invalid configuration in {}", path.display()))?;
        info!(path = %path.display(), "Loaded configuration");
        config
    } else {
        info!(
            path = %path.display(),
            "Configuration file not found, using defaults"
        );
        Config::default()
    };
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.daemon.bind, "0.0.0.0:11111");
        assert_eq!(config.discovery.port, 32227);
        assert!(config.discovery.enabled);
        assert_eq!(config.server.setup_page, "/mng.html");
        assert!(config.devices.is_empty());
    }

    #[test]
    fn test_load_devices() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[discovery]
port = 40000

[[device]]
name = "Mount Simulator"
interface = "mount"
display_name = "EQ6"

[[device]]
name = "Flat Panel"
interface = 2129920
connected = true

[device.properties]
AUX_LIGHT_INTENSITY = "50"
"#
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.discovery.port, 40000);
        assert_eq!(config.devices.len(), 2);
        assert_eq!(config.devices[0].interface.mask().unwrap(), interface::MOUNT);
        assert_eq!(config.devices[1].interface.mask().unwrap(), interface::AUX_LIGHTBOX);
        assert!(config.devices[1].connected);
        assert_eq!(
            config.devices[1].properties.get("AUX_LIGHT_INTENSITY").map(String::as_str),
            Some("50")
        );
    }

    #[test]
    fn test_rejects_unknown_interface() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[[device]]
name = "Mystery"
interface = "toaster"
"#
        )
        .unwrap();
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn test_rejects_out_of_range_port() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[discovery]\nport = 70000\n").unwrap();
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn test_example_round_trips() {
        let text = toml::to_string_pretty(&Config::example()).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.devices[0].name, "CCD Imager Simulator");
        parsed.validate().unwrap();
    }
}
