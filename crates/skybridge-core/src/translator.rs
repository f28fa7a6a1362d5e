//! Command translation between Alpaca commands and bus properties
//!
//! The per-category command tables live behind [`CommandTranslator`]. The bridge
//! only needs the read/write entry points and a hook that keeps the translator's
//! property cache current. [`CommonTranslator`] answers the commands every Alpaca
//! device shares and rejects the rest.

use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::RwLock;
use thiserror::Error;
use tracing::trace;

use crate::bus::{Property, PropertyItem, CONNECTION_CONNECTED_ITEM, CONNECTION_PROPERTY};
use crate::device::DeviceEntry;

/// Command-specific JSON fields of an Alpaca response
pub type Fragment = Map<String, Value>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TranslatorError {
    #[error("Unsupported command: {0}")]
    Unsupported(String),
    #[error("Missing argument for {0}")]
    MissingArgument(String),
    #[error("Invalid value for {command}: {value}")]
    InvalidValue { command: String, value: String },
}

/// Converts Alpaca commands into bus property reads and writes
pub trait CommandTranslator: Send + Sync {
    /// Handle an Alpaca GET command
    fn read(
        &self,
        device: &DeviceEntry,
        interface_version: u32,
        command: &str,
    ) -> Result<Fragment, TranslatorError>;

    /// Handle an Alpaca PUT command with up to two canonicalized `Key=Value` arguments
    fn write(
        &self,
        device: &DeviceEntry,
        interface_version: u32,
        command: &str,
        arg0: Option<&str>,
        arg1: Option<&str>,
    ) -> Result<Fragment, TranslatorError>;

    /// State-cache hook for property definitions and updates
    fn update_property(&self, device: &DeviceEntry, property: &Property);

    /// Drop cached state for a removed device
    fn forget(&self, _device: &str) {}
}

/// Build a successful value response fragment
pub fn value_fragment(value: Value) -> Fragment {
    let mut fragment = Fragment::new();
    fragment.insert("Value".to_string(), value);
    fragment.extend(ok_fragment());
    fragment
}

/// Build a successful response fragment without a value
pub fn ok_fragment() -> Fragment {
    let mut fragment = Fragment::new();
    fragment.insert("ErrorNumber".to_string(), json!(0));
    fragment.insert("ErrorMessage".to_string(), json!(""));
    fragment
}

/// Split a raw `Key=Value` form token
pub fn split_argument(token: &str) -> (&str, &str) {
    token.split_once('=').unwrap_or((token, ""))
}

/// Translator for the common Alpaca device interface
///
/// Keeps the last seen value of every property per device.
#[derive(Default)]
pub struct CommonTranslator {
    cache: RwLock<HashMap<String, HashMap<String, Property>>>,
}

impl CommonTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached copy of a device property
    pub fn property(&self, device: &str, name: &str) -> Option<Property> {
        let cache = self.cache.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        cache.get(device)?.get(name).cloned()
    }

    fn is_connected(&self, device: &str) -> bool {
        self.property(device, CONNECTION_PROPERTY)
            .and_then(|property| property.item(CONNECTION_CONNECTED_ITEM).and_then(parse_switch))
            .unwrap_or(false)
    }

    fn set_connected(&self, device: &str, connected: bool) {
        let mut cache = self.cache.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        let property = cache
            .entry(device.to_string())
            .or_default()
            .entry(CONNECTION_PROPERTY.to_string())
            .or_insert_with(|| Property::new(device, CONNECTION_PROPERTY));
        let value = if connected { "ON" } else { "OFF" };
        match property
            .items
            .iter_mut()
            .find(|item| item.name == CONNECTION_CONNECTED_ITEM)
        {
            Some(item) => item.value = value.to_string(),
            None => property
                .items
                .push(PropertyItem::new(CONNECTION_CONNECTED_ITEM, value)),
        }
    }
}

impl CommandTranslator for CommonTranslator {
    fn read(
        &self,
        device: &DeviceEntry,
        interface_version: u32,
        command: &str,
    ) -> Result<Fragment, TranslatorError> {
        let meta = device.meta();
        let value = match command.to_ascii_lowercase().as_str() {
            "name" => json!(device.display_name()),
            "description" => json!(device.name()),
            "driverinfo" => json!(meta.driver_info),
            "driverversion" => json!(meta.driver_version),
            "interfaceversion" => json!(interface_version),
            "connected" => json!(self.is_connected(device.name())),
            "supportedactions" => json!([]),
            _ => return Err(TranslatorError::Unsupported(command.to_string())),
        };
        Ok(value_fragment(value))
    }

    fn write(
        &self,
        device: &DeviceEntry,
        _interface_version: u32,
        command: &str,
        arg0: Option<&str>,
        arg1: Option<&str>,
    ) -> Result<Fragment, TranslatorError> {
        match command.to_ascii_lowercase().as_str() {
            "connected" => {
                let value = [arg0, arg1]
                    .into_iter()
                    .flatten()
                    .map(split_argument)
                    .find(|(key, _)| key.eq_ignore_ascii_case("Connected"))
                    .map(|(_, value)| value)
                    .ok_or_else(|| TranslatorError::MissingArgument(command.to_string()))?;
                let connected = parse_switch(value).ok_or_else(|| TranslatorError::InvalidValue {
                    command: command.to_string(),
                    value: value.to_string(),
                })?;
                self.set_connected(device.name(), connected);
                Ok(ok_fragment())
            }
            _ => Err(TranslatorError::Unsupported(command.to_string())),
        }
    }

    fn update_property(&self, device: &DeviceEntry, property: &Property) {
        trace!(device = %device.name(), property = %property.name, "Caching property");
        let mut cache = self.cache.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        cache
            .entry(device.name().to_string())
            .or_default()
            .insert(property.name.clone(), property.clone());
    }

    fn forget(&self, device: &str) {
        let mut cache = self.cache.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        cache.remove(device);
    }
}

fn parse_switch(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "on" | "true" | "1" => Some(true),
        "off" | "false" | "0" => Some(false),
        _ => None,
    }
}
