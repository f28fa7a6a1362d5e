//! Device bus property and lifecycle event types
//!
//! The bus itself lives outside this crate. These types describe what the bridge
//! consumes from it: property definitions, updates, and deletions, delivered in order.

use serde::{Deserialize, Serialize};

/// Name of the device information property
pub const INFO_PROPERTY: &str = "INFO";
/// Capability mask item of the information property
pub const INFO_INTERFACE_ITEM: &str = "DEVICE_INTERFACE";
/// Display name item of the information property
pub const INFO_NAME_ITEM: &str = "DEVICE_NAME";
/// Driver descriptor item of the information property
pub const INFO_DRIVER_ITEM: &str = "DEVICE_DRIVER";
/// Driver version item of the information property
pub const INFO_VERSION_ITEM: &str = "DEVICE_VERSION";

/// Name of the connection-state property
pub const CONNECTION_PROPERTY: &str = "CONNECTION";
/// Connected switch item of the connection-state property
pub const CONNECTION_CONNECTED_ITEM: &str = "CONNECTED";
/// Disconnected switch item of the connection-state property
pub const CONNECTION_DISCONNECTED_ITEM: &str = "DISCONNECTED";

/// Capability masks reported in the `DEVICE_INTERFACE` item
pub mod interface {
    pub const MOUNT: u64 = 1 << 0;
    pub const CAMERA: u64 = 1 << 1;
    pub const GUIDER: u64 = 1 << 2;
    pub const FOCUSER: u64 = 1 << 3;
    pub const FILTER_WHEEL: u64 = 1 << 4;
    pub const DOME: u64 = 1 << 5;
    pub const GPS: u64 = 1 << 6;
    pub const ADAPTIVE_OPTICS: u64 = 1 << 8;
    pub const ROTATOR: u64 = 1 << 12;
    pub const AGENT: u64 = 1 << 14;
    pub const AUX: u64 = 1 << 15;
    pub const AUX_POWERBOX: u64 = AUX | (1 << 18);
    pub const AUX_LIGHTBOX: u64 = AUX | (1 << 21);

    /// Resolve a symbolic capability name as used in configuration files
    pub fn from_name(name: &str) -> Option<u64> {
        let mask = match name.to_ascii_lowercase().replace(['_', ' '], "-").as_str() {
            "mount" => MOUNT,
            "camera" | "ccd" => CAMERA,
            "guider" => GUIDER,
            "focuser" => FOCUSER,
            "filter-wheel" | "wheel" => FILTER_WHEEL,
            "dome" => DOME,
            "gps" => GPS,
            "adaptive-optics" | "ao" => ADAPTIVE_OPTICS,
            "rotator" => ROTATOR,
            "agent" => AGENT,
            "aux" => AUX,
            "powered-accessory" | "powerbox" => AUX_POWERBOX,
            "light-source-accessory" | "lightbox" => AUX_LIGHTBOX,
            _ => return None,
        };
        Some(mask)
    }
}

/// A single named value within a property
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyItem {
    pub name: String,
    pub value: String,
}

impl PropertyItem {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// A bus property belonging to one device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    /// Bus device name owning this property
    pub device: String,
    /// Property name
    pub name: String,
    /// Property items in bus order
    pub items: Vec<PropertyItem>,
}

impl Property {
    pub fn new(device: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            name: name.into(),
            items: Vec::new(),
        }
    }

    /// Builder-style item append
    pub fn with_item(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.items.push(PropertyItem::new(name, value));
        self
    }

    /// Look up an item value by name
    pub fn item(&self, name: &str) -> Option<&str> {
        self.items
            .iter()
            .find(|item| item.name == name)
            .map(|item| item.value.as_str())
    }

    pub fn is_info(&self) -> bool {
        self.name == INFO_PROPERTY
    }
}

/// Lifecycle and property notifications delivered by the bus
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusEvent {
    /// A property was defined (first event for a device creates its registry entry)
    Defined(Property),
    /// A property value changed
    Updated(Property),
    /// A property was deleted; an empty name means the whole device went away
    Deleted { device: String, property: String },
}

impl BusEvent {
    /// Bus device name this event concerns
    pub fn device(&self) -> &str {
        match self {
            BusEvent::Defined(property) | BusEvent::Updated(property) => &property.device,
            BusEvent::Deleted { device, .. } => device,
        }
    }

    /// Whether a deletion removes the whole device
    pub fn is_disconnect(&self) -> bool {
        match self {
            BusEvent::Deleted { property, .. } => {
                property.is_empty() || property == CONNECTION_PROPERTY
            }
            _ => false,
        }
    }
}
