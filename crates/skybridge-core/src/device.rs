//! Registry entries for bus devices and their Alpaca classification

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::bus::interface;
use crate::uid::unique_id;

/// Alpaca device category a bus device is exposed as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceCategory {
    Camera,
    Dome,
    FilterWheel,
    Focuser,
    Rotator,
    Switch,
    Telescope,
    CoverCalibrator,
}

impl DeviceCategory {
    /// Classify a bus capability mask; `None` means unclassified
    pub fn from_interface(mask: u64) -> Option<Self> {
        match mask {
            interface::CAMERA => Some(Self::Camera),
            interface::DOME => Some(Self::Dome),
            interface::FILTER_WHEEL => Some(Self::FilterWheel),
            interface::FOCUSER => Some(Self::Focuser),
            interface::ROTATOR => Some(Self::Rotator),
            interface::AUX_POWERBOX => Some(Self::Switch),
            interface::ADAPTIVE_OPTICS | interface::MOUNT | interface::GUIDER => {
                Some(Self::Telescope)
            }
            interface::AUX_LIGHTBOX => Some(Self::CoverCalibrator),
            _ => None,
        }
    }

    /// Alpaca device type name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Camera => "Camera",
            Self::Dome => "Dome",
            Self::FilterWheel => "FilterWheel",
            Self::Focuser => "Focuser",
            Self::Rotator => "Rotator",
            Self::Switch => "Switch",
            Self::Telescope => "Telescope",
            Self::CoverCalibrator => "CoverCalibrator",
        }
    }

    /// Case-insensitive comparison against a request path segment
    pub fn matches(&self, device_type: &str) -> bool {
        self.as_str().eq_ignore_ascii_case(device_type)
    }
}

impl std::fmt::Display for DeviceCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mutable descriptive fields of a device, filled in from the information property
#[derive(Debug, Clone, Default, Serialize)]
pub struct DeviceMeta {
    /// Alpaca category, `None` while unclassified
    pub category: Option<DeviceCategory>,
    /// Human-readable name reported by the driver
    pub display_name: String,
    /// Driver descriptor
    pub driver_info: String,
    /// Driver version string
    pub driver_version: String,
}

/// A bus device tracked by the registry
///
/// Identity fields are fixed at creation. Descriptive fields sit behind a per-entry
/// lock scoped to single field writes, so a reader may see a device that is only
/// partly described but never a half-written field.
#[derive(Debug)]
pub struct DeviceEntry {
    name: String,
    number: u32,
    unique_id: String,
    first_seen: DateTime<Utc>,
    meta: RwLock<DeviceMeta>,
}

impl DeviceEntry {
    pub(crate) fn new(name: &str, number: u32) -> Self {
        Self {
            name: name.to_string(),
            number,
            unique_id: unique_id(name),
            first_seen: Utc::now(),
            meta: RwLock::new(DeviceMeta::default()),
        }
    }

    /// Bus device name (registry key)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Alpaca device number
    pub fn number(&self) -> u32 {
        self.number
    }

    /// Alpaca UniqueID
    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    pub fn first_seen(&self) -> DateTime<Utc> {
        self.first_seen
    }

    pub fn category(&self) -> Option<DeviceCategory> {
        self.read().category
    }

    pub fn is_classified(&self) -> bool {
        self.category().is_some()
    }

    /// Snapshot of all descriptive fields
    pub fn meta(&self) -> DeviceMeta {
        self.read().clone()
    }

    /// Display name, falling back to the bus name until the driver reports one
    pub fn display_name(&self) -> String {
        let meta = self.read();
        if meta.display_name.is_empty() {
            self.name.clone()
        } else {
            meta.display_name.clone()
        }
    }

    /// Set the category; returns true when the entry goes from unclassified to classified
    pub fn set_category(&self, category: Option<DeviceCategory>) -> bool {
        let mut meta = self.write();
        let newly_classified = meta.category.is_none() && category.is_some();
        meta.category = category;
        newly_classified
    }

    pub fn set_display_name(&self, value: &str) {
        self.write().display_name = value.to_string();
    }

    pub fn set_driver_info(&self, value: &str) {
        self.write().driver_info = value.to_string();
    }

    pub fn set_driver_version(&self, value: &str) {
        self.write().driver_version = value.to_string();
    }

    fn read(&self) -> RwLockReadGuard<'_, DeviceMeta> {
        self.meta.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, DeviceMeta> {
        self.meta.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
