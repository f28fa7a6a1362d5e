//! Device registry keyed by bus device name and by Alpaca device number
//!
//! Device numbers come from one process-wide counter and are handed out once per
//! newly created entry. A removed entry retires its number for good; a device that
//! reappears later gets a fresh one.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;
use tracing::debug;

use crate::device::DeviceEntry;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("No such device")]
    NoSuchDevice,
    #[error("Device type doesn't match")]
    TypeMismatch,
}

/// One row of the Alpaca `configureddevices` listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfiguredDevice {
    #[serde(rename = "DeviceName")]
    pub device_name: String,
    #[serde(rename = "DeviceType")]
    pub device_type: String,
    #[serde(rename = "DeviceNumber")]
    pub device_number: u32,
    #[serde(rename = "UniqueID")]
    pub unique_id: String,
}

/// One row of the operator-facing device mapping
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceMapping {
    /// Alpaca device number
    pub number: u32,
    /// `<Category>/<number>` as used in request paths
    pub label: String,
    /// Bus device name
    pub device: String,
    /// When the bus first announced the device
    pub since: DateTime<Utc>,
}

#[derive(Default)]
struct Inner {
    by_name: HashMap<String, Arc<DeviceEntry>>,
    by_number: BTreeMap<u32, Arc<DeviceEntry>>,
    next_number: u32,
}

/// Live set of bus devices
#[derive(Default)]
pub struct Registry {
    inner: RwLock<Inner>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the entry for a device, creating it on first sight
    ///
    /// Returns the entry and whether it was just created.
    pub fn ensure(&self, name: &str) -> (Arc<DeviceEntry>, bool) {
        if let Some(entry) = self.get(name) {
            return (entry, false);
        }

        let mut inner = self.write();
        // Another writer may have raced us between the read and write lock
        if let Some(entry) = inner.by_name.get(name) {
            return (entry.clone(), false);
        }

        let number = inner.next_number;
        inner.next_number = inner.next_number.wrapping_add(1);
        let entry = Arc::new(DeviceEntry::new(name, number));
        inner.by_name.insert(name.to_string(), entry.clone());
        inner.by_number.insert(number, entry.clone());
        debug!(device = %name, number, uid = %entry.unique_id(), "Device entry created");
        (entry, true)
    }

    /// Look up an entry by bus device name
    pub fn get(&self, name: &str) -> Option<Arc<DeviceEntry>> {
        self.read().by_name.get(name).cloned()
    }

    /// Resolve a request's `{type}/{number}` pair to an entry
    pub fn resolve(
        &self,
        device_type: &str,
        number: u32,
    ) -> Result<Arc<DeviceEntry>, RegistryError> {
        let entry = self
            .read()
            .by_number
            .get(&number)
            .cloned()
            .ok_or(RegistryError::NoSuchDevice)?;
        match entry.category() {
            Some(category) if category.matches(device_type) => Ok(entry),
            _ => Err(RegistryError::TypeMismatch),
        }
    }

    /// Remove an entry, retiring its device number
    pub fn remove(&self, name: &str) -> Option<Arc<DeviceEntry>> {
        let mut inner = self.write();
        let entry = inner.by_name.remove(name)?;
        inner.by_number.remove(&entry.number());
        debug!(device = %name, number = entry.number(), "Device entry removed");
        Some(entry)
    }

    /// All entries in device number order, classified or not
    pub fn entries(&self) -> Vec<Arc<DeviceEntry>> {
        self.read().by_number.values().cloned().collect()
    }

    /// Alpaca enumeration: classified entries only, in device number order
    pub fn configured_devices(&self) -> Vec<ConfiguredDevice> {
        self.entries()
            .into_iter()
            .filter_map(|entry| {
                let category = entry.category()?;
                Some(ConfiguredDevice {
                    device_name: entry.display_name(),
                    device_type: category.to_string(),
                    device_number: entry.number(),
                    unique_id: entry.unique_id().to_string(),
                })
            })
            .collect()
    }

    /// Operator device mapping for classified entries
    pub fn mapping(&self) -> Vec<DeviceMapping> {
        self.entries()
            .into_iter()
            .filter_map(|entry| {
                let category = entry.category()?;
                Some(DeviceMapping {
                    number: entry.number(),
                    label: format!("{}/{}", category, entry.number()),
                    device: entry.name().to_string(),
                    since: entry.first_seen(),
                })
            })
            .collect()
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceCategory;

    #[test]
    fn test_numbers_follow_first_appearance() {
        let registry = Registry::new();
        let (a, created_a) = registry.ensure("Mount Simulator");
        let (b, created_b) = registry.ensure("CCD Imager Simulator");
        let (a_again, created_again) = registry.ensure("Mount Simulator");
        let (c, _) = registry.ensure("Focuser Simulator");

        assert!(created_a && created_b && !created_again);
        assert_eq!(a.number(), 0);
        assert_eq!(b.number(), 1);
        assert_eq!(a_again.number(), 0);
        assert_eq!(c.number(), 2);
        assert_eq!(registry.entries().len(), 3);
    }

    #[test]
    fn test_removed_numbers_are_retired() {
        let registry = Registry::new();
        registry.ensure("Dome Simulator");
        registry.ensure("Rotator Simulator");
        assert!(registry.remove("Dome Simulator").is_some());
        assert!(registry.remove("Dome Simulator").is_none());

        let (back, created) = registry.ensure("Dome Simulator");
        assert!(created);
        assert_eq!(back.number(), 2);
        assert_eq!(registry.entries().len(), 2);
    }

    #[test]
    fn test_resolve() {
        let registry = Registry::new();
        let (camera, _) = registry.ensure("CCD Imager Simulator");
        camera.set_category(Some(DeviceCategory::Camera));
        let (raw, _) = registry.ensure("GPS Simulator");

        assert_eq!(registry.resolve("camera", 0).unwrap().name(), "CCD Imager Simulator");
        assert_eq!(registry.resolve("Focuser", 0).unwrap_err(), RegistryError::TypeMismatch);
        assert_eq!(
            registry.resolve("camera", raw.number()).unwrap_err(),
            RegistryError::TypeMismatch
        );
        assert_eq!(registry.resolve("camera", 42).unwrap_err(), RegistryError::NoSuchDevice);
    }

    #[test]
    fn test_enumeration_excludes_unclassified() {
        let registry = Registry::new();
        let (mount, _) = registry.ensure("Mount Simulator");
        registry.ensure("GPS Simulator");
        let (wheel, _) = registry.ensure("Wheel Simulator");
        mount.set_category(Some(DeviceCategory::Telescope));
        mount.set_display_name("EQ mount");
        wheel.set_category(Some(DeviceCategory::FilterWheel));

        let devices = registry.configured_devices();
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].device_name, "EQ mount");
        assert_eq!(devices[0].device_type, "Telescope");
        assert_eq!(devices[1].device_name, "Wheel Simulator");
        assert_eq!(devices[1].device_number, 2);

        let mapping = registry.mapping();
        assert_eq!(mapping.len(), 2);
        assert_eq!(mapping[1].label, "FilterWheel/2");
        assert_eq!(mapping[1].device, "Wheel Simulator");
        assert_eq!(mapping[1].since, wheel.first_seen());
    }

    #[test]
    fn test_configured_device_serialization() {
        let row = ConfiguredDevice {
            device_name: "Camera".to_string(),
            device_type: "Camera".to_string(),
            device_number: 4,
            unique_id: "00000000-0000-4000-8000-000000000000".to_string(),
        };
        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json["DeviceNumber"], 4);
        assert_eq!(json["UniqueID"], "00000000-0000-4000-8000-000000000000");
    }
}
