//! Configuration-driven bus feed
//!
//! Announces the `[[device]]` entries of the configuration as bus property
//! definitions, the same way a driver would on attach.

use anyhow::Result;
use skybridge_core::bus::{
    CONNECTION_CONNECTED_ITEM, CONNECTION_DISCONNECTED_ITEM, CONNECTION_PROPERTY, INFO_DRIVER_ITEM,
    INFO_INTERFACE_ITEM, INFO_NAME_ITEM, INFO_PROPERTY, INFO_VERSION_ITEM,
};
use skybridge_core::{BusEvent, Property};
use tokio::sync::mpsc;
use tracing::info;

use crate::config::DeviceConfig;

/// Item name used for single-valued extra properties
pub const VALUE_ITEM: &str = "VALUE";

/// Definition events announcing one configured device
pub fn device_events(device: &DeviceConfig) -> Result<Vec<BusEvent>> {
    let mask = device.interface.mask()?;
    let mut info = Property::new(&device.name, INFO_PROPERTY)
        .with_item(INFO_INTERFACE_ITEM, mask.to_string());
    if let Some(display_name) = &device.display_name {
        info = info.with_item(INFO_NAME_ITEM, display_name.as_str());
    }
    if let Some(driver) = &device.driver {
        info = info.with_item(INFO_DRIVER_ITEM, driver.as_str());
    }
    if let Some(version) = &device.version {
        info = info.with_item(INFO_VERSION_ITEM, version.as_str());
    }

    let (connected, disconnected) = if device.connected { ("ON", "OFF") } else { ("OFF", "ON") };
    let connection = Property::new(&device.name, CONNECTION_PROPERTY)
        .with_item(CONNECTION_CONNECTED_ITEM, connected)
        .with_item(CONNECTION_DISCONNECTED_ITEM, disconnected);

    let mut events = vec![BusEvent::Defined(info), BusEvent::Defined(connection)];
    events.extend(device.properties.iter().map(|(name, value)| {
        BusEvent::Defined(Property::new(&device.name, name).with_item(VALUE_ITEM, value.as_str()))
    }));
    Ok(events)
}

/// Push definitions for every configured device into the listener
pub async fn announce(devices: &[DeviceConfig], events: &mpsc::Sender<BusEvent>) -> Result<()> {
    for device in devices {
        for event in device_events(device)? {
            events.send(event).await?;
        }
        info!(device = %device.name, "Configured device announced");
    }
    Ok(())
}
