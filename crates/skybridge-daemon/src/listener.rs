//! Bus event listener
//!
//! Consumes the bus's serialized lifecycle and property events and keeps the
//! registry and the translator cache in step with them.

use skybridge_core::bus::{
    INFO_DRIVER_ITEM, INFO_INTERFACE_ITEM, INFO_NAME_ITEM, INFO_VERSION_ITEM,
};
use skybridge_core::{BusEvent, DeviceCategory, DeviceEntry, Property};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::state::AppState;

/// Consume bus events until the bus side of the channel closes
pub async fn run(state: Arc<AppState>, mut events: mpsc::Receiver<BusEvent>) {
    info!("Bus event listener started");
    while let Some(event) = events.recv().await {
        handle_event(&state, event);
    }
    info!("Bus event listener stopped");
}

/// Apply one bus event
pub fn handle_event(state: &AppState, event: BusEvent) {
    match &event {
        BusEvent::Defined(property) => {
            let (entry, created) = state.registry.ensure(&property.device);
            if created {
                info!(
                    device = %entry.name(),
                    number = entry.number(),
                    uid = %entry.unique_id(),
                    "Bus device registered"
                );
            }
            if property.is_info() {
                apply_info(state, &entry, property);
            } else {
                state.translator.update_property(&entry, property);
            }
        }
        BusEvent::Updated(property) => match state.registry.get(&property.device) {
            Some(entry) => state.translator.update_property(&entry, property),
            None => debug!(
                device = %property.device,
                property = %property.name,
                "Update for unknown device"
            ),
        },
        BusEvent::Deleted { device, .. } if event.is_disconnect() => {
            if let Some(entry) = state.registry.remove(device) {
                state.translator.forget(device);
                info!(device = %device, number = entry.number(), "Bus device removed");
                if entry.is_classified() {
                    state.publish_mapping();
                }
            }
        }
        BusEvent::Deleted { device, property } => {
            debug!(device = %device, property = %property, "Property deleted");
        }
    }
}

/// Copy information property items into the entry
fn apply_info(state: &AppState, entry: &DeviceEntry, property: &Property) {
    for item in &property.items {
        match item.name.as_str() {
            INFO_INTERFACE_ITEM => {
                let mask = item.value.trim().parse::<u64>().unwrap_or(0);
                let category = DeviceCategory::from_interface(mask);
                let previous = entry.category();
                entry.set_category(category);
                if previous != category {
                    match category {
                        Some(category) => info!(
                            device = %entry.name(),
                            category = %category,
                            number = entry.number(),
                            "Device classified"
                        ),
                        None => debug!(device = %entry.name(), mask, "Device left unclassified"),
                    }
                    state.publish_mapping();
                }
            }
            INFO_NAME_ITEM => entry.set_display_name(&item.value),
            INFO_DRIVER_ITEM => entry.set_driver_info(&item.value),
            INFO_VERSION_ITEM => entry.set_driver_version(&item.value),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{info_property, test_state};
    use skybridge_core::bus::CONNECTION_PROPERTY;
    use skybridge_core::interface;

    #[test]
    fn test_defined_creates_and_classifies() {
        let (state, _) = test_state();
        handle_event(
            &state,
            BusEvent::Defined(info_property("CCD Imager Simulator", interface::CAMERA, "Imager")),
        );

        let entry = state.registry.get("CCD Imager Simulator").unwrap();
        assert_eq!(entry.category(), Some(DeviceCategory::Camera));
        assert_eq!(entry.display_name(), "Imager");
        assert_eq!(entry.meta().driver_version, "2.0");

        let mapping = state.mapping();
        assert_eq!(mapping.len(), 1);
        assert_eq!(mapping[0].label, "Camera/0");
    }

    #[test]
    fn test_unclassified_is_retained_but_hidden() {
        let (state, _) = test_state();
        handle_event(
            &state,
            BusEvent::Defined(info_property("GPS Simulator", interface::GPS, "GPS")),
        );
        assert!(state.registry.get("GPS Simulator").is_some());
        assert!(state.registry.configured_devices().is_empty());
        assert!(state.mapping().is_empty());
    }

    #[test]
    fn test_redefined_with_unknown_mask_is_declassified() {
        let (state, _) = test_state();
        handle_event(
            &state,
            BusEvent::Defined(info_property("Dome Simulator", interface::DOME, "Dome")),
        );
        handle_event(
            &state,
            BusEvent::Defined(info_property("Mount Simulator", interface::MOUNT, "EQ6")),
        );
        assert_eq!(state.mapping().len(), 2);

        handle_event(
            &state,
            BusEvent::Defined(info_property("Dome Simulator", interface::AGENT, "Dome")),
        );

        let entry = state.registry.get("Dome Simulator").unwrap();
        assert_eq!(entry.category(), None);
        assert_eq!(entry.number(), 0);
        let devices = state.registry.configured_devices();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].device_type, "Telescope");
        let mapping = state.mapping();
        assert_eq!(mapping.len(), 1);
        assert_eq!(mapping[0].label, "Telescope/1");
    }

    #[test]
    fn test_other_properties_reach_translator() {
        let (state, translator) = test_state();
        let property = Property::new("Mount Simulator", "MOUNT_PARK").with_item("PARKED", "ON");
        handle_event(&state, BusEvent::Defined(property.clone()));
        handle_event(
            &state,
            BusEvent::Updated(
                Property::new("Mount Simulator", "MOUNT_PARK").with_item("PARKED", "OFF"),
            ),
        );
        handle_event(
            &state,
            BusEvent::Updated(Property::new("Never Defined", "X").with_item("Y", "1")),
        );

        let updates = translator.updates();
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0], ("Mount Simulator".to_string(), "MOUNT_PARK".to_string()));
        assert!(state.registry.get("Never Defined").is_none());
    }

    #[test]
    fn test_deletion_removes_entry() {
        let (state, translator) = test_state();
        handle_event(
            &state,
            BusEvent::Defined(info_property("Focuser Simulator", interface::FOCUSER, "Focuser")),
        );
        handle_event(
            &state,
            BusEvent::Defined(info_property("Wheel Simulator", interface::FILTER_WHEEL, "Wheel")),
        );

        handle_event(
            &state,
            BusEvent::Deleted {
                device: "Focuser Simulator".to_string(),
                property: "FOCUSER_POSITION".to_string(),
            },
        );
        assert!(state.registry.get("Focuser Simulator").is_some());

        handle_event(
            &state,
            BusEvent::Deleted {
                device: "Focuser Simulator".to_string(),
                property: CONNECTION_PROPERTY.to_string(),
            },
        );
        assert!(state.registry.get("Focuser Simulator").is_none());
        assert_eq!(translator.forgotten(), vec!["Focuser Simulator".to_string()]);
        assert_eq!(state.mapping().len(), 1);
        assert_eq!(state.mapping()[0].label, "FilterWheel/1");

        handle_event(
            &state,
            BusEvent::Deleted {
                device: "Wheel Simulator".to_string(),
                property: String::new(),
            },
        );
        assert!(state.registry.entries().is_empty());
        assert!(state.mapping().is_empty());
    }

    #[tokio::test]
    async fn test_run_consumes_channel() {
        let (state, _) = test_state();
        let (tx, rx) = mpsc::channel(8);
        let task = tokio::spawn(run(state.clone(), rx));

        tx.send(BusEvent::Defined(info_property("Dome Simulator", interface::DOME, "Dome")))
            .await
            .unwrap();
        drop(tx);
        task.await.unwrap();

        assert_eq!(state.registry.configured_devices()[0].device_type, "Dome");
    }
}
