//! Shared fixtures for daemon tests

use skybridge_core::bus::{
    INFO_DRIVER_ITEM, INFO_INTERFACE_ITEM, INFO_NAME_ITEM, INFO_PROPERTY, INFO_VERSION_ITEM,
};
use skybridge_core::translator::{ok_fragment, value_fragment};
use skybridge_core::{CommandTranslator, DeviceEntry, Fragment, Property, TranslatorError};
use std::sync::{Arc, Mutex};

use crate::config::Config;
use crate::state::AppState;

/// Write call captured by [`RecordingTranslator`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteCall {
    pub device: String,
    pub command: String,
    pub arg0: Option<String>,
    pub arg1: Option<String>,
}

/// Translator that records calls and accepts every command except `bogus`
#[derive(Default)]
pub struct RecordingTranslator {
    writes: Mutex<Vec<WriteCall>>,
    updates: Mutex<Vec<(String, String)>>,
    forgotten: Mutex<Vec<String>>,
}

impl RecordingTranslator {
    pub fn writes(&self) -> Vec<WriteCall> {
        self.writes.lock().unwrap().clone()
    }

    pub fn updates(&self) -> Vec<(String, String)> {
        self.updates.lock().unwrap().clone()
    }

    pub fn forgotten(&self) -> Vec<String> {
        self.forgotten.lock().unwrap().clone()
    }
}

impl CommandTranslator for RecordingTranslator {
    fn read(
        &self,
        device: &DeviceEntry,
        _interface_version: u32,
        command: &str,
    ) -> Result<Fragment, TranslatorError> {
        match command {
            "bogus" => Err(TranslatorError::Unsupported(command.to_string())),
            "huge" => Ok(value_fragment(serde_json::json!("x".repeat(200 * 1024)))),
            _ => Ok(value_fragment(serde_json::json!(format!(
                "{}:{}",
                device.name(),
                command
            )))),
        }
    }

    fn write(
        &self,
        device: &DeviceEntry,
        _interface_version: u32,
        command: &str,
        arg0: Option<&str>,
        arg1: Option<&str>,
    ) -> Result<Fragment, TranslatorError> {
        if command == "bogus" {
            return Err(TranslatorError::Unsupported(command.to_string()));
        }
        self.writes.lock().unwrap().push(WriteCall {
            device: device.name().to_string(),
            command: command.to_string(),
            arg0: arg0.map(str::to_string),
            arg1: arg1.map(str::to_string),
        });
        Ok(ok_fragment())
    }

    fn update_property(&self, device: &DeviceEntry, property: &Property) {
        self.updates
            .lock()
            .unwrap()
            .push((device.name().to_string(), property.name.clone()));
    }

    fn forget(&self, device: &str) {
        self.forgotten.lock().unwrap().push(device.to_string());
    }
}

/// State with default configuration and a recording translator
pub fn test_state() -> (Arc<AppState>, Arc<RecordingTranslator>) {
    let mut config = Config::default();
    config.discovery.port = 0;
    let translator = Arc::new(RecordingTranslator::default());
    let state = AppState::new(config, translator.clone(), 11111);
    (state, translator)
}

/// Information property announcing a device with the given capability mask
pub fn info_property(device: &str, mask: u64, display_name: &str) -> Property {
    Property::new(device, INFO_PROPERTY)
        .with_item(INFO_INTERFACE_ITEM, mask.to_string())
        .with_item(INFO_NAME_ITEM, display_name)
        .with_item(INFO_DRIVER_ITEM, "test_driver")
        .with_item(INFO_VERSION_ITEM, "2.0")
}
