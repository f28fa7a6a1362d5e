//! Skybridge Core - Bus model, device registry, and command translation
//!
//! This crate provides the foundational types for the Skybridge bridge:
//! - Bus property and lifecycle event types
//! - Device registry with stable Alpaca device numbers and unique IDs
//! - Capability classification into Alpaca device categories
//! - Server transaction counter
//! - The command translator seam plus a translator for the common Alpaca interface

pub mod bus;
pub mod device;
pub mod registry;
pub mod transaction;
pub mod translator;
pub mod uid;

pub use bus::{interface, BusEvent, Property, PropertyItem};
pub use device::{DeviceCategory, DeviceEntry, DeviceMeta};
pub use registry::{ConfiguredDevice, DeviceMapping, Registry, RegistryError};
pub use transaction::TransactionCounter;
pub use translator::{CommandTranslator, CommonTranslator, Fragment, TranslatorError};
pub use uid::unique_id;
