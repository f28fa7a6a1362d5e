//! Skybridge Discovery - Alpaca UDP discovery
//!
//! Alpaca clients broadcast a probe containing `alpacadiscovery1` and expect a
//! single datagram back naming the TCP port of the REST API. This crate provides:
//! - The responder loop bound to one UDP port
//! - A restartable service wrapper for live port changes

pub mod responder;
pub mod service;

pub use responder::{DiscoveryError, DiscoveryResponder, DEFAULT_DISCOVERY_PORT, DISCOVERY_TOKEN};
pub use service::{DiscoveryService, DiscoveryStatus};
