//! Bluetooth functionality for the peripheral bridge
//! This module handles the lifecycle of a single peripheral connection:
//! state tracking, service discovery, MTU and RSSI operations, and the
//! lifecycle events published to the host.

mod bluest_radio;
mod constants;
mod peripheral;
mod radio;
mod types;

// Re-export types that should be publicly accessible
pub use bluest_radio::{connection_for_device, BluestRadio};
pub use constants::*; // Re-export all constants
pub use peripheral::{ConnectionState, PeripheralConnection};
pub use radio::{ConnectionStateChange, LinkState, RadioHandle, StateChangeListener};
pub use types::{
    AdvertisingData, ConnectPeripheralEvent, PeripheralSummary, RawAdvertisingData,
    ServiceDescriptor,
};
