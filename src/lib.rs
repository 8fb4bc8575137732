//! BLE peripheral bridge library
//! Manages the lifecycle of a single BLE peripheral connection on behalf of
//! a host application bridge: the connection state machine, advertising
//! decoding, MTU and RSSI operations, and event-driven service discovery.

// Module declarations
pub mod config;
pub mod core;
pub mod error;
pub mod gateway;

pub use config::ConnectionConfig;
pub use crate::core::bluetooth::{
    ConnectionState, ConnectionStateChange, LinkState, PeripheralConnection, PeripheralSummary,
    RadioHandle, ServiceDescriptor,
};
pub use error::BleError;
pub use gateway::{ChannelGateway, EventGateway, GatewayEvent};

// Initialize logging
pub fn init_logging() {
    env_logger::init();
    log::info!("Logging initialized");
}
