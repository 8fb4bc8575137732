//! Core functionality for the peripheral bridge
//! This module contains the connection state machine and its radio seam

pub mod bluetooth;

// Re-export commonly used types
pub use bluetooth::{ConnectionState, PeripheralConnection, RadioHandle};
