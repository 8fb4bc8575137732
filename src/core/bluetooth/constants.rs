//! Constants used throughout the connection core
//! This module contains event names, sentinel values and other fixed
//! configuration shared by the bluetooth modules.

use std::time::Duration;

/// Event emitted to the host when a peripheral reaches the connected state.
pub const EVENT_PERIPHERAL_CONNECTED: &str = "PeripheralConnected";

/// Event emitted to the host when a peripheral drops to disconnected.
pub const EVENT_PERIPHERAL_DISCONNECTED: &str = "PeripheralDisconnected";

/// Status value meaning "no meaningful status code"; the field is omitted
/// from the event payload entirely when this sentinel is passed.
pub const STATUS_OMITTED: i32 = -1;

/// Capacity of the radio state-change broadcast channel.
pub const STATE_CHANNEL_CAPACITY: usize = 16;

/// Sampling interval of the bluest connection monitor task.
pub const CONNECTION_POLL_INTERVAL: Duration = Duration::from_millis(250);
