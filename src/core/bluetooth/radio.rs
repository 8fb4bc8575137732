//! Radio capability seam for the connection core.
//! The platform BLE stack is reached only through the [`RadioHandle`] trait;
//! its out-of-band connection notifications arrive as typed messages on a
//! broadcast channel.

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::core::bluetooth::types::ServiceDescriptor;
use crate::error::BleError;

/// Connection state reported by the radio layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Connected,
    Disconnected,
}

/// Out-of-band notification from the radio: the link to `device_id` changed
/// state. `status` carries the platform status code, or the omit sentinel
/// when the platform has none.
#[derive(Debug, Clone)]
pub struct ConnectionStateChange {
    pub device_id: String,
    pub state: LinkState,
    pub status: i32,
}

/// Opaque capability over one platform connection object.
///
/// All methods resolve or reject asynchronously; a radio that never answers
/// leaves the caller pending, timeouts are the caller's policy.
#[async_trait::async_trait]
pub trait RadioHandle: Send + Sync {
    /// Issue a connect request. Resolves once the request is accepted by the
    /// stack; the actual state change arrives later via [`state_changes`].
    ///
    /// [`state_changes`]: RadioHandle::state_changes
    async fn connect(&self) -> Result<(), BleError>;

    /// Issue a disconnect request.
    async fn disconnect(&self) -> Result<(), BleError>;

    /// Query the peripheral's GATT services. May contain duplicate entries
    /// for the same service UUID; deduplication is the caller's concern.
    async fn services(&self) -> Result<Vec<ServiceDescriptor>, BleError>;

    /// Read the current signal strength in dBm.
    async fn read_rssi(&self) -> Result<i16, BleError>;

    /// Request an MTU change and return the value the radio granted.
    async fn set_mtu_size(&self, mtu: u16) -> Result<u16, BleError>;

    /// Subscribe to connection state-change notifications. Each call returns
    /// an independent receiver; only messages sent after subscription are
    /// observed.
    fn state_changes(&self) -> broadcast::Receiver<ConnectionStateChange>;
}

/// Handle on a spawned state-change listener task.
///
/// Held in a single slot by the connection: installing a new listener stops
/// the previous one first, so at most one listener is ever active per
/// peripheral.
pub struct StateChangeListener {
    cancel_token: CancellationToken,
    task_handle: JoinHandle<()>,
}

impl StateChangeListener {
    pub fn new(cancel_token: CancellationToken, task_handle: JoinHandle<()>) -> Self {
        Self {
            cancel_token,
            task_handle,
        }
    }

    /// Cancels the listener task. Safe to call from sync context; the task
    /// holds no lock across its await points.
    pub fn stop(&self) {
        self.cancel_token.cancel();
        self.task_handle.abort();
    }
}

impl Drop for StateChangeListener {
    fn drop(&mut self) {
        self.cancel_token.cancel();
        self.task_handle.abort();
    }
}
