//! Radio handle backed by the bluest cross-platform BLE library.
//!
//! The platform stacks bluest wraps do not expose a uniform connection
//! event API, so link-state notifications are synthesized by a monitor
//! task sampling `Device::is_connected`.

use std::sync::Arc;

use bluest::{Adapter, Device};
use log::{debug, info, warn};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::config::ConnectionConfig;
use crate::core::bluetooth::constants::{
    CONNECTION_POLL_INTERVAL, STATE_CHANNEL_CAPACITY, STATUS_OMITTED,
};
use crate::core::bluetooth::peripheral::PeripheralConnection;
use crate::core::bluetooth::radio::{
    ConnectionStateChange, LinkState, RadioHandle, StateChangeListener,
};
use crate::core::bluetooth::types::ServiceDescriptor;
use crate::error::BleError;
use crate::gateway::EventGateway;

/// Platform connection object for one peripheral.
pub struct BluestRadio {
    adapter: Adapter,
    device: Device,
    events_tx: broadcast::Sender<ConnectionStateChange>,
    // Held for its Drop: cancels the monitor when the radio goes away.
    _monitor: StateChangeListener,
}

impl BluestRadio {
    /// Wraps an adapter/device pair and starts the connection monitor.
    pub fn new(adapter: Adapter, device: Device) -> Self {
        let (events_tx, _) = broadcast::channel(STATE_CHANNEL_CAPACITY);
        let monitor = Self::spawn_monitor(device.clone(), events_tx.clone());
        Self {
            adapter,
            device,
            events_tx,
            _monitor: monitor,
        }
    }

    pub fn device_id(&self) -> String {
        self.device.id().to_string()
    }

    /// Samples the link state on an interval and broadcasts transitions.
    fn spawn_monitor(
        device: Device,
        events_tx: broadcast::Sender<ConnectionStateChange>,
    ) -> StateChangeListener {
        let cancel_token = CancellationToken::new();
        let token_for_task = cancel_token.clone();

        let handle = tokio::spawn(async move {
            let device_id = device.id().to_string();
            let mut was_connected = false;
            let mut interval = tokio::time::interval(CONNECTION_POLL_INTERVAL);

            loop {
                tokio::select! {
                    _ = token_for_task.cancelled() => break,
                    _ = interval.tick() => {
                        let connected = device.is_connected().await;
                        if connected != was_connected {
                            was_connected = connected;
                            let state = if connected {
                                LinkState::Connected
                            } else {
                                LinkState::Disconnected
                            };
                            debug!("Link to {} is now {:?}", device_id, state);
                            // Send fails only when nobody is subscribed yet.
                            let _ = events_tx.send(ConnectionStateChange {
                                device_id: device_id.clone(),
                                state,
                                status: STATUS_OMITTED,
                            });
                        }
                    }
                }
            }
        });

        StateChangeListener::new(cancel_token, handle)
    }
}

#[async_trait::async_trait]
impl RadioHandle for BluestRadio {
    async fn connect(&self) -> Result<(), BleError> {
        if self.device.is_connected().await {
            info!("Device {} already connected", self.device.id());
            return Ok(());
        }
        info!("Initiating connection to {}...", self.device.id());
        self.adapter
            .connect_device(&self.device)
            .await
            .map_err(radio_error)
    }

    async fn disconnect(&self) -> Result<(), BleError> {
        if self.device.is_connected().await {
            info!("Disconnecting from device {}", self.device.id());
            self.adapter
                .disconnect_device(&self.device)
                .await
                .map_err(radio_error)?;
        } else {
            info!("Device {} not connected", self.device.id());
        }
        Ok(())
    }

    async fn services(&self) -> Result<Vec<ServiceDescriptor>, BleError> {
        let services = self.device.services().await.map_err(radio_error)?;
        Ok(services
            .iter()
            .map(|service| ServiceDescriptor::new(service.uuid()))
            .collect())
    }

    async fn read_rssi(&self) -> Result<i16, BleError> {
        self.device.rssi().await.map_err(radio_error)
    }

    async fn set_mtu_size(&self, mtu: u16) -> Result<u16, BleError> {
        // bluest negotiates the MTU inside the platform stack during
        // connection establishment; there is no request API to call.
        warn!(
            "MTU request of {} for {} noted; platform negotiates the MTU itself",
            mtu,
            self.device.id()
        );
        Ok(mtu)
    }

    fn state_changes(&self) -> broadcast::Receiver<ConnectionStateChange> {
        self.events_tx.subscribe()
    }
}

/// The platform error carries no portable numeric code; the message is
/// passed through verbatim.
fn radio_error(e: bluest::Error) -> BleError {
    BleError::Radio {
        code: STATUS_OMITTED,
        message: e.to_string(),
    }
}

/// Builds a [`PeripheralConnection`] for a device handed over by the
/// scanning collaborator, with the bluest radio already bound.
pub fn connection_for_device(
    adapter: Adapter,
    device: Device,
    gateway: Arc<dyn EventGateway>,
    config: ConnectionConfig,
) -> PeripheralConnection {
    let connection = PeripheralConnection::new(device.id().to_string(), gateway, config);
    if let Ok(name) = device.name() {
        connection.set_device_name(name);
    }
    connection.set_radio_handle(Arc::new(BluestRadio::new(adapter, device)));
    connection
}
