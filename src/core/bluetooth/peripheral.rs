//! Peripheral connection lifecycle
//! This module owns one peripheral's identity, advertising snapshot and
//! connection state machine, and the async operations that depend on them.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use futures_util::future::{BoxFuture, FutureExt, Shared};
use log::{debug, error, info, warn};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::config::ConnectionConfig;
use crate::core::bluetooth::constants::{
    EVENT_PERIPHERAL_CONNECTED, EVENT_PERIPHERAL_DISCONNECTED, STATUS_OMITTED,
};
use crate::core::bluetooth::radio::{
    ConnectionStateChange, LinkState, RadioHandle, StateChangeListener,
};
use crate::core::bluetooth::types::{
    AdvertisingData, ConnectPeripheralEvent, PeripheralSummary, RawAdvertisingData,
    ServiceDescriptor,
};
use crate::error::BleError;
use crate::gateway::EventGateway;

/// Connectivity of a peripheral. `Disconnected` is the initial state and is
/// re-enterable indefinitely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Mutable fields shared with the state-change listener task.
struct PeripheralState {
    device_name: Option<String>,
    rssi: Option<i16>,
    advertising_data: Option<Vec<u8>>,
    connection_state: ConnectionState,
}

type DiscoveryResult = Result<Vec<ServiceDescriptor>, BleError>;
type SharedDiscovery = Shared<BoxFuture<'static, DiscoveryResult>>;

/// One peripheral's connection lifecycle.
///
/// Cheaply cloneable handle; clones share the same underlying state. The
/// connection state is mutated only through the operations below, driven
/// either by caller intent or by radio state-change notifications.
#[derive(Clone)]
pub struct PeripheralConnection {
    device_id: String,
    config: ConnectionConfig,
    gateway: Arc<dyn EventGateway>,
    state: Arc<Mutex<PeripheralState>>,
    radio: Arc<Mutex<Option<Arc<dyn RadioHandle>>>>,
    /// Single-slot lifecycle listener; installing a new one stops the old.
    listener: Arc<Mutex<Option<StateChangeListener>>>,
    /// In-flight discovery shared by all callers when coalescing is enabled.
    discovery: Arc<tokio::sync::Mutex<Option<SharedDiscovery>>>,
}

impl PeripheralConnection {
    /// Creates a disconnected peripheral with no radio handle bound.
    ///
    /// Panics when `device_id` is empty; the identifier is the key every
    /// notification and event is matched on.
    pub fn new(
        device_id: impl Into<String>,
        gateway: Arc<dyn EventGateway>,
        config: ConnectionConfig,
    ) -> Self {
        let device_id = device_id.into();
        assert!(!device_id.is_empty(), "device_id must be non-empty");
        Self {
            device_id,
            config,
            gateway,
            state: Arc::new(Mutex::new(PeripheralState {
                device_name: None,
                rssi: None,
                advertising_data: None,
                connection_state: ConnectionState::Disconnected,
            })),
            radio: Arc::new(Mutex::new(None)),
            listener: Arc::new(Mutex::new(None)),
            discovery: Arc::new(tokio::sync::Mutex::new(None)),
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn device_name(&self) -> Option<String> {
        self.state.lock().unwrap().device_name.clone()
    }

    /// Updates the advertised name (set by the scanning collaborator).
    pub fn set_device_name(&self, name: impl Into<String>) {
        self.state.lock().unwrap().device_name = Some(name.into());
    }

    pub fn rssi(&self) -> Option<i16> {
        self.state.lock().unwrap().rssi
    }

    /// Updates the advertising-time signal strength.
    pub fn set_rssi(&self, rssi: i16) {
        self.state.lock().unwrap().rssi = Some(rssi);
    }

    /// Replaces the advertising snapshot when a fresh advertisement arrives.
    pub fn set_advertising_data(&self, data: Vec<u8>) {
        self.state.lock().unwrap().advertising_data = Some(data);
    }

    /// Binds (or rebinds) the platform connection object.
    pub fn set_radio_handle(&self, radio: Arc<dyn RadioHandle>) {
        *self.radio.lock().unwrap() = Some(radio);
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.state.lock().unwrap().connection_state
    }

    pub fn is_connected(&self) -> bool {
        self.connection_state() == ConnectionState::Connected
    }

    pub fn is_connecting(&self) -> bool {
        self.connection_state() == ConnectionState::Connecting
    }

    /// Initiates a connection. Returns immediately after the connect request
    /// is issued; the authoritative `Connected` transition arrives later via
    /// the radio notification channel.
    ///
    /// Soft failure: returns false when no radio handle is bound or the
    /// radio rejects the request. No-op returning true when already
    /// connected or connecting.
    pub async fn connect(&self) -> bool {
        match self.connection_state() {
            ConnectionState::Connected | ConnectionState::Connecting => {
                debug!(
                    "Peripheral {} already connected or connecting",
                    self.device_id
                );
                return true;
            }
            ConnectionState::Disconnected => {}
        }

        let Some(radio) = self.radio_handle() else {
            warn!(
                "Connect requested for {} but no radio handle is bound",
                self.device_id
            );
            return false;
        };

        // Subscribe before issuing the request so no notification is missed.
        self.install_state_listener(&radio);

        // Connecting starts when the request is issued; the listener may
        // advance the state to Connected while the accept is still awaited.
        self.set_connection_state(ConnectionState::Connecting);
        info!("Connecting to {}...", self.device_id);

        match radio.connect().await {
            Ok(()) => true,
            Err(e) => {
                error!("Connect request for {} rejected: {}", self.device_id, e);
                // Roll back only an untouched Connecting; a notification
                // that landed during the await keeps its transition.
                let rolled_back = {
                    let mut state = self.state.lock().unwrap();
                    if state.connection_state == ConnectionState::Connecting {
                        state.connection_state = ConnectionState::Disconnected;
                        true
                    } else {
                        false
                    }
                };
                if rolled_back {
                    self.unsubscribe_state_changes();
                }
                false
            }
        }
    }

    /// Disconnects. Sets the state to `Disconnected` immediately without
    /// waiting for the radio notification; no-op when no handle is bound.
    /// Does not retract an in-flight discovery.
    pub async fn disconnect(&self) {
        self.set_connection_state(ConnectionState::Disconnected);

        let Some(radio) = self.radio_handle() else {
            return;
        };
        if let Err(e) = radio.disconnect().await {
            error!("Disconnect request for {} failed: {}", self.device_id, e);
        }
    }

    /// Reads the current signal strength and refreshes the cached value.
    pub async fn read_signal_strength(&self) -> Result<i16, BleError> {
        if !self.is_connected() {
            return Err(BleError::NotConnected);
        }
        let radio = self.radio_handle().ok_or(BleError::NoDevice)?;
        let rssi = radio.read_rssi().await?;
        self.state.lock().unwrap().rssi = Some(rssi);
        Ok(rssi)
    }

    /// Requests an MTU change.
    ///
    /// Resolves with the requested value, not the granted one; when the two
    /// differ the granted value is logged at warn level. Zero is rejected
    /// without contacting the radio.
    pub async fn request_mtu(&self, requested: u16) -> Result<u16, BleError> {
        if !self.is_connected() {
            return Err(BleError::NotConnected);
        }
        let radio = self.radio_handle().ok_or(BleError::NoDevice)?;
        if requested == 0 {
            return Err(BleError::InvalidArgument(
                "requested MTU must be non-zero".to_string(),
            ));
        }

        let granted = radio.set_mtu_size(requested).await?;
        if granted != requested {
            warn!(
                "Radio granted MTU {} for {} (requested {})",
                granted, self.device_id, requested
            );
        }
        Ok(requested)
    }

    /// Discovers the peripheral's GATT services, deduplicated by service
    /// UUID with first-seen order preserved.
    ///
    /// When not connected, initiates a connect and defers the query until
    /// the matching `Connected` notification fires. Concurrent calls are
    /// independent unless [`ConnectionConfig::coalesce_discovery`] is set,
    /// in which case they share one in-flight request.
    pub async fn discover_services(&self) -> DiscoveryResult {
        if !self.config.coalesce_discovery {
            return self.clone().run_discovery().await;
        }

        let shared = {
            let mut slot = self.discovery.lock().await;
            match slot.as_ref() {
                Some(inflight) => inflight.clone(),
                None => {
                    let fut: SharedDiscovery = self.clone().run_discovery().boxed().shared();
                    *slot = Some(fut.clone());
                    fut
                }
            }
        };

        let result = shared.clone().await;

        let mut slot = self.discovery.lock().await;
        if slot.as_ref().is_some_and(|inflight| inflight.ptr_eq(&shared)) {
            *slot = None;
        }
        result
    }

    /// Releases the lifecycle listener slot, stopping the task if one is
    /// active. Further radio notifications are ignored until the next
    /// connect attempt re-subscribes.
    pub fn unsubscribe_state_changes(&self) {
        if let Some(listener) = self.listener.lock().unwrap().take() {
            listener.stop();
        }
    }

    /// Pure projection of the current fields into the public view shape.
    /// The advertising payload is decoded on every call, never cached.
    pub fn as_summary(&self) -> PeripheralSummary {
        let state = self.state.lock().unwrap();
        let advertising = AdvertisingData {
            local_name: state.device_name.clone(),
            is_connectable: state.connection_state == ConnectionState::Connected,
            raw_data: RawAdvertisingData::from_bytes(state.advertising_data.as_deref()),
        };
        PeripheralSummary {
            id: self.device_id.clone(),
            name: state.device_name.clone(),
            rssi: state.rssi,
            advertising,
        }
    }

    fn radio_handle(&self) -> Option<Arc<dyn RadioHandle>> {
        self.radio.lock().unwrap().clone()
    }

    fn set_connection_state(&self, new_state: ConnectionState) {
        self.state.lock().unwrap().connection_state = new_state;
    }

    /// Installs the lifecycle listener into the single slot, stopping any
    /// previous one first.
    fn install_state_listener(&self, radio: &Arc<dyn RadioHandle>) {
        let rx = radio.state_changes();
        let cancel_token = CancellationToken::new();
        let task = tokio::spawn(Self::run_state_listener(
            self.clone(),
            rx,
            cancel_token.clone(),
        ));
        let previous = self
            .listener
            .lock()
            .unwrap()
            .replace(StateChangeListener::new(cancel_token, task));
        if let Some(old) = previous {
            old.stop();
        }
    }

    /// Listener task body: applies radio notifications for this peripheral
    /// to the state machine until cancelled or the channel closes.
    async fn run_state_listener(
        connection: PeripheralConnection,
        mut rx: broadcast::Receiver<ConnectionStateChange>,
        cancel_token: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = cancel_token.cancelled() => break,
                result = rx.recv() => match result {
                    Ok(change) if change.device_id == connection.device_id => {
                        connection.apply_state_change(&change);
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(
                            "State listener for {} lagged by {} notifications",
                            connection.device_id, missed
                        );
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        info!(
                            "State channel for {} closed, listener exiting",
                            connection.device_id
                        );
                        break;
                    }
                }
            }
        }
    }

    /// Applies one radio notification. Events are emitted only on an actual
    /// state transition, so repeated notifications and caller-initiated
    /// disconnects never produce duplicates.
    fn apply_state_change(&self, change: &ConnectionStateChange) {
        let event = {
            let mut state = self.state.lock().unwrap();
            match change.state {
                LinkState::Connected
                    if state.connection_state != ConnectionState::Connected =>
                {
                    state.connection_state = ConnectionState::Connected;
                    Some(EVENT_PERIPHERAL_CONNECTED)
                }
                LinkState::Disconnected
                    if state.connection_state != ConnectionState::Disconnected =>
                {
                    state.connection_state = ConnectionState::Disconnected;
                    Some(EVENT_PERIPHERAL_DISCONNECTED)
                }
                _ => None,
            }
        };

        if let Some(event) = event {
            info!("Peripheral {}: {}", self.device_id, event);
            self.send_connection_event(event, change.status);
        }
    }

    /// Emits a lifecycle event to the host. The status field is omitted
    /// when the sentinel is passed.
    fn send_connection_event(&self, event: &str, status: i32) {
        let payload = ConnectPeripheralEvent {
            peripheral: self.device_id.clone(),
            status: (status != STATUS_OMITTED).then_some(status),
        };
        match serde_json::to_value(&payload) {
            Ok(value) => {
                if let Err(e) = self.gateway.emit(event, value) {
                    error!("Failed to emit {} event: {}", event, e);
                }
            }
            Err(e) => error!("Failed to serialize {} payload: {}", event, e),
        }
    }

    /// One discovery round: connect first when needed, then query and
    /// deduplicate. Radio errors propagate as-is; internal faults surface
    /// as `DiscoveryFailed`.
    async fn run_discovery(self) -> DiscoveryResult {
        let radio = self.radio_handle().ok_or(BleError::NoDevice)?;

        if !self.is_connected() {
            // Subscribe before initiating so the Connected notification
            // cannot slip past this waiter.
            let mut rx = radio.state_changes();
            if !self.connect().await {
                return Err(BleError::DiscoveryFailed(
                    "connect request was not accepted".to_string(),
                ));
            }
            self.wait_for_connected(&mut rx).await?;
        }

        let services = radio.services().await?;
        Ok(dedup_services(services))
    }

    /// One-shot wait for this peripheral's `Connected` notification. Other
    /// devices' messages and intermediate disconnections are skipped; the
    /// lifecycle listener handles their state effects.
    async fn wait_for_connected(
        &self,
        rx: &mut broadcast::Receiver<ConnectionStateChange>,
    ) -> Result<(), BleError> {
        loop {
            match rx.recv().await {
                Ok(change)
                    if change.device_id == self.device_id
                        && change.state == LinkState::Connected =>
                {
                    return Ok(());
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(
                        "Discovery waiter for {} lagged by {} notifications",
                        self.device_id, missed
                    );
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(BleError::DiscoveryFailed(
                        "radio state channel closed while waiting for connection".to_string(),
                    ));
                }
            }
        }
    }
}

/// Removes duplicate service entries, keeping the first occurrence of each
/// UUID. Duplicates are a known radio-stack quirk.
fn dedup_services(services: Vec<ServiceDescriptor>) -> Vec<ServiceDescriptor> {
    let mut seen = HashSet::new();
    services
        .into_iter()
        .filter(|service| seen.insert(service.uuid))
        .collect()
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    fn descriptor(n: u128) -> ServiceDescriptor {
        ServiceDescriptor::new(Uuid::from_u128(n))
    }

    #[test]
    fn dedup_preserves_first_seen_order() {
        let a = descriptor(0xa);
        let b = descriptor(0xb);
        let c = descriptor(0xc);
        let raw = vec![a.clone(), b.clone(), a.clone(), c.clone(), b.clone()];
        assert_eq!(dedup_services(raw), vec![a, b, c]);
    }

    #[test]
    fn dedup_of_unique_list_is_identity() {
        let raw = vec![descriptor(1), descriptor(2), descriptor(3)];
        assert_eq!(dedup_services(raw.clone()), raw);
    }
}
