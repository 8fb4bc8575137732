//! Event gateway to the host application.
//! The connection core pushes named lifecycle events through this seam; the
//! host bridge on the other side forwards them to application listeners.

use anyhow::{anyhow, Result};
use serde_json::Value;
use tokio::sync::mpsc;

/// A named event with its structured payload, as delivered to the host.
#[derive(Debug, Clone)]
pub struct GatewayEvent {
    pub name: String,
    pub payload: Value,
}

/// Outbound event sink consumed by the connection core.
///
/// Fire-and-forget: there is no acknowledgment and callers must not assume
/// delivery succeeded. Emit failures are logged at the call site and
/// otherwise ignored.
pub trait EventGateway: Send + Sync {
    fn emit(&self, event: &str, payload: Value) -> Result<()>;
}

/// Gateway backed by an unbounded channel, for hosts that drain events from
/// their own dispatch loop.
pub struct ChannelGateway {
    tx: mpsc::UnboundedSender<GatewayEvent>,
}

impl ChannelGateway {
    /// Creates the gateway and the receiving end the host drains.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<GatewayEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventGateway for ChannelGateway {
    fn emit(&self, event: &str, payload: Value) -> Result<()> {
        self.tx
            .send(GatewayEvent {
                name: event.to_string(),
                payload,
            })
            .map_err(|_| anyhow!("host event channel closed"))?;
        Ok(())
    }
}
