//! Defines shared data structures for the Bluetooth module.

use data_encoding::BASE64;
use serde::Serialize;
use uuid::Uuid;

/// Public read model of a peripheral, recomputed on demand from the
/// connection's current fields. Field names match the host bridge wire shape.
#[derive(Debug, Clone, Serialize)]
pub struct PeripheralSummary {
    /// Stable hardware identifier of the peripheral
    pub id: String,
    /// The advertised name, if one was seen
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Last-known signal strength in dBm
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rssi: Option<i16>,
    /// Decoded view of the advertising payload
    pub advertising: AdvertisingData,
}

/// Decoded advertising block of a [`PeripheralSummary`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvertisingData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_name: Option<String>,
    pub is_connectable: bool,
    pub raw_data: RawAdvertisingData,
}

/// Raw advertising bytes packaged alongside their base64 encoding.
#[derive(Debug, Clone, Serialize)]
pub struct RawAdvertisingData {
    /// Always "base64"; identifies how `data` is encoded.
    pub encoding: &'static str,
    /// Base64 of the advertising bytes, empty when no payload was captured.
    pub data: String,
    /// The raw bytes themselves, `None` when no payload was captured.
    pub bytes: Option<Vec<u8>>,
}

impl RawAdvertisingData {
    pub fn from_bytes(bytes: Option<&[u8]>) -> Self {
        Self {
            encoding: "base64",
            data: bytes.map(|b| BASE64.encode(b)).unwrap_or_default(),
            bytes: bytes.map(|b| b.to_vec()),
        }
    }
}

/// Per-service record as reported by the radio. Keyed by the service UUID;
/// consumers must not assume anything beyond the identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceDescriptor {
    pub uuid: Uuid,
}

impl ServiceDescriptor {
    pub fn new(uuid: Uuid) -> Self {
        Self { uuid }
    }
}

/// Payload of the `PeripheralConnected` / `PeripheralDisconnected` events.
/// `status` is dropped from the serialized payload when the radio had no
/// meaningful status code to report.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectPeripheralEvent {
    pub peripheral: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<i32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_data_without_payload_is_empty() {
        let raw = RawAdvertisingData::from_bytes(None);
        assert_eq!(raw.encoding, "base64");
        assert_eq!(raw.data, "");
        assert!(raw.bytes.is_none());
    }

    #[test]
    fn raw_data_encodes_payload() {
        let raw = RawAdvertisingData::from_bytes(Some(&[0x02, 0x01, 0x06]));
        assert_eq!(raw.data, "AgEG");
        assert_eq!(raw.bytes.as_deref(), Some(&[0x02u8, 0x01, 0x06][..]));
    }

    #[test]
    fn event_payload_omits_sentinel_status() {
        let event = ConnectPeripheralEvent {
            peripheral: "AA:BB:CC:DD:EE:FF".to_string(),
            status: None,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert!(json.get("status").is_none());
        assert_eq!(json["peripheral"], "AA:BB:CC:DD:EE:FF");
    }
}
