//! Error taxonomy for peripheral operations.
//!
//! All failures cross the operation boundary as one of these variants;
//! nothing in the connection core panics or leaks a platform error type.

use thiserror::Error;

/// Errors produced by [`crate::PeripheralConnection`] operations.
///
/// `Clone` so a coalesced service discovery can hand the same outcome to
/// every caller sharing the in-flight request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BleError {
    /// The operation requires an active connection.
    #[error("peripheral is not connected")]
    NotConnected,

    /// No radio handle is bound to this peripheral.
    #[error("no radio handle bound to peripheral")]
    NoDevice,

    /// A caller-supplied parameter was missing, zero or malformed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The platform radio layer reported a failure; code and message are
    /// passed through verbatim.
    #[error("radio error {code}: {message}")]
    Radio { code: i32, message: String },

    /// Service discovery hit an unexpected internal fault (for example the
    /// radio notification channel closed mid-wait).
    #[error("service discovery failed: {0}")]
    DiscoveryFailed(String),
}
