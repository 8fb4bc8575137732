//! Connection behavior configuration.

use serde::{Deserialize, Serialize};

/// Tunable behavior of a [`crate::PeripheralConnection`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// When true, concurrent `discover_services` calls on the same
    /// peripheral share a single in-flight request instead of each issuing
    /// their own connect-and-query sequence.
    pub coalesce_discovery: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            coalesce_discovery: false,
        }
    }
}
