//! LAN discovery datagrams.
//!
//! A remote broadcasts a `discover` request on the discovery port; every host on
//! the LAN answers with a unicast `announce` carrying the address of its
//! WebSocket listener.
//!
//! ```json
//! {"type":"discover"}
//! {"type":"announce","name":"DESK","ip":"192.168.1.20","port":8765}
//! ```

use serde::{Deserialize, Serialize};

/// Default UDP port of the discovery responder.
pub const DEFAULT_DISCOVERY_PORT: u16 = 8766;

/// One discovery datagram.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DiscoveryMessage {
    /// Request sent by a remote looking for hosts.
    Discover,

    /// A host's answer.
    Announce { name: String, ip: String, port: u16 },
}

impl DiscoveryMessage {
    /// Parses one datagram.  Anything that is not a discovery message is `None`.
    pub fn from_datagram(bytes: &[u8]) -> Option<Self> {
        serde_json::from_slice(bytes).ok()
    }

    /// Encodes this message as a datagram payload.
    pub fn to_datagram(&self) -> Vec<u8> {
        // A fieldless or all-string enum always serializes.
        serde_json::to_vec(self).unwrap_or_default()
    }
}
