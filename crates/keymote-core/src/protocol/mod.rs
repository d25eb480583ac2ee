//! Protocol module containing the JSON message types and the decode step.

pub mod codec;
pub mod discovery;
pub mod messages;

pub use codec::{
    decode_client_message, decode_client_value, decode_server_message, encode_message,
    message_type, parse_value, ProtocolError,
};
pub use discovery::{DiscoveryMessage, DEFAULT_DISCOVERY_PORT};
pub use messages::*;
