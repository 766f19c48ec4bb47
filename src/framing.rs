/// Framing policy
///
/// Maps the protocol type an application declares for its transport to the
/// framing the engine must apply on top of it.

use std::fmt;
use std::str::FromStr;
use serde::{Deserialize, Serialize};
use url::Url;
use crate::{SessionId, error::BridgeError};

/// URL scheme used to address bridged connections
pub const BRIDGE_SCHEME: &str = "x-msg-conn";

/// How the application transport carries engine data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolType {
    /// Each engine write is exactly one discrete message on the transport
    MessageStream,
    /// The transport is a raw byte pipe; WebSocket client framing rides on top
    ByteStream,
}

/// Framing applied to the byte channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Framing {
    /// No framing: one write, one message
    None,
    /// Client-side WebSocket framing (handshake response, ping/pong, close frames)
    WebSocketClient,
}

/// The framing policy. Total and pure.
pub fn framing_for(protocol: ProtocolType) -> Framing {
    match protocol {
        ProtocolType::MessageStream => Framing::None,
        ProtocolType::ByteStream => Framing::WebSocketClient,
    }
}

impl ProtocolType {
    pub fn framing(self) -> Framing {
        framing_for(self)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProtocolType::MessageStream => "message_stream",
            ProtocolType::ByteStream => "byte_stream",
        }
    }
}

impl Framing {
    /// Whether the bridge synthesizes the "200 OK" handshake response before
    /// reporting the socket open
    pub fn sends_handshake_response(self) -> bool {
        matches!(self, Framing::WebSocketClient)
    }

    /// Inverse of [`framing_for`]
    pub fn protocol_type(self) -> ProtocolType {
        match self {
            Framing::None => ProtocolType::MessageStream,
            Framing::WebSocketClient => ProtocolType::ByteStream,
        }
    }
}

impl fmt::Display for ProtocolType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProtocolType {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "message_stream" | "message" => Ok(ProtocolType::MessageStream),
            "byte_stream" | "byte" => Ok(ProtocolType::ByteStream),
            other => Err(BridgeError::config_error(
                "protocol_type",
                format!("Unrecognized protocol type: {}", other),
            )),
        }
    }
}

/// Address the engine sees for a bridged connection
pub fn bridge_address(id: SessionId) -> Result<Url, BridgeError> {
    let raw = format!("{}:///{:x}", BRIDGE_SCHEME, id.as_u64());
    Url::parse(&raw).map_err(|e| BridgeError::config_error("address", format!("{}: {}", raw, e)))
}
