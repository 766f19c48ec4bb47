/// msgendpoint - replication over application-supplied transports
///
/// Bridges a replication engine's socket contract onto connections the
/// application implements itself (Bluetooth, pipes, in-process channels),
/// and accepts inbound connections as passive replication sessions.

// transport bridge
pub mod bridge;
pub mod framing;
pub mod message;

// application and engine boundaries
pub mod connection;
pub mod engine;
pub mod completion;
pub mod adapters;

// inbound connections
pub mod listener;
pub mod event;
pub mod stream;

// ambient
pub mod error;
pub mod config;
pub mod context;
pub mod executor;

/// Type-safe wrapper for session and bridge ids
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

impl From<u64> for SessionId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl From<SessionId> for u64 {
    fn from(session_id: SessionId) -> Self {
        session_id.0
    }
}

pub use bridge::{BridgeState, BridgeStats, MessageBridge, ReplicatorConnection};
pub use completion::{MessagingCloseCompletion, MessagingCompletion, MessagingResult};
pub use config::{ConfigError, ListenerConfig, MessageEndpointListenerConfiguration};
pub use connection::{
    ConnectionRef, MessageEndpoint, MessageEndpointConnection, MessageEndpointDelegate, same_connection,
};
pub use context::Context;
pub use engine::{
    ActivityLevel, EngineError, EngineSocket, ReplicationHost, ReplicationSession, SessionOptions,
    SessionStatus, SocketDriver, StatusCallback,
};
pub use error::{BridgeError, CloseCode, MessagingError};
pub use event::MessageEndpointListenerChange;
pub use executor::{Executor, InlineExecutor, SerialExecutor};
pub use framing::{Framing, ProtocolType};
pub use listener::{ListenerToken, MessageEndpointListener};
pub use message::Message;
pub use stream::ChangeStream;
pub use adapters::{AsyncConnectionAdapter, AsyncMessageConnection};

/// Result alias over [`BridgeError`]
pub type Result<T> = std::result::Result<T, BridgeError>;
