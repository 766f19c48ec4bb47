//! Boundary with the replication engine.
//!
//! The engine itself is external. It reaches a bridge only through the
//! [`SocketDriver`] vtable handed over at session creation, and the bridge
//! reaches the engine only through [`EngineSocket`].

use std::fmt;
use std::sync::{Arc, Weak};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use crate::{
    error::{BridgeError, CloseCode},
    framing::Framing,
    listener::MessageEndpointListener,
};

/// Acknowledgement and read entry points the engine exposes to a bridge
pub trait EngineSocket: Send + Sync {
    /// Synthetic handshake response for framed sockets
    fn got_http_response(&self, status: u16);

    /// The socket is open and writable
    fn opened(&self);

    /// `byte_count` bytes of earlier writes reached the transport
    fn completed_write(&self, byte_count: usize);

    /// Incoming data for the engine's read path
    fn received(&self, data: Bytes);

    /// The remote side asked to close; used when there is no framing to
    /// carry a close handshake
    fn close_requested(&self, code: CloseCode, message: &str);

    /// The socket is closed. Delivered exactly once per bridge.
    fn closed(&self, domain: i32, code: i32, message: &str);
}

/// Operations the engine performs on a bridge
pub trait SocketDriver: Send + Sync {
    /// Binds the engine's acknowledgement surface to this socket
    fn attach(&self, socket: Arc<dyn EngineSocket>);

    fn framing(&self) -> Framing;

    fn request_open(&self);

    fn write(&self, data: Bytes);

    /// The engine consumed `byte_count` received bytes
    fn completed_receive(&self, byte_count: usize);

    fn request_close(&self, code: CloseCode, message: &str);

    /// The engine has already torn down its side
    fn close(&self);
}

/// Replicator activity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityLevel {
    Stopped,
    Offline,
    Connecting,
    Idle,
    Busy,
}

impl ActivityLevel {
    /// A stopped session never reports again
    pub fn is_terminal(&self) -> bool {
        matches!(self, ActivityLevel::Stopped)
    }
}

/// Error reported by the engine with a status change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineError {
    pub domain: i32,
    pub code: i32,
    pub message: String,
}

impl EngineError {
    pub fn new(domain: i32, code: i32, message: impl Into<String>) -> Self {
        Self {
            domain,
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (domain {}, code {})", self.message, self.domain, self.code)
    }
}

impl std::error::Error for EngineError {}

impl From<EngineError> for BridgeError {
    fn from(error: EngineError) -> Self {
        BridgeError::engine_error(error.domain, error.code, error.message)
    }
}

/// Session status as published to listeners
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStatus {
    pub activity: ActivityLevel,
    pub error: Option<EngineError>,
}

impl SessionStatus {
    pub fn new(activity: ActivityLevel) -> Self {
        Self { activity, error: None }
    }

    pub fn connecting() -> Self {
        Self::new(ActivityLevel::Connecting)
    }

    pub fn stopped(error: Option<EngineError>) -> Self {
        Self {
            activity: ActivityLevel::Stopped,
            error,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.activity.is_terminal()
    }
}

/// Callback the engine invokes on every status change of a session
pub type StatusCallback = Arc<dyn Fn(SessionStatus) + Send + Sync>;

/// Handle to a running replication session
pub trait ReplicationSession: Send + Sync {
    fn start(&self) -> Result<(), EngineError>;

    /// Asks the session to stop; completion is reported as a `Stopped` status
    fn stop(&self);
}

/// Options passed to the engine when creating a passive session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionOptions {
    #[serde(rename = "noIncomingConflicts")]
    pub no_incoming_conflicts: bool,
}

impl SessionOptions {
    pub fn passive(no_incoming_conflicts: bool) -> Self {
        Self { no_incoming_conflicts }
    }

    /// Encodes the options as the engine's option dictionary
    pub fn encode(&self) -> Result<Vec<u8>, BridgeError> {
        serde_json::to_vec(self).map_err(|e| BridgeError::config_error("session_options", e.to_string()))
    }
}

/// The database that owns passive sessions
pub trait ReplicationHost: Send + Sync {
    /// Coarse lock guarding database state while a session is created and started
    fn state_lock(&self) -> &parking_lot::Mutex<()>;

    fn create_passive_session(
        &self,
        socket: Arc<dyn SocketDriver>,
        options: &SessionOptions,
        on_status: StatusCallback,
    ) -> Result<Arc<dyn ReplicationSession>, EngineError>;

    /// A listener now serves at least one session. May be called while
    /// `state_lock` is held.
    fn register_listener(&self, _listener: Weak<MessageEndpointListener>) {}

    /// A listener no longer serves any session
    fn unregister_listener(&self, _listener: &Weak<MessageEndpointListener>) {}
}
