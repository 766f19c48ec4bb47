use std::fmt;
use crate::{
    SessionId,
    connection::{same_connection, ConnectionRef},
    engine::{ActivityLevel, EngineError, SessionStatus},
};

/// Status change of one accepted connection
#[derive(Clone)]
pub struct MessageEndpointListenerChange {
    session_id: SessionId,
    connection: ConnectionRef,
    status: SessionStatus,
}

impl MessageEndpointListenerChange {
    pub fn new(session_id: SessionId, connection: ConnectionRef, status: SessionStatus) -> Self {
        Self {
            session_id,
            connection,
            status,
        }
    }

    /// Session the change belongs to
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn connection(&self) -> &ConnectionRef {
        &self.connection
    }

    pub fn status(&self) -> &SessionStatus {
        &self.status
    }

    pub fn activity(&self) -> ActivityLevel {
        self.status.activity
    }

    pub fn error(&self) -> Option<&EngineError> {
        self.status.error.as_ref()
    }

    /// The session is gone; no further changes follow for it
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_for(&self, connection: &ConnectionRef) -> bool {
        same_connection(&self.connection, connection)
    }
}

impl fmt::Debug for MessageEndpointListenerChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageEndpointListenerChange")
            .field("session_id", &self.session_id)
            .field("status", &self.status)
            .finish()
    }
}

impl fmt::Display for MessageEndpointListenerChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.status.error {
            Some(error) => write!(f, "{} {:?}: {}", self.session_id, self.status.activity, error),
            None => write!(f, "{} {:?}", self.session_id, self.status.activity),
        }
    }
}
