use std::any::Any;
use std::fmt;
use std::sync::Arc;
use crate::{
    bridge::ReplicatorConnection,
    completion::{MessagingCloseCompletion, MessagingCompletion},
    error::MessagingError,
    framing::ProtocolType,
    message::Message,
};

/// Application-implemented connection to a remote peer.
///
/// Every call is asynchronous by contract: the implementation may invoke the
/// completion inline or later from any thread, but must invoke it exactly once.
pub trait MessageEndpointConnection: Send + Sync {
    /// Opens the link to the peer. Incoming data is handed to `connection`.
    fn open(&self, connection: ReplicatorConnection, completion: MessagingCompletion);

    /// Sends one message to the peer
    fn send(&self, message: Message, completion: MessagingCompletion);

    /// Closes the link. `error` is `None` for a clean close.
    fn close(&self, error: Option<MessagingError>, completion: MessagingCloseCompletion);
}

/// Shared handle to an application connection. Identity is the allocation.
pub type ConnectionRef = Arc<dyn MessageEndpointConnection>;

/// Whether two handles refer to the same connection object
pub fn same_connection(a: &ConnectionRef, b: &ConnectionRef) -> bool {
    connection_key(a) == connection_key(b)
}

/// Address of the connection object, ignoring the vtable
pub(crate) fn connection_key(connection: &ConnectionRef) -> usize {
    Arc::as_ptr(connection) as *const () as usize
}

/// Creates connections for outbound replication
pub trait MessageEndpointDelegate: Send + Sync {
    /// Called once per connection attempt
    fn create_connection(&self, endpoint: &MessageEndpoint) -> ConnectionRef;
}

/// Describes a peer reachable through an application transport
#[derive(Clone)]
pub struct MessageEndpoint {
    uid: String,
    target: Option<Arc<dyn Any + Send + Sync>>,
    protocol_type: ProtocolType,
    delegate: Arc<dyn MessageEndpointDelegate>,
}

impl MessageEndpoint {
    /// `uid` must be unique per peer; the engine derives checkpoint ids from it
    pub fn new(
        uid: impl Into<String>,
        target: Option<Arc<dyn Any + Send + Sync>>,
        protocol_type: ProtocolType,
        delegate: Arc<dyn MessageEndpointDelegate>,
    ) -> Self {
        Self {
            uid: uid.into(),
            target,
            protocol_type,
            delegate,
        }
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    /// The application object representing the peer, if any
    pub fn target(&self) -> Option<&Arc<dyn Any + Send + Sync>> {
        self.target.as_ref()
    }

    /// Downcasts the target to a concrete type
    pub fn target_as<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.target.clone().and_then(|target| target.downcast::<T>().ok())
    }

    pub fn protocol_type(&self) -> ProtocolType {
        self.protocol_type
    }

    pub fn delegate(&self) -> &Arc<dyn MessageEndpointDelegate> {
        &self.delegate
    }
}

impl fmt::Debug for MessageEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageEndpoint")
            .field("uid", &self.uid)
            .field("protocol_type", &self.protocol_type)
            .field("has_target", &self.target.is_some())
            .finish()
    }
}
