use std::fmt;
use std::sync::Arc;
use async_trait::async_trait;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use crate::{
    bridge::ReplicatorConnection,
    completion::{MessagingCloseCompletion, MessagingCompletion},
    connection::MessageEndpointConnection,
    error::MessagingError,
    message::Message,
};

/// Application connection written with async fns
#[async_trait]
pub trait AsyncMessageConnection: Send + Sync + 'static {
    async fn open(&self, connection: ReplicatorConnection) -> Result<(), MessagingError>;

    async fn send(&self, message: Message) -> Result<(), MessagingError>;

    /// Always succeeds from the bridge's point of view
    async fn close(&self, error: Option<MessagingError>);
}

/// Commands forwarded to the connection actor
enum ConnectionCommand {
    Open {
        connection: ReplicatorConnection,
        completion: MessagingCompletion,
    },
    Send {
        message: Message,
        completion: MessagingCompletion,
    },
    Close {
        error: Option<MessagingError>,
        completion: MessagingCloseCompletion,
    },
}

impl ConnectionCommand {
    /// Completes the command without running it
    fn reject(self) {
        match self {
            ConnectionCommand::Open { completion, .. } | ConnectionCommand::Send { completion, .. } => {
                completion.fail(MessagingError::transport("connection actor stopped", false));
            }
            ConnectionCommand::Close { completion, .. } => completion.complete(),
        }
    }
}

impl fmt::Debug for ConnectionCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionCommand::Open { .. } => f.write_str("Open"),
            ConnectionCommand::Send { message, .. } => write!(f, "Send({} bytes)", message.len()),
            ConnectionCommand::Close { error, .. } => write!(f, "Close(error: {})", error.is_some()),
        }
    }
}

/// Runs one async connection; commands are handled strictly one at a time
struct ConnectionActor<C> {
    connection: C,
    command_rx: mpsc::UnboundedReceiver<ConnectionCommand>,
}

impl<C: AsyncMessageConnection> ConnectionActor<C> {
    async fn run(mut self) {
        tracing::debug!("[ADAPTER] connection actor started");

        while let Some(command) = self.command_rx.recv().await {
            match command {
                ConnectionCommand::Open { connection, completion } => {
                    completion.finish(self.connection.open(connection).await);
                }
                ConnectionCommand::Send { message, completion } => {
                    completion.finish(self.connection.send(message).await);
                }
                ConnectionCommand::Close { error, completion } => {
                    self.connection.close(error).await;
                    completion.complete();
                    break;
                }
            }
        }

        // anything still queued gets an answer
        self.command_rx.close();
        let mut rejected = 0usize;
        while let Ok(command) = self.command_rx.try_recv() {
            command.reject();
            rejected += 1;
        }
        tracing::debug!("[ADAPTER] connection actor stopped, {} queued commands rejected", rejected);
    }
}

/// Wraps an [`AsyncMessageConnection`] as a [`MessageEndpointConnection`].
///
/// Every call is forwarded to a single actor task, which keeps sends in
/// order. Calls made after the connection closed complete with a
/// non-recoverable error.
pub struct AsyncConnectionAdapter {
    command_tx: mpsc::UnboundedSender<ConnectionCommand>,
}

impl AsyncConnectionAdapter {
    pub fn spawn<C: AsyncMessageConnection>(connection: C, handle: &Handle) -> Arc<Self> {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let actor = ConnectionActor {
            connection,
            command_rx,
        };
        handle.spawn(actor.run());
        Arc::new(Self { command_tx })
    }

    pub fn is_running(&self) -> bool {
        !self.command_tx.is_closed()
    }

    fn submit(&self, command: ConnectionCommand) {
        if let Err(mpsc::error::SendError(command)) = self.command_tx.send(command) {
            tracing::debug!("[ADAPTER] {:?} after actor stopped", command);
            command.reject();
        }
    }
}

impl MessageEndpointConnection for AsyncConnectionAdapter {
    fn open(&self, connection: ReplicatorConnection, completion: MessagingCompletion) {
        self.submit(ConnectionCommand::Open { connection, completion });
    }

    fn send(&self, message: Message, completion: MessagingCompletion) {
        self.submit(ConnectionCommand::Send { message, completion });
    }

    fn close(&self, error: Option<MessagingError>, completion: MessagingCloseCompletion) {
        self.submit(ConnectionCommand::Close { error, completion });
    }
}

impl fmt::Debug for AsyncConnectionAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncConnectionAdapter")
            .field("running", &self.is_running())
            .finish()
    }
}
