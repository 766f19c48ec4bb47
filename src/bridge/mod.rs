//! Transport bridge
//!
//! One [`MessageBridge`] per logical connection. The engine drives it through
//! [`SocketDriver`]; the application drives it through the
//! [`ReplicatorConnection`] it receives in `open`.
//!
//! All state transitions happen under one mutex. Calls out to the engine or
//! the application are never made while holding it: engine notifications are
//! queued in an outbox and delivered in order by whichever thread is draining.

mod state;

pub use state::BridgeState;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use bytes::Bytes;
use parking_lot::{Mutex, MutexGuard};
use tokio::sync::watch;
use url::Url;
use crate::{
    SessionId,
    completion::{MessagingCloseCompletion, MessagingCompletion, MessagingResult},
    connection::{ConnectionRef, MessageEndpoint},
    engine::{EngineSocket, SocketDriver},
    error::{domain, BridgeError, CloseCode, MessagingError},
    framing::{self, Framing, ProtocolType},
    message::Message,
};
use state::{BridgeCore, EngineCall};

static NEXT_BRIDGE_ID: AtomicU64 = AtomicU64::new(1);

/// Handshake status reported to the engine for framed sockets
const HANDSHAKE_OK: u16 = 200;

/// Traffic counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BridgeStats {
    /// Bytes handed to the application by engine writes
    pub bytes_written: u64,
    /// Bytes acknowledged back to the engine
    pub bytes_acknowledged: u64,
    pub bytes_received: u64,
    pub messages_received: u64,
}

#[derive(Debug, Default)]
struct StatsCounters {
    bytes_written: AtomicU64,
    bytes_acknowledged: AtomicU64,
    bytes_received: AtomicU64,
    messages_received: AtomicU64,
}

impl StatsCounters {
    fn snapshot(&self) -> BridgeStats {
        BridgeStats {
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            bytes_acknowledged: self.bytes_acknowledged.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
        }
    }
}

struct Inner {
    id: SessionId,
    protocol_type: ProtocolType,
    connection: ConnectionRef,
    core: Mutex<BridgeCore>,
    stats: StatsCounters,
    closed_tx: watch::Sender<bool>,
}

/// Adapter between the engine's socket contract and an application connection
#[derive(Clone)]
pub struct MessageBridge {
    inner: Arc<Inner>,
}

impl MessageBridge {
    /// Bridges an existing application connection
    pub fn new(connection: ConnectionRef, protocol_type: ProtocolType) -> Self {
        let id = SessionId::new(NEXT_BRIDGE_ID.fetch_add(1, Ordering::Relaxed));
        let (closed_tx, _) = watch::channel(false);
        tracing::debug!("[BRIDGE] {} created for {} connection", id, protocol_type);

        Self {
            inner: Arc::new(Inner {
                id,
                protocol_type,
                connection,
                core: Mutex::new(BridgeCore::new(framing::framing_for(protocol_type))),
                stats: StatsCounters::default(),
                closed_tx,
            }),
        }
    }

    /// Bridges a new outbound connection created by the endpoint's delegate
    pub fn for_endpoint(endpoint: &MessageEndpoint) -> Self {
        let connection = endpoint.delegate().create_connection(endpoint);
        tracing::debug!("[BRIDGE] delegate created connection for {}", endpoint.uid());
        Self::new(connection, endpoint.protocol_type())
    }

    pub fn id(&self) -> SessionId {
        self.inner.id
    }

    pub fn protocol_type(&self) -> ProtocolType {
        self.inner.protocol_type
    }

    pub fn state(&self) -> BridgeState {
        self.inner.core.lock().state
    }

    pub fn is_closed(&self) -> bool {
        self.state().is_closed()
    }

    pub fn connection(&self) -> &ConnectionRef {
        &self.inner.connection
    }

    pub fn address(&self) -> Result<Url, BridgeError> {
        framing::bridge_address(self.inner.id)
    }

    pub fn stats(&self) -> BridgeStats {
        self.inner.stats.snapshot()
    }

    /// Writes issued but not yet acknowledged
    pub fn pending_writes(&self) -> usize {
        self.inner.core.lock().ledger.outstanding()
    }

    /// Application-side handle to this bridge
    pub fn replicator_connection(&self) -> ReplicatorConnection {
        ReplicatorConnection::new(&self.inner)
    }

    /// Resolves once the bridge is `Closed`
    pub async fn closed(&self) {
        let mut rx = self.inner.closed_tx.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }
}

impl SocketDriver for MessageBridge {
    fn attach(&self, socket: Arc<dyn EngineSocket>) {
        let mut core = self.inner.core.lock();
        if core.socket.is_some() {
            tracing::warn!("[BRIDGE] {} engine socket replaced", self.inner.id);
        }
        core.socket = Some(socket);
        self.inner.drain(core);
    }

    fn framing(&self) -> Framing {
        self.inner.core.lock().framing
    }

    fn request_open(&self) {
        self.inner.request_open();
    }

    fn write(&self, data: Bytes) {
        self.inner.write(data);
    }

    fn completed_receive(&self, byte_count: usize) {
        tracing::trace!("[BRIDGE] {} engine consumed {} bytes", self.inner.id, byte_count);
    }

    fn request_close(&self, code: CloseCode, message: &str) {
        tracing::debug!("[BRIDGE] {} engine requested close ({}): {}", self.inner.id, code, message);
        self.inner.close_connection(MessagingError::from_close(code, message));
    }

    fn close(&self) {
        tracing::debug!("[BRIDGE] {} engine closed", self.inner.id);
        self.inner.close_connection(None);
    }
}

impl Inner {
    fn request_open(self: &Arc<Self>) {
        {
            let mut core = self.core.lock();
            if core.state != BridgeState::Unopened {
                tracing::warn!("[BRIDGE] {} open requested while {}", self.id, core.state);
                return;
            }
            core.state = BridgeState::Opening;
        }

        tracing::debug!("[BRIDGE] {} opening {} connection", self.id, self.protocol_type);
        let inner = self.clone();
        self.connection.open(
            ReplicatorConnection::new(self),
            MessagingCompletion::new("open", move |result| inner.on_opened(result)),
        );
    }

    fn on_opened(self: &Arc<Self>, result: MessagingResult) {
        let error = match result {
            Ok(()) => {
                let mut core = self.core.lock();
                if core.state != BridgeState::Opening {
                    tracing::debug!("[BRIDGE] {} open completed while {}, ignored", self.id, core.state);
                    return;
                }
                core.state = BridgeState::Open;
                if core.framing.sends_handshake_response() && !core.response_sent {
                    core.response_sent = true;
                    core.push(EngineCall::HttpResponse(HANDSHAKE_OK));
                }
                core.push(EngineCall::Opened);
                tracing::info!("[BRIDGE] {} open", self.id);
                self.drain(core);
                return;
            }
            Err(error) => error,
        };

        // the connection never opened, so there is nothing to close on its side
        tracing::info!("[BRIDGE] {} open failed: {}", self.id, error);
        self.finish(Some(error));
    }

    fn write(self: &Arc<Self>, data: Bytes) {
        let len = data.len();
        let seq = {
            let mut core = self.core.lock();
            if !core.accepts_writes() {
                tracing::warn!("[BRIDGE] {} dropped {} byte write while {}", self.id, len, core.state);
                return;
            }
            core.ledger.register(len)
        };

        self.stats.bytes_written.fetch_add(len as u64, Ordering::Relaxed);
        let inner = self.clone();
        self.connection.send(
            Message::from_data(data),
            MessagingCompletion::new("send", move |result| inner.on_sent(seq, result)),
        );
    }

    fn on_sent(self: &Arc<Self>, seq: u64, result: MessagingResult) {
        match result {
            Ok(()) => {
                let mut core = self.core.lock();
                if core.state.is_closed() {
                    return;
                }
                for byte_count in core.ledger.complete(seq) {
                    self.stats.bytes_acknowledged.fetch_add(byte_count as u64, Ordering::Relaxed);
                    core.push(EngineCall::CompletedWrite(byte_count));
                }
                self.drain(core);
            }
            Err(error) => {
                tracing::warn!("[BRIDGE] {} send failed: {}", self.id, error);
                self.close_from_application(Some(error));
            }
        }
    }

    fn receive(self: &Arc<Self>, message: Message) {
        let mut core = self.core.lock();
        if core.state.is_closed() {
            tracing::debug!("[BRIDGE] {} dropped {} byte message after close", self.id, message.len());
            return;
        }

        self.stats.bytes_received.fetch_add(message.len() as u64, Ordering::Relaxed);
        self.stats.messages_received.fetch_add(1, Ordering::Relaxed);
        core.push(EngineCall::Received(message.into_bytes()));
        self.drain(core);
    }

    /// Application asked to terminate.
    ///
    /// Message streams have no handshake, so a close request is synthesized
    /// for the engine, which answers with `request_close`. Byte streams close
    /// the transport directly and report the result to the engine.
    fn close_from_application(self: &Arc<Self>, error: Option<MessagingError>) {
        match self.protocol_type {
            ProtocolType::MessageStream => {
                let mut core = self.core.lock();
                if core.state.is_closed() || core.connection_closing || core.close_requested {
                    tracing::debug!("[BRIDGE] {} duplicate close from application", self.id);
                    return;
                }
                core.close_requested = true;
                core.state = BridgeState::ClosePending;

                let code = CloseCode::for_error(error.as_ref());
                let message = error.map(|e| e.message().to_string()).unwrap_or_default();
                tracing::debug!("[BRIDGE] {} requesting engine close ({})", self.id, code);
                core.push(EngineCall::CloseRequested { code, message });
                self.drain(core);
            }
            ProtocolType::ByteStream => self.close_connection(error),
        }
    }

    /// Closes the application connection exactly once
    fn close_connection(self: &Arc<Self>, error: Option<MessagingError>) {
        {
            let mut core = self.core.lock();
            if core.state.is_closed() || core.connection_closing {
                tracing::debug!("[BRIDGE] {} connection already closing", self.id);
                return;
            }
            core.connection_closing = true;
            core.state = BridgeState::ClosePending;
        }

        let inner = self.clone();
        let reported = error.clone();
        self.connection.close(
            error,
            MessagingCloseCompletion::new(move || inner.finish(reported)),
        );
    }

    /// Terminal transition. Only the first call has any effect.
    fn finish(self: &Arc<Self>, error: Option<MessagingError>) {
        let mut core = self.core.lock();
        if core.state.is_closed() {
            tracing::debug!("[BRIDGE] {} already closed", self.id);
            return;
        }
        core.state = BridgeState::Closed;

        let abandoned = core.ledger.clear();
        if abandoned > 0 {
            tracing::debug!("[BRIDGE] {} closed with {} unacknowledged writes", self.id, abandoned);
        }

        let call = match &error {
            None => EngineCall::Closed {
                domain: domain::NONE,
                code: 0,
                message: String::new(),
            },
            Some(error) => EngineCall::Closed {
                domain: domain::WEB_SOCKET,
                code: i32::from(error.close_code().as_u16()),
                message: error.message().to_string(),
            },
        };
        core.push(call);
        tracing::info!("[BRIDGE] {} closed{}", self.id, error.as_ref().map(|e| format!(": {}", e)).unwrap_or_default());

        self.drain(core);
        self.closed_tx.send_replace(true);
    }

    /// Delivers queued engine notifications in order.
    ///
    /// Only one thread drains at a time; others just queue and leave. The
    /// lock is released around each delivery so the engine may call back in.
    fn drain(&self, mut core: MutexGuard<'_, BridgeCore>) {
        if core.draining {
            return;
        }
        let Some(socket) = core.socket.clone() else {
            return;
        };

        core.draining = true;
        while let Some(call) = core.pop() {
            MutexGuard::unlocked(&mut core, || call.deliver(socket.as_ref()));
        }
        core.draining = false;

        // the engine socket usually holds this bridge; let go of it once it has heard `Closed`
        if core.is_finished() {
            core.socket = None;
            tracing::trace!("[BRIDGE] {} released engine socket", self.id);
        }
    }
}

impl fmt::Debug for MessageBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageBridge")
            .field("id", &self.inner.id)
            .field("protocol_type", &self.inner.protocol_type)
            .field("state", &self.state())
            .finish()
    }
}

impl fmt::Display for MessageBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MessageBridge{{{}: {}, {}}}", self.inner.id, self.inner.protocol_type, self.state())
    }
}

/// The application's handle to a bridge.
///
/// Holds the bridge weakly: once the engine lets go of it, calls are no-ops.
#[derive(Clone)]
pub struct ReplicatorConnection {
    id: SessionId,
    bridge: Weak<Inner>,
}

impl ReplicatorConnection {
    fn new(inner: &Arc<Inner>) -> Self {
        Self {
            id: inner.id,
            bridge: Arc::downgrade(inner),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Hands data from the peer to the engine. Ignored once closed.
    pub fn receive(&self, message: Message) {
        match self.bridge.upgrade() {
            Some(bridge) => bridge.receive(message),
            None => tracing::debug!("[BRIDGE] {} gone, message dropped", self.id),
        }
    }

    /// Terminates the connection from the application side
    pub fn close(&self, error: Option<MessagingError>) {
        match self.bridge.upgrade() {
            Some(bridge) => bridge.close_from_application(error),
            None => tracing::debug!("[BRIDGE] {} gone, close ignored", self.id),
        }
    }

    pub fn is_closed(&self) -> bool {
        match self.bridge.upgrade() {
            Some(bridge) => bridge.core.lock().state.is_closed(),
            None => true,
        }
    }
}

impl fmt::Debug for ReplicatorConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplicatorConnection")
            .field("id", &self.id)
            .field("alive", &(self.bridge.strong_count() > 0))
            .finish()
    }
}
