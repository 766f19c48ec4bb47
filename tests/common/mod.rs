#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use bytes::Bytes;
use parking_lot::Mutex;
use msgendpoint::{
    CloseCode, ConnectionRef, EngineError, EngineSocket, Message, MessageBridge,
    MessageEndpointConnection, MessageEndpointListener, MessagingCloseCompletion,
    MessagingCompletion, MessagingError, ProtocolType, ReplicationHost, ReplicationSession,
    ReplicatorConnection, SessionOptions, SessionStatus, SocketDriver, StatusCallback,
};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// Engine-side notification as observed by [`RecordingSocket`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    HttpResponse(u16),
    Opened,
    CompletedWrite(usize),
    Received(Vec<u8>),
    CloseRequested(u16, String),
    Closed { domain: i32, code: i32, message: String },
}

/// Records every engine notification in arrival order
#[derive(Default)]
pub struct RecordingSocket {
    events: Mutex<Vec<SocketEvent>>,
}

impl RecordingSocket {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<SocketEvent> {
        self.events.lock().clone()
    }

    pub fn closed_events(&self) -> Vec<SocketEvent> {
        self.events()
            .into_iter()
            .filter(|e| matches!(e, SocketEvent::Closed { .. }))
            .collect()
    }

    pub fn acked(&self) -> Vec<usize> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                SocketEvent::CompletedWrite(n) => Some(n),
                _ => None,
            })
            .collect()
    }

    pub fn received(&self) -> Vec<Vec<u8>> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                SocketEvent::Received(data) => Some(data),
                _ => None,
            })
            .collect()
    }

    fn record(&self, event: SocketEvent) {
        self.events.lock().push(event);
    }
}

impl EngineSocket for RecordingSocket {
    fn got_http_response(&self, status: u16) {
        self.record(SocketEvent::HttpResponse(status));
    }

    fn opened(&self) {
        self.record(SocketEvent::Opened);
    }

    fn completed_write(&self, byte_count: usize) {
        self.record(SocketEvent::CompletedWrite(byte_count));
    }

    fn received(&self, data: Bytes) {
        self.record(SocketEvent::Received(data.to_vec()));
    }

    fn close_requested(&self, code: CloseCode, message: &str) {
        self.record(SocketEvent::CloseRequested(code.as_u16(), message.to_string()));
    }

    fn closed(&self, domain: i32, code: i32, message: &str) {
        self.record(SocketEvent::Closed {
            domain,
            code,
            message: message.to_string(),
        });
    }
}

/// How a [`ScriptedConnection`] answers a call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    /// Complete successfully before returning
    Immediate,
    /// Keep the completion for the test to release
    Hold,
}

/// Application connection whose completions are scripted by the test
pub struct ScriptedConnection {
    open_reply: Reply,
    send_reply: Reply,
    close_reply: Reply,
    replicator: Mutex<Option<ReplicatorConnection>>,
    held_opens: Mutex<Vec<MessagingCompletion>>,
    held_sends: Mutex<Vec<(Message, MessagingCompletion)>>,
    held_closes: Mutex<Vec<MessagingCloseCompletion>>,
    sent: Mutex<Vec<Vec<u8>>>,
    close_errors: Mutex<Vec<Option<MessagingError>>>,
    open_calls: AtomicUsize,
}

impl ScriptedConnection {
    pub fn new(open_reply: Reply, send_reply: Reply, close_reply: Reply) -> Arc<Self> {
        Arc::new(Self {
            open_reply,
            send_reply,
            close_reply,
            replicator: Mutex::new(None),
            held_opens: Mutex::new(Vec::new()),
            held_sends: Mutex::new(Vec::new()),
            held_closes: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
            close_errors: Mutex::new(Vec::new()),
            open_calls: AtomicUsize::new(0),
        })
    }

    pub fn immediate() -> Arc<Self> {
        Self::new(Reply::Immediate, Reply::Immediate, Reply::Immediate)
    }

    pub fn replicator(&self) -> ReplicatorConnection {
        self.replicator
            .lock()
            .clone()
            .expect("connection was never opened")
    }

    pub fn open_calls(&self) -> usize {
        self.open_calls.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.lock().clone()
    }

    /// Error passed to every `close` call so far
    pub fn close_calls(&self) -> Vec<Option<MessagingError>> {
        self.close_errors.lock().clone()
    }

    pub fn release_open(&self, result: Result<(), MessagingError>) {
        let completion = self.held_opens.lock().pop().expect("no held open");
        completion.finish(result);
    }

    /// Reports `(false, None)` for the held open
    pub fn fail_open_without_error(&self) {
        let completion = self.held_opens.lock().pop().expect("no held open");
        completion.complete(false, None);
    }

    pub fn held_sends(&self) -> usize {
        self.held_sends.lock().len()
    }

    /// Releases the `index`th held send (in issue order among those still held)
    pub fn release_send(&self, index: usize, result: Result<(), MessagingError>) {
        let (_, completion) = self.held_sends.lock().remove(index);
        completion.finish(result);
    }

    pub fn release_close(&self) {
        let completion = self.held_closes.lock().pop().expect("no held close");
        completion.complete();
    }

    pub fn handle(self: &Arc<Self>) -> ConnectionRef {
        self.clone()
    }
}

impl MessageEndpointConnection for ScriptedConnection {
    fn open(&self, connection: ReplicatorConnection, completion: MessagingCompletion) {
        self.open_calls.fetch_add(1, Ordering::SeqCst);
        *self.replicator.lock() = Some(connection);
        match self.open_reply {
            Reply::Immediate => completion.succeed(),
            Reply::Hold => self.held_opens.lock().push(completion),
        }
    }

    fn send(&self, message: Message, completion: MessagingCompletion) {
        self.sent.lock().push(message.data().to_vec());
        match self.send_reply {
            Reply::Immediate => completion.succeed(),
            Reply::Hold => self.held_sends.lock().push((message, completion)),
        }
    }

    fn close(&self, error: Option<MessagingError>, completion: MessagingCloseCompletion) {
        self.close_errors.lock().push(error);
        match self.close_reply {
            Reply::Immediate => completion.complete(),
            Reply::Hold => self.held_closes.lock().push(completion),
        }
    }
}

/// A bridge with a recording engine attached
pub fn attached_bridge(connection: &Arc<ScriptedConnection>, protocol: ProtocolType) -> (MessageBridge, Arc<RecordingSocket>) {
    let bridge = MessageBridge::new(connection.handle(), protocol);
    let socket = RecordingSocket::new();
    bridge.attach(socket.clone());
    (bridge, socket)
}

/// Session whose status reports are driven by the test
pub struct MockSession {
    pub socket: Arc<dyn SocketDriver>,
    on_status: StatusCallback,
    start_error: Option<EngineError>,
    stops_while_starting: bool,
    stops: AtomicUsize,
}

impl MockSession {
    pub fn report(&self, status: SessionStatus) {
        (self.on_status)(status);
    }

    pub fn stop_calls(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

impl ReplicationSession for MockSession {
    fn start(&self) -> Result<(), EngineError> {
        if self.stops_while_starting {
            (self.on_status)(SessionStatus::stopped(None));
        }
        match &self.start_error {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

/// Database stand-in that records the sessions it creates
#[derive(Default)]
pub struct MockHost {
    lock: Mutex<()>,
    start_errors: Mutex<Vec<EngineError>>,
    stop_next_while_starting: AtomicBool,
    sessions: Mutex<Vec<Arc<MockSession>>>,
    options: Mutex<Vec<Vec<u8>>>,
    pub registered: AtomicUsize,
    pub unregistered: AtomicUsize,
}

impl MockHost {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The next session created fails to start with `error`
    pub fn fail_next_start(&self, error: EngineError) {
        self.start_errors.lock().push(error);
    }

    /// The next session created reports `Stopped` from inside `start`
    pub fn stop_next_while_starting(&self) {
        self.stop_next_while_starting.store(true, Ordering::SeqCst);
    }

    pub fn session(&self, index: usize) -> Arc<MockSession> {
        self.sessions.lock()[index].clone()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Encoded options passed at each session creation
    pub fn options(&self) -> Vec<Vec<u8>> {
        self.options.lock().clone()
    }
}

impl ReplicationHost for MockHost {
    fn state_lock(&self) -> &Mutex<()> {
        &self.lock
    }

    fn create_passive_session(
        &self,
        socket: Arc<dyn SocketDriver>,
        options: &SessionOptions,
        on_status: StatusCallback,
    ) -> Result<Arc<dyn ReplicationSession>, EngineError> {
        assert!(self.lock.is_locked(), "session created without the state lock");
        let encoded = options
            .encode()
            .map_err(|e| EngineError::new(1, 1, e.to_string()))?;
        self.options.lock().push(encoded);

        let session = Arc::new(MockSession {
            socket,
            on_status,
            start_error: self.start_errors.lock().pop(),
            stops_while_starting: self.stop_next_while_starting.swap(false, Ordering::SeqCst),
            stops: AtomicUsize::new(0),
        });
        self.sessions.lock().push(session.clone());
        Ok(session as Arc<dyn ReplicationSession>)
    }

    fn register_listener(&self, _listener: Weak<MessageEndpointListener>) {
        self.registered.fetch_add(1, Ordering::SeqCst);
    }

    fn unregister_listener(&self, _listener: &Weak<MessageEndpointListener>) {
        self.unregistered.fetch_add(1, Ordering::SeqCst);
    }
}
