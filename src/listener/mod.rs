//! Connection acceptance
//!
//! A [`MessageEndpointListener`] turns inbound application connections into
//! passive replication sessions and reports their status changes.

mod notifier;

pub use notifier::{ChangeNotifier, ListenerToken};

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use crate::{
    SessionId,
    bridge::MessageBridge,
    config::MessageEndpointListenerConfiguration,
    connection::{connection_key, ConnectionRef},
    context::Context,
    engine::{EngineError, ReplicationHost, ReplicationSession, SessionOptions, SessionStatus, StatusCallback},
    event::MessageEndpointListenerChange,
    executor::Executor,
    stream::ChangeStream,
};

struct Registration {
    session: Arc<dyn ReplicationSession>,
    connection: ConnectionRef,
}

struct StartFailure {
    error: EngineError,
    /// The session already reported `Stopped` while starting
    reported: bool,
}

/// Accepts inbound connections on behalf of a database
pub struct MessageEndpointListener {
    me: Weak<MessageEndpointListener>,
    config: MessageEndpointListenerConfiguration,
    context: Context,
    dispatcher: Arc<dyn Executor>,
    notifier: ChangeNotifier<MessageEndpointListenerChange>,
    changes_tx: broadcast::Sender<MessageEndpointListenerChange>,
    registry: Mutex<HashMap<SessionId, Registration>>,
    stopped: AtomicBool,
}

impl MessageEndpointListener {
    pub fn new(config: MessageEndpointListenerConfiguration, context: Context) -> Arc<Self> {
        let (changes_tx, _) = broadcast::channel(config.settings().change_stream_capacity.max(1));
        let dispatcher = context.dispatcher();
        tracing::debug!("[LISTENER] created for {} connections", config.protocol_type());

        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            config,
            context,
            dispatcher,
            notifier: ChangeNotifier::new(),
            changes_tx,
            registry: Mutex::new(HashMap::new()),
            stopped: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &MessageEndpointListenerConfiguration {
        &self.config
    }

    /// Starts a passive session over `connection`.
    ///
    /// Publishes `Connecting` if the session started, or `Stopped` carrying
    /// the engine's error if it did not. The outcome goes through the status
    /// dispatcher, behind anything the session reported while starting.
    pub fn accept(&self, connection: ConnectionRef) {
        if self.stopped.load(Ordering::Acquire) {
            tracing::warn!("[LISTENER] accept after stop ignored");
            return;
        }

        let bridge = MessageBridge::new(connection.clone(), self.config.protocol_type());
        let session_id = bridge.id();
        let options = self.config.settings().session_options();
        let host = self.config.host().clone();

        let result = {
            let _db = host.state_lock().lock();
            self.create_and_start(host.as_ref(), bridge, &connection, &options)
        };

        let listener = self.me.clone();
        self.dispatcher.execute(Box::new(move || {
            match listener.upgrade() {
                Some(listener) => listener.announce(session_id, connection, result),
                None => tracing::debug!("[LISTENER] accept of {} after listener dropped", session_id),
            }
        }));
    }

    /// Runs on the dispatcher
    fn announce(&self, session_id: SessionId, connection: ConnectionRef, result: Result<(), StartFailure>) {
        let status = match result {
            Ok(()) => {
                if !self.registry.lock().contains_key(&session_id) {
                    tracing::debug!("[LISTENER] {} stopped before it was announced", session_id);
                    return;
                }
                tracing::info!("[LISTENER] accepted {}", session_id);
                SessionStatus::connecting()
            }
            Err(StartFailure { error, reported: true }) => {
                tracing::warn!("[LISTENER] session {} failed to start after stopping: {}", session_id, error);
                return;
            }
            Err(StartFailure { error, reported: false }) => {
                tracing::warn!("[LISTENER] session {} failed to start: {}", session_id, error);
                SessionStatus::stopped(Some(error))
            }
        };
        self.publish(MessageEndpointListenerChange::new(session_id, connection, status));
    }

    /// Runs with the host's state lock held
    fn create_and_start(
        &self,
        host: &dyn ReplicationHost,
        bridge: MessageBridge,
        connection: &ConnectionRef,
        options: &SessionOptions,
    ) -> Result<(), StartFailure> {
        let session_id = bridge.id();
        let session = host
            .create_passive_session(Arc::new(bridge), options, self.status_callback(session_id))
            .map_err(|error| StartFailure { error, reported: false })?;

        // registered before start so status reported during start finds it
        let first = {
            let mut registry = self.registry.lock();
            let first = registry.is_empty();
            registry.insert(session_id, Registration {
                session: session.clone(),
                connection: connection.clone(),
            });
            first
        };
        if first {
            host.register_listener(self.me.clone());
        }

        if let Err(error) = session.start() {
            let (removed, now_empty) = {
                let mut registry = self.registry.lock();
                let removed = registry.remove(&session_id).is_some();
                (removed, removed && registry.is_empty())
            };
            if now_empty {
                host.unregister_listener(&self.me);
            }
            // a missing entry means a terminal status was already published
            return Err(StartFailure { error, reported: !removed });
        }
        Ok(())
    }

    fn status_callback(&self, session_id: SessionId) -> StatusCallback {
        let listener = self.me.clone();
        let dispatcher = self.dispatcher.clone();
        Arc::new(move |status: SessionStatus| {
            let listener = listener.clone();
            dispatcher.execute(Box::new(move || {
                match listener.upgrade() {
                    Some(listener) => listener.status_changed(session_id, status),
                    None => tracing::debug!("[LISTENER] status for {} after listener dropped", session_id),
                }
            }));
        })
    }

    /// Always runs on the dispatcher, one status at a time
    fn status_changed(&self, session_id: SessionId, status: SessionStatus) {
        let (connection, now_empty) = {
            let mut registry = self.registry.lock();
            if status.is_terminal() {
                let removed = registry.remove(&session_id).map(|r| r.connection);
                let now_empty = removed.is_some() && registry.is_empty();
                (removed, now_empty)
            } else {
                (registry.get(&session_id).map(|r| r.connection.clone()), false)
            }
        };

        match connection {
            Some(connection) => {
                tracing::debug!("[LISTENER] {} is {:?}", session_id, status.activity);
                self.publish(MessageEndpointListenerChange::new(session_id, connection, status));
            }
            None => tracing::debug!("[LISTENER] status for unknown session {} ignored", session_id),
        }

        if now_empty {
            self.config.host().unregister_listener(&self.me);
        }
    }

    /// Stops the session bound to `connection`, if there is one
    pub fn close(&self, connection: &ConnectionRef) {
        let key = connection_key(connection);
        let session = self
            .registry
            .lock()
            .iter()
            .find(|(_, r)| connection_key(&r.connection) == key)
            .map(|(id, r)| (*id, r.session.clone()));

        match session {
            Some((session_id, session)) => {
                tracing::info!("[LISTENER] stopping {}", session_id);
                session.stop();
            }
            None => tracing::debug!("[LISTENER] close of unknown connection ignored"),
        }
    }

    /// Stops every registered session
    pub fn close_all(&self) {
        let sessions: Vec<Arc<dyn ReplicationSession>> = self
            .registry
            .lock()
            .values()
            .map(|r| r.session.clone())
            .collect();

        tracing::info!("[LISTENER] stopping {} sessions", sessions.len());
        for session in sessions {
            session.stop();
        }
    }

    /// Refuses further connections and stops the current ones
    pub fn stop(&self) {
        if !self.stopped.swap(true, Ordering::AcqRel) {
            tracing::info!("[LISTENER] stopped");
        }
        self.close_all();
    }

    /// True once no session remains
    pub fn is_stopped(&self) -> bool {
        self.registry.lock().is_empty()
    }

    pub fn is_accepting(&self) -> bool {
        !self.stopped.load(Ordering::Acquire)
    }

    pub fn connection_count(&self) -> usize {
        self.registry.lock().len()
    }

    /// Connections with a live session
    pub fn connections(&self) -> Vec<ConnectionRef> {
        self.registry
            .lock()
            .values()
            .map(|r| r.connection.clone())
            .collect()
    }

    /// Adds a listener running on its own serial executor
    pub fn add_change_listener<F>(&self, listener: F) -> ListenerToken
    where
        F: Fn(MessageEndpointListenerChange) + Send + Sync + 'static,
    {
        let executor = self.context.serial_executor("listener-change");
        self.notifier.add(executor, listener)
    }

    /// Adds a listener running on `executor`
    pub fn add_change_listener_on<F>(&self, executor: Arc<dyn Executor>, listener: F) -> ListenerToken
    where
        F: Fn(MessageEndpointListenerChange) + Send + Sync + 'static,
    {
        self.notifier.add(executor, listener)
    }

    pub fn remove_change_listener(&self, token: &ListenerToken) {
        if !self.notifier.remove(token) {
            tracing::debug!("[LISTENER] unknown listener token {:?}", token);
        }
    }

    /// Subscribes to changes published from now on
    pub fn changes(&self) -> ChangeStream {
        ChangeStream::new(self.changes_tx.subscribe())
    }

    fn publish(&self, change: MessageEndpointListenerChange) {
        // no stream subscribers is not an error
        let _ = self.changes_tx.send(change.clone());
        self.notifier.post(change);
    }
}

impl fmt::Debug for MessageEndpointListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageEndpointListener")
            .field("protocol_type", &self.config.protocol_type())
            .field("connections", &self.connection_count())
            .field("accepting", &self.is_accepting())
            .finish()
    }
}
