use std::pin::Pin;
use std::task::{Context, Poll};
use futures::{Stream, StreamExt};
use tokio::sync::broadcast;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use crate::{
    SessionId,
    connection::{connection_key, ConnectionRef},
    engine::ActivityLevel,
    event::MessageEndpointListenerChange,
};

/// Listener changes as an async stream.
///
/// Backed by a broadcast channel: a subscriber that falls too far behind
/// skips the changes it missed rather than blocking the listener.
pub struct ChangeStream {
    inner: BroadcastStream<MessageEndpointListenerChange>,
    connection_filter: Option<usize>,
    session_filter: Option<SessionId>,
    missed: u64,
}

impl ChangeStream {
    pub fn new(receiver: broadcast::Receiver<MessageEndpointListenerChange>) -> Self {
        Self {
            inner: BroadcastStream::new(receiver),
            connection_filter: None,
            session_filter: None,
            missed: 0,
        }
    }

    /// Only changes for `connection`
    pub fn for_connection(mut self, connection: &ConnectionRef) -> Self {
        self.connection_filter = Some(connection_key(connection));
        self
    }

    /// Only changes for `session_id`
    pub fn for_session(mut self, session_id: SessionId) -> Self {
        self.session_filter = Some(session_id);
        self
    }

    /// Changes dropped because this stream lagged behind
    pub fn missed(&self) -> u64 {
        self.missed
    }

    /// Next change reporting the given activity level
    pub async fn next_with_activity(&mut self, activity: ActivityLevel) -> Option<MessageEndpointListenerChange> {
        while let Some(change) = self.next().await {
            if change.activity() == activity {
                return Some(change);
            }
        }
        None
    }

    /// Next change after which its session is gone
    pub async fn next_terminal(&mut self) -> Option<MessageEndpointListenerChange> {
        self.next_with_activity(ActivityLevel::Stopped).await
    }

    fn should_emit(&self, change: &MessageEndpointListenerChange) -> bool {
        let connection_ok = self
            .connection_filter
            .map_or(true, |key| connection_key(change.connection()) == key);
        let session_ok = self
            .session_filter
            .map_or(true, |id| change.session_id() == id);
        connection_ok && session_ok
    }
}

impl Stream for ChangeStream {
    type Item = MessageEndpointListenerChange;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(change))) => {
                    if self.should_emit(&change) {
                        return Poll::Ready(Some(change));
                    }
                }
                Poll::Ready(Some(Err(BroadcastStreamRecvError::Lagged(skipped)))) => {
                    tracing::debug!("[STREAM] change stream lagged, {} changes skipped", skipped);
                    self.missed += skipped;
                }
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

impl std::fmt::Debug for ChangeStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeStream")
            .field("session_filter", &self.session_filter)
            .field("filtered_by_connection", &self.connection_filter.is_some())
            .field("missed", &self.missed)
            .finish()
    }
}
