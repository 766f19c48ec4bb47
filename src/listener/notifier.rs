use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use parking_lot::Mutex;
use crate::executor::Executor;

static NEXT_NOTIFIER_ID: AtomicU64 = AtomicU64::new(1);

/// Handle returned when a change listener is added; used to remove it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerToken {
    notifier: u64,
    id: u64,
}

type Callback<T> = Arc<dyn Fn(T) + Send + Sync>;

struct Subscriber<T> {
    id: u64,
    executor: Arc<dyn Executor>,
    callback: Callback<T>,
}

/// Fan-out of change events to independently dispatched listeners.
///
/// Each subscriber has its own executor, so a slow listener only delays
/// itself. Posting never runs a callback under the subscriber lock.
pub struct ChangeNotifier<T> {
    id: u64,
    next_id: AtomicU64,
    subscribers: Mutex<Vec<Subscriber<T>>>,
}

impl<T> ChangeNotifier<T>
where
    T: Clone + Send + 'static,
{
    pub fn new() -> Self {
        Self {
            id: NEXT_NOTIFIER_ID.fetch_add(1, Ordering::Relaxed),
            next_id: AtomicU64::new(1),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    pub fn add<F>(&self, executor: Arc<dyn Executor>, callback: F) -> ListenerToken
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.lock().push(Subscriber {
            id,
            executor,
            callback: Arc::new(callback),
        });
        ListenerToken { notifier: self.id, id }
    }

    /// Returns false if the token was unknown or belongs to another notifier
    pub fn remove(&self, token: &ListenerToken) -> bool {
        if token.notifier != self.id {
            return false;
        }
        let mut subscribers = self.subscribers.lock();
        let before = subscribers.len();
        subscribers.retain(|s| s.id != token.id);
        subscribers.len() != before
    }

    /// Hands `change` to every current subscriber's executor; returns how many
    pub fn post(&self, change: T) -> usize {
        let targets: Vec<(Arc<dyn Executor>, Callback<T>)> = self
            .subscribers
            .lock()
            .iter()
            .map(|s| (s.executor.clone(), s.callback.clone()))
            .collect();

        for (executor, callback) in &targets {
            let callback = callback.clone();
            let change = change.clone();
            executor.execute(Box::new(move || callback(change)));
        }
        targets.len()
    }

    pub fn len(&self) -> usize {
        self.subscribers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for ChangeNotifier<T>
where
    T: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for ChangeNotifier<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeNotifier")
            .field("id", &self.id)
            .field("subscribers", &self.subscribers.lock().len())
            .finish()
    }
}
