/// Execution contexts used to marshal callbacks.
///
/// Nothing in the crate owns a thread pool. Callbacks either run inline on
/// the caller's thread or are queued onto a serial executor backed by a
/// single tokio task.

use std::panic::{self, AssertUnwindSafe};
use tokio::runtime::Handle;
use tokio::sync::mpsc;

pub type Task = Box<dyn FnOnce() + Send + 'static>;

pub trait Executor: Send + Sync {
    fn execute(&self, task: Task);
}

/// Runs every task immediately on the calling thread
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineExecutor;

impl Executor for InlineExecutor {
    fn execute(&self, task: Task) {
        run_guarded("inline", task);
    }
}

/// Runs tasks one at a time, in submission order.
///
/// The queue is drained by a task spawned on the given runtime. It stops
/// when the executor is dropped.
pub struct SerialExecutor {
    name: &'static str,
    queue: mpsc::UnboundedSender<Task>,
}

impl SerialExecutor {
    pub fn spawn_on(handle: &Handle, name: &'static str) -> Self {
        let (queue, mut rx) = mpsc::unbounded_channel::<Task>();
        handle.spawn(async move {
            while let Some(task) = rx.recv().await {
                run_guarded(name, task);
            }
            tracing::debug!("[EXECUTOR] {} drained and stopped", name);
        });
        Self { name, queue }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl Executor for SerialExecutor {
    fn execute(&self, task: Task) {
        if self.queue.send(task).is_err() {
            tracing::warn!("[EXECUTOR] {} rejected a task after shutdown", self.name);
        }
    }
}

impl std::fmt::Debug for SerialExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialExecutor").field("name", &self.name).finish()
    }
}

fn run_guarded(name: &str, task: Task) {
    if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(task)) {
        let reason = panic
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        tracing::error!("[EXECUTOR] task on {} panicked: {}", name, reason);
    }
}
