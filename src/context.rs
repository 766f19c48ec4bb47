use std::sync::Arc;
use tokio::runtime::Handle;
use crate::{
    error::BridgeError,
    executor::{Executor, InlineExecutor, SerialExecutor},
};

/// Execution context handed to a listener at construction.
///
/// Replaces process-wide executor lookups: whoever builds the listener
/// decides where its callbacks run.
#[derive(Clone)]
pub struct Context {
    runtime: Option<Handle>,
    dispatcher: Arc<dyn Executor>,
}

impl Context {
    /// Context backed by the given tokio runtime
    pub fn new(runtime: Handle) -> Self {
        let dispatcher: Arc<dyn Executor> = Arc::new(SerialExecutor::spawn_on(&runtime, "status-dispatcher"));
        Self {
            runtime: Some(runtime),
            dispatcher,
        }
    }

    /// Context backed by the runtime of the calling task
    pub fn current() -> Result<Self, BridgeError> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|e| BridgeError::config_error("runtime", e.to_string()))
    }

    /// Runs every callback on the thread that triggered it
    pub fn inline() -> Self {
        Self {
            runtime: None,
            dispatcher: Arc::new(InlineExecutor),
        }
    }

    /// Serial context for status redelivery
    pub fn dispatcher(&self) -> Arc<dyn Executor> {
        self.dispatcher.clone()
    }

    /// A fresh serial executor, independent of every other one
    pub fn serial_executor(&self, name: &'static str) -> Arc<dyn Executor> {
        match &self.runtime {
            Some(runtime) => Arc::new(SerialExecutor::spawn_on(runtime, name)),
            None => Arc::new(InlineExecutor),
        }
    }

    pub fn runtime(&self) -> Option<&Handle> {
        self.runtime.as_ref()
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("inline", &self.runtime.is_none())
            .finish()
    }
}
