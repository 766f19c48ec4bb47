/// Completion callbacks handed to application connections.
///
/// Every completion fires exactly once. Calling `complete` consumes it; a
/// completion dropped without being called fires itself from `Drop` so the
/// bridge is never left waiting on a lost callback.

use std::fmt;
use crate::error::MessagingError;

/// Outcome of an open or send
pub type MessagingResult = Result<(), MessagingError>;

type ResultCallback = Box<dyn FnOnce(MessagingResult) + Send + 'static>;
type CloseCallback = Box<dyn FnOnce() + Send + 'static>;

/// Completion for `open` and `send`
pub struct MessagingCompletion {
    operation: &'static str,
    callback: Option<ResultCallback>,
}

impl MessagingCompletion {
    pub fn new<F>(operation: &'static str, callback: F) -> Self
    where
        F: FnOnce(MessagingResult) + Send + 'static,
    {
        Self {
            operation,
            callback: Some(Box::new(callback)),
        }
    }

    /// Reports the outcome as a `(success, error)` pair.
    ///
    /// A failure without an error is reported as a non-recoverable
    /// transport error.
    pub fn complete(self, success: bool, error: Option<MessagingError>) {
        let result = match (success, error) {
            (true, _) => Ok(()),
            (false, Some(error)) => Err(error),
            (false, None) => Err(MessagingError::transport(
                format!("{} failed without an error", self.operation),
                false,
            )),
        };
        self.finish(result);
    }

    pub fn succeed(self) {
        self.finish(Ok(()));
    }

    pub fn fail(self, error: MessagingError) {
        self.finish(Err(error));
    }

    pub fn finish(mut self, result: MessagingResult) {
        if let Some(callback) = self.callback.take() {
            callback(result);
        }
    }

    pub fn operation(&self) -> &'static str {
        self.operation
    }
}

impl Drop for MessagingCompletion {
    fn drop(&mut self) {
        if let Some(callback) = self.callback.take() {
            tracing::warn!("[COMPLETION] {} completion dropped without being called", self.operation);
            callback(Err(MessagingError::transport(
                format!("{} completion dropped", self.operation),
                true,
            )));
        }
    }
}

impl fmt::Debug for MessagingCompletion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessagingCompletion")
            .field("operation", &self.operation)
            .field("pending", &self.callback.is_some())
            .finish()
    }
}

/// Completion for `close`. Closing always succeeds, so it carries nothing.
pub struct MessagingCloseCompletion {
    callback: Option<CloseCallback>,
}

impl MessagingCloseCompletion {
    pub fn new<F>(callback: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            callback: Some(Box::new(callback)),
        }
    }

    pub fn complete(mut self) {
        if let Some(callback) = self.callback.take() {
            callback();
        }
    }
}

impl Drop for MessagingCloseCompletion {
    fn drop(&mut self) {
        if let Some(callback) = self.callback.take() {
            tracing::warn!("[COMPLETION] close completion dropped without being called");
            callback();
        }
    }
}

impl fmt::Debug for MessagingCloseCompletion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessagingCloseCompletion")
            .field("pending", &self.callback.is_some())
            .finish()
    }
}
