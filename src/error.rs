use std::fmt;

/// Error domains reported to the engine alongside a close acknowledgement
pub mod domain {
    /// No error; the connection closed cleanly
    pub const NONE: i32 = 0;
    pub const LITE_CORE: i32 = 1;
    pub const POSIX: i32 = 2;
    pub const NETWORK: i32 = 5;
    /// Close codes and handshake failures
    pub const WEB_SOCKET: i32 = 6;
}

/// WebSocket-style close code exchanged with the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CloseCode(u16);

impl CloseCode {
    pub const NORMAL: CloseCode = CloseCode(1000);
    pub const GOING_AWAY: CloseCode = CloseCode(1001);
    pub const PROTOCOL_ERROR: CloseCode = CloseCode(1002);
    pub const ABNORMAL: CloseCode = CloseCode(1006);
    pub const POLICY_VIOLATION: CloseCode = CloseCode(1008);
    pub const MESSAGE_TOO_BIG: CloseCode = CloseCode(1009);
    pub const INTERNAL_ERROR: CloseCode = CloseCode(1011);
    pub const TRY_AGAIN_LATER: CloseCode = CloseCode(1013);
    /// Application-level failure the engine should retry after
    pub const USER_TRANSIENT: CloseCode = CloseCode(4001);
    /// Application-level failure the engine must not retry
    pub const USER_PERMANENT: CloseCode = CloseCode(4002);

    pub const fn new(code: u16) -> Self {
        Self(code)
    }

    pub const fn as_u16(&self) -> u16 {
        self.0
    }

    pub fn is_normal(&self) -> bool {
        *self == Self::NORMAL
    }

    /// Whether the code belongs to the transient family.
    ///
    /// This is the only input used to derive the `recoverable` flag of a
    /// messaging error built from a close code.
    pub fn is_transient(&self) -> bool {
        matches!(
            *self,
            Self::GOING_AWAY | Self::ABNORMAL | Self::TRY_AGAIN_LATER | Self::USER_TRANSIENT
        )
    }

    /// Status code the engine sees for an application-supplied error
    pub fn for_error(error: Option<&MessagingError>) -> Self {
        match error {
            None => Self::NORMAL,
            Some(error) => error.close_code(),
        }
    }
}

impl fmt::Display for CloseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u16> for CloseCode {
    fn from(code: u16) -> Self {
        Self(code)
    }
}

impl From<CloseCode> for u16 {
    fn from(code: CloseCode) -> Self {
        code.0
    }
}

/// Unified bridge error type
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// The engine asked to close with a non-normal code
    #[error("WebSocket closed with code {code}: {message}")]
    Closed {
        code: CloseCode,
        message: String,
    },

    /// Failure reported by the application transport
    #[error("Transport error: {reason} (retryable: {retryable})")]
    Transport {
        reason: String,
        retryable: bool,
    },

    /// Failure reported by the replication engine
    #[error("Engine error (domain {domain}, code {code}): {message}")]
    Engine {
        domain: i32,
        code: i32,
        message: String,
    },

    #[error("Configuration error in field '{field}': {reason}")]
    Configuration {
        field: String,
        reason: String,
    },
}

impl BridgeError {
    pub fn is_retryable(&self) -> bool {
        match self {
            BridgeError::Closed { code, .. } => code.is_transient(),
            BridgeError::Transport { retryable, .. } => *retryable,
            BridgeError::Engine { .. } => false,
            BridgeError::Configuration { .. } => false,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            BridgeError::Closed { .. } => "CLOSE_ERROR",
            BridgeError::Transport { .. } => "TRANSPORT_ERROR",
            BridgeError::Engine { .. } => "ENGINE_ERROR",
            BridgeError::Configuration { .. } => "CONFIG_ERROR",
        }
    }

    /// Human readable reason without the variant prefix
    pub fn message(&self) -> &str {
        match self {
            BridgeError::Closed { message, .. } => message,
            BridgeError::Transport { reason, .. } => reason,
            BridgeError::Engine { message, .. } => message,
            BridgeError::Configuration { reason, .. } => reason,
        }
    }

    /// Adds the name of the failing operation to transport errors
    pub fn with_operation(mut self, op: &'static str) -> Self {
        if let BridgeError::Transport { reason, .. } = &mut self {
            if !reason.contains("operation:") {
                *reason = format!("{} (operation: {})", reason, op);
            }
        }
        self
    }
}

impl BridgeError {
    pub fn closed(code: CloseCode, message: impl Into<String>) -> Self {
        Self::Closed {
            code,
            message: message.into(),
        }
    }

    pub fn transport_error(reason: impl Into<String>, retryable: bool) -> Self {
        Self::Transport {
            reason: reason.into(),
            retryable,
        }
    }

    pub fn engine_error(domain: i32, code: i32, message: impl Into<String>) -> Self {
        Self::Engine {
            domain,
            code,
            message: message.into(),
        }
    }

    pub fn config_error(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Configuration {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl From<std::io::Error> for BridgeError {
    fn from(error: std::io::Error) -> Self {
        let retryable = matches!(
            error.kind(),
            std::io::ErrorKind::ConnectionRefused
                | std::io::ErrorKind::ConnectionAborted
                | std::io::ErrorKind::ConnectionReset
                | std::io::ErrorKind::TimedOut
                | std::io::ErrorKind::Interrupted
        );

        BridgeError::Transport {
            reason: format!("IO error: {}", error),
            retryable,
        }
    }
}

/// An error crossing the bridge in either direction.
///
/// `recoverable` is supplied by whichever side detected the failure and is
/// the sole signal used to decide whether the engine should retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessagingError {
    error: BridgeError,
    recoverable: bool,
}

impl MessagingError {
    pub fn new(error: BridgeError, recoverable: bool) -> Self {
        Self { error, recoverable }
    }

    /// Transport failure with the given recoverability
    pub fn transport(reason: impl Into<String>, recoverable: bool) -> Self {
        Self::new(BridgeError::transport_error(reason, recoverable), recoverable)
    }

    /// Classifies an engine close request.
    ///
    /// A normal close carries no error at all; every other code becomes an
    /// error that is recoverable only for the transient family.
    pub fn from_close(code: CloseCode, message: impl Into<String>) -> Option<Self> {
        if code.is_normal() {
            return None;
        }
        Some(Self::new(BridgeError::closed(code, message), code.is_transient()))
    }

    pub fn error(&self) -> &BridgeError {
        &self.error
    }

    pub fn into_error(self) -> BridgeError {
        self.error
    }

    pub fn is_recoverable(&self) -> bool {
        self.recoverable
    }

    /// Close code reported to the engine for this error.
    ///
    /// Errors built from a close code keep it; all others map to the
    /// user transient/permanent pair.
    pub fn close_code(&self) -> CloseCode {
        match &self.error {
            BridgeError::Closed { code, .. } => *code,
            _ if self.recoverable => CloseCode::USER_TRANSIENT,
            _ => CloseCode::USER_PERMANENT,
        }
    }

    pub fn message(&self) -> &str {
        self.error.message()
    }
}

impl fmt::Display for MessagingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MessagingError{{{}, {}}}", self.recoverable, self.error)
    }
}

impl std::error::Error for MessagingError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

impl From<MessagingError> for BridgeError {
    fn from(error: MessagingError) -> Self {
        error.error
    }
}
