/// Listener configuration
///
/// Plain settings are serde-friendly so they can live in an application's
/// config file; the owning database is attached separately.

use std::fmt;
use std::sync::Arc;
use serde::{Deserialize, Serialize};
use crate::{
    engine::{ReplicationHost, SessionOptions},
    error::BridgeError,
    framing::ProtocolType,
};

const DEFAULT_CHANGE_STREAM_CAPACITY: usize = 256;

/// Configuration error
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for field '{field}': {value} - {reason}. Suggestion: {suggestion}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
        suggestion: String,
    },

    #[error("Failed to parse configuration: {reason}")]
    Parse {
        reason: String,
        #[source]
        source: Option<serde_json::Error>,
    },
}

impl From<ConfigError> for BridgeError {
    fn from(error: ConfigError) -> Self {
        match &error {
            ConfigError::InvalidValue { field, .. } => BridgeError::config_error(field.clone(), error.to_string()),
            ConfigError::Parse { .. } => BridgeError::config_error("config", error.to_string()),
        }
    }
}

/// Settings shared by every connection a listener accepts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    pub protocol_type: ProtocolType,
    /// Inbound passive sessions refuse conflicting revisions instead of
    /// resolving them
    pub no_incoming_conflicts: bool,
    /// Buffered changes per `changes()` subscriber
    pub change_stream_capacity: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            protocol_type: ProtocolType::MessageStream,
            no_incoming_conflicts: true,
            change_stream_capacity: DEFAULT_CHANGE_STREAM_CAPACITY,
        }
    }
}

impl ListenerConfig {
    pub fn new(protocol_type: ProtocolType) -> Self {
        Self {
            protocol_type,
            ..Self::default()
        }
    }

    pub fn with_change_stream_capacity(mut self, capacity: usize) -> Self {
        self.change_stream_capacity = capacity;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.change_stream_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "change_stream_capacity".to_string(),
                value: "0".to_string(),
                reason: "must be > 0".to_string(),
                suggestion: format!("set a positive value like {}", DEFAULT_CHANGE_STREAM_CAPACITY),
            });
        }
        Ok(())
    }

    /// Parses and validates a JSON document; missing fields take defaults
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
            source: Some(e),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Options handed to the engine for each passive session
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions::passive(self.no_incoming_conflicts)
    }
}

/// What a listener needs to accept connections: the owning database and
/// validated settings
#[derive(Clone)]
pub struct MessageEndpointListenerConfiguration {
    host: Arc<dyn ReplicationHost>,
    settings: ListenerConfig,
}

impl MessageEndpointListenerConfiguration {
    pub fn new(host: Arc<dyn ReplicationHost>, protocol_type: ProtocolType) -> Self {
        Self {
            host,
            settings: ListenerConfig::new(protocol_type),
        }
    }

    pub fn with_settings(host: Arc<dyn ReplicationHost>, settings: ListenerConfig) -> Result<Self, ConfigError> {
        settings.validate()?;
        Ok(Self { host, settings })
    }

    pub fn host(&self) -> &Arc<dyn ReplicationHost> {
        &self.host
    }

    pub fn protocol_type(&self) -> ProtocolType {
        self.settings.protocol_type
    }

    pub fn settings(&self) -> &ListenerConfig {
        &self.settings
    }
}

impl fmt::Debug for MessageEndpointListenerConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageEndpointListenerConfiguration")
            .field("settings", &self.settings)
            .finish()
    }
}
