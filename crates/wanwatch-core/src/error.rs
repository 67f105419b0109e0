//! Error types for wanwatch
//!
//! One error enum is shared by every crate in the workspace. The variants
//! follow the failure classes the change loop distinguishes:
//!
//! - [`Error::Network`]: transient, retried implicitly by the next poll
//! - [`Error::Config`]: missing or invalid configuration
//! - [`Error::Provider`] / [`Error::NotFound`]: the DNS provider refused or
//!   could not find the zone/record
//! - [`Error::Persistence`]: the history store could not be read or written

use thiserror::Error;

/// Result type alias for wanwatch operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for wanwatch
#[derive(Error, Debug)]
pub enum Error {
    /// Timeouts, connection failures, 5xx responses
    #[error("Network error: {0}")]
    Network(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// History store errors
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Zone or record not found at the provider
    #[error("Not found: {0}")]
    NotFound(String),

    /// Provider-specific error
    #[error("Provider error ({provider}): {message}")]
    Provider {
        /// Provider name
        provider: String,
        /// Error message
        message: String,
    },

    /// Notification delivery failed
    #[error("Notification error ({channel}): {message}")]
    Notification {
        /// Channel the notification was sent on
        channel: String,
        /// Error message, usually the gateway response body
        message: String,
    },

    /// Another process holds the instance lock
    #[error("Another instance is already running: {0}")]
    AlreadyRunning(String),

    /// Filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Settings file parse errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a transient network error
    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a persistence error
    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence(msg.into())
    }

    /// Create a "not found" error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a provider-specific error
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create a notification error
    pub fn notification(channel: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Notification {
            channel: channel.into(),
            message: message.into(),
        }
    }

    /// Whether the next poll cycle may succeed without operator action
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Notification { .. })
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
