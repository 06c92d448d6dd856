//! Error types and handling for homevolt-local
//!
//! One enum covers both the device failure taxonomy (auth, rate limit,
//! connection, local-mode gate, console command, generic API) and the
//! ambient failures of the service around it.

use thiserror::Error;

/// Result type alias for homevolt-local operations
pub type Result<T> = std::result::Result<T, HomevoltError>;

/// Main error type for homevolt-local
#[derive(Debug, Error)]
pub enum HomevoltError {
    /// Device answered 401
    #[error("Authentication error: {message}")]
    Auth { message: String },

    /// Device answered 429 (it backs off after repeated failed logins)
    #[error("Rate limit error: {message}")]
    RateLimit { message: String },

    /// Network failure, timeout, or server errors after the retry budget ran out
    #[error("{message}")]
    Connection { message: String },

    /// Schedule command refused because the device is under remote control
    #[error("Not in local mode: {message}")]
    NotLocalMode { message: String },

    /// Console command executed but the device reported a non-zero exit code
    #[error("Command error: {message}")]
    Command { message: String },

    /// Any other non-2xx answer, invalid command, or unreadable body
    #[error("API error: {message}")]
    Api { message: String },

    /// Validation errors
    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// File I/O errors
    #[error("I/O error: {message}")]
    Io { message: String },

    /// Coordinator refresh failed
    #[error("Update failed: {message}")]
    UpdateFailed { message: String },

    /// Unknown device, entity or service
    #[error("Not found: {message}")]
    NotFound { message: String },
}

impl HomevoltError {
    /// Create a new authentication error
    pub fn auth<S: Into<String>>(message: S) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    /// Create a new rate limit error
    pub fn rate_limit<S: Into<String>>(message: S) -> Self {
        Self::RateLimit {
            message: message.into(),
        }
    }

    /// Create a new connection error
    pub fn connection<S: Into<String>>(message: S) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Create a new not-local-mode error
    pub fn not_local_mode<S: Into<String>>(message: S) -> Self {
        Self::NotLocalMode {
            message: message.into(),
        }
    }

    /// Create a new command error
    pub fn command<S: Into<String>>(message: S) -> Self {
        Self::Command {
            message: message.into(),
        }
    }

    /// Create a new API error
    pub fn api<S: Into<String>>(message: S) -> Self {
        Self::Api {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<F: Into<String>, M: Into<String>>(field: F, message: M) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// Create a new update error
    pub fn update_failed<S: Into<String>>(message: S) -> Self {
        Self::UpdateFailed {
            message: message.into(),
        }
    }

    /// Create a new not-found error
    pub fn not_found<S: Into<String>>(message: S) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Failures that must never be masked by cached data or retried
    pub const fn is_auth_or_rate_limit(&self) -> bool {
        matches!(self, Self::Auth { .. } | Self::RateLimit { .. })
    }

    /// Failures raised by the device API itself (as opposed to local validation or I/O)
    pub const fn is_device_error(&self) -> bool {
        matches!(
            self,
            Self::Auth { .. }
                | Self::RateLimit { .. }
                | Self::Connection { .. }
                | Self::NotLocalMode { .. }
                | Self::Command { .. }
                | Self::Api { .. }
        )
    }

    /// Stable key for user-facing error messages
    pub const fn translation_key(&self) -> &'static str {
        match self {
            Self::Auth { .. } => "invalid_auth",
            Self::RateLimit { .. } => "rate_limited",
            Self::Connection { .. } | Self::UpdateFailed { .. } => "cannot_connect",
            Self::NotLocalMode { .. } => "not_local_mode",
            Self::Command { .. } => "command_failed",
            Self::Validation { .. } => "invalid_input",
            Self::NotFound { .. } => "not_found",
            Self::Api { .. }
            | Self::Config { .. }
            | Self::Serialization { .. }
            | Self::Io { .. } => "unknown",
        }
    }
}

impl From<std::io::Error> for HomevoltError {
    fn from(err: std::io::Error) -> Self {
        Self::io(err.to_string())
    }
}

impl From<serde_yaml::Error> for HomevoltError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for HomevoltError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}
