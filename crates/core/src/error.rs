//! Unified error types for the analytics engine.
//!
//! Error codes:
//! - STORE_001: Storage read/write failure
//! - TRANSPORT_001-003: Transport connection errors
//! - SESSION_001: Invalid session lifecycle transition
//! - VALID_001: Captured event failed validation

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Transport error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorCode {
    /// TRANSPORT_001: Connection did not become ready in time
    ConnectTimeout,
    /// TRANSPORT_002: Socket could not be opened
    ConnectFailed,
    /// TRANSPORT_003: Transport has been torn down
    Closed,
}

impl TransportErrorCode {
    /// Get the error code string.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConnectTimeout => "TRANSPORT_001",
            Self::ConnectFailed => "TRANSPORT_002",
            Self::Closed => "TRANSPORT_003",
        }
    }
}

/// Unified error type for the analytics engine.
#[derive(Debug, Error)]
pub enum Error {
    /// Transport error with code.
    #[error("[{code}] {message}")]
    Transport {
        code: &'static str,
        message: String,
    },

    #[error("[STORE_001] storage error: {0}")]
    Storage(String),

    #[error("[SESSION_001] invalid session transition: {0}")]
    InvalidSession(String),

    #[error("[VALID_001] validation error: {0}")]
    Validation(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("export error: {0}")]
    Export(String),

    #[error("unknown test: {0}")]
    UnknownTest(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a transport error.
    pub fn transport(code: TransportErrorCode, msg: impl Into<String>) -> Self {
        Self::Transport {
            code: code.code(),
            message: msg.into(),
        }
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    pub fn invalid_session(msg: impl Into<String>) -> Self {
        Self::InvalidSession(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn export(msg: impl Into<String>) -> Self {
        Self::Export(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Get the error code if this is a coded error.
    pub fn error_code(&self) -> Option<&'static str> {
        match self {
            Self::Transport { code, .. } => Some(code),
            Self::Storage(_) => Some("STORE_001"),
            Self::InvalidSession(_) => Some("SESSION_001"),
            Self::Validation(_) => Some("VALID_001"),
            _ => None,
        }
    }

    /// Whether the error came from the transport layer.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::Validation(errors.to_string())
    }
}
