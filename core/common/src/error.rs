//! Common error types for drivekit.

use thiserror::Error;

use crate::types::Operation;

/// Top-level error type for drivekit operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Required configuration is missing or invalid.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Interactive authentication or token exchange failed.
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// A call to the remote storage service failed.
    #[error("{operation} failed{}: {message}", status_suffix(.status))]
    Upstream {
        /// The operation that was attempted.
        operation: Operation,
        /// HTTP status, when the service answered at all.
        status: Option<u16>,
        /// Response body or transport error text.
        message: String,
    },

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    /// Build an upstream error for a response the service rejected.
    pub fn upstream(operation: Operation, status: u16, message: impl Into<String>) -> Self {
        Self::Upstream {
            operation,
            status: Some(status),
            message: message.into(),
        }
    }

    /// Build an upstream error for a request that never got a response.
    pub fn transport(operation: Operation, message: impl Into<String>) -> Self {
        Self::Upstream {
            operation,
            status: None,
            message: message.into(),
        }
    }

    /// The operation an upstream error is tagged with.
    pub fn operation(&self) -> Option<Operation> {
        match self {
            Self::Upstream { operation, .. } => Some(*operation),
            _ => None,
        }
    }

    /// Whether the service rejected the credentials (HTTP 401).
    ///
    /// Stored tokens are never checked for expiry locally, so this is how a
    /// revoked refresh token surfaces.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Upstream { status: Some(401), .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" ({})", s)).unwrap_or_default()
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_display_includes_operation_and_status() {
        let err = Error::upstream(Operation::ListFiles, 404, "File not found: abc");
        assert_eq!(err.to_string(), "list files failed (404): File not found: abc");
        assert_eq!(err.operation(), Some(Operation::ListFiles));
    }

    #[test]
    fn test_transport_display_without_status() {
        let err = Error::transport(Operation::ReadFile, "connection refused");
        assert_eq!(err.to_string(), "read file failed: connection refused");
    }

    #[test]
    fn test_is_unauthorized() {
        assert!(Error::upstream(Operation::UploadFile, 401, "").is_unauthorized());
        assert!(!Error::upstream(Operation::UploadFile, 403, "").is_unauthorized());
        assert!(!Error::Configuration("x".to_string()).is_unauthorized());
    }

    #[test]
    fn test_json_error_conversion() {
        let err: Error = serde_json::from_str::<u32>("not json").unwrap_err().into();
        assert!(matches!(err, Error::Serialization(_)));
    }
}
