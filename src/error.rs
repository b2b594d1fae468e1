use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid route {key}: {reason}")]
    InvalidRoute { key: String, reason: String },

    #[error("Failed to bind to {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    #[error("Upstream request failed: {0}")]
    Upstream(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, GatewayError>;

/// Failure of a single shutdown hook during teardown.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HookError {
    #[error("graceful shutdown failed within: {}", humantime::format_duration(*.timeout))]
    Timeout { hook: usize, timeout: Duration },

    #[error("shutdown hook {hook} panicked")]
    Panicked { hook: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_message_names_duration() {
        let err = HookError::Timeout {
            hook: 1,
            timeout: Duration::from_millis(100),
        };
        assert_eq!(err.to_string(), "graceful shutdown failed within: 100ms");
    }

    #[test]
    fn test_io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::AddrInUse, "busy");
        let err: GatewayError = io.into();
        assert!(matches!(err, GatewayError::Io(_)));
    }
}
