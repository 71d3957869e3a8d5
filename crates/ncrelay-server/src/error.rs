//! Server error types.

use std::fmt;

use ncrelay_core::{ConfigError, EngineError};

/// Errors that can occur in the server.
#[derive(Debug)]
pub enum ServerError {
    /// Configuration error (invalid bind address, out-of-range level, etc.).
    ///
    /// These are fatal errors that prevent server startup. Fix configuration
    /// and restart.
    Config(String),

    /// Transport/network error (bind failure, runtime setup, etc.).
    ///
    /// May be transient (network issues) or fatal (bind address in use).
    /// Check error message for details.
    Transport(String),

    /// Engine library error.
    ///
    /// Fatal when raised by global init; per-session engine errors never reach
    /// this type, they close only the owning session.
    Engine(EngineError),

    /// Internal error (unexpected state, logic bug, etc.).
    ///
    /// Should never happen in correct implementation. Indicates a bug.
    Internal(String),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration error: {msg}"),
            Self::Transport(msg) => write!(f, "transport error: {msg}"),
            Self::Engine(err) => write!(f, "engine error: {err}"),
            Self::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Engine(err) => Some(err),
            _ => None,
        }
    }
}

impl From<EngineError> for ServerError {
    fn from(err: EngineError) -> Self {
        Self::Engine(err)
    }
}

impl From<ConfigError> for ServerError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use super::*;

    #[test]
    fn server_error_display() {
        let err = ServerError::Config("port must be non-zero".to_string());
        assert_eq!(err.to_string(), "configuration error: port must be non-zero");

        let err = ServerError::from(ConfigError::ZeroConnectionLimit);
        assert_eq!(err.to_string(), "configuration error: max connections must be at least 1");

        let err = ServerError::from(std::io::Error::other("address in use"));
        assert_eq!(err.to_string(), "transport error: address in use");
    }

    #[test]
    fn engine_error_is_source() {
        let err = ServerError::from(EngineError::Init("no license".to_string()));
        assert_eq!(err.to_string(), "engine error: engine initialization failed: no license");
        assert!(err.source().is_some());
        assert!(ServerError::Internal("bug".to_string()).source().is_none());
    }
}
