//! Error types for RelayBot.

use thiserror::Error;

/// Common error type for RelayBot.
#[derive(Error, Debug)]
pub enum RelayError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    ///
    /// Raised while building a network from its config section. Only the
    /// affected section is skipped.
    #[error("configuration error: {0}")]
    Config(String),

    /// Connection could not be established.
    #[error("connection error: {0}")]
    Connection(String),

    /// TLS setup or handshake failure.
    #[error("TLS error: {0}")]
    Tls(String),

    /// Connection attempt exceeded the configured timeout.
    #[error("connection timed out after {0} seconds")]
    Timeout(u64),

    /// Malformed line received from the server.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The outbound queue of a connection is gone.
    #[error("connection to {0} is closed")]
    ChannelClosed(String),
}

/// Result type alias for RelayBot operations.
pub type Result<T> = std::result::Result<T, RelayError>;
