//! Transport error types

use std::net::SocketAddr;

use thiserror::Error;

/// Main transport error type
#[derive(Debug, Error)]
pub enum TransportError {
    /// Could not bind the listening socket
    #[error("Bind failed on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    /// Connection establishment or session failure
    #[error("Connection error: {message} (remote: {remote_addr:?})")]
    Connection {
        message: String,
        remote_addr: Option<SocketAddr>,
        source: Option<std::io::Error>,
    },

    /// The link or its writer has shut down
    #[error("Link closed: {context}")]
    Closed { context: &'static str },

    /// A message could not be serialized for the wire
    #[error("Message encoding failed: {0}")]
    Encoding(#[from] codec::EncodingError),

    /// Invalid configuration
    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

impl TransportError {
    /// Create a connection error
    pub fn connection(message: impl Into<String>, remote_addr: Option<SocketAddr>) -> Self {
        Self::Connection {
            message: message.into(),
            remote_addr,
            source: None,
        }
    }

    /// Create a connection error with its I/O source
    pub fn connection_with_source(
        message: impl Into<String>,
        remote_addr: Option<SocketAddr>,
        source: std::io::Error,
    ) -> Self {
        Self::Connection {
            message: message.into(),
            remote_addr,
            source: Some(source),
        }
    }

    /// Create a closed-link error
    pub fn closed(context: &'static str) -> Self {
        Self::Closed { context }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}

/// Result type alias for transport operations
pub type Result<T> = std::result::Result<T, TransportError>;
