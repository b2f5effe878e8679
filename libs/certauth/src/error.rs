//! Certificate authority errors

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CertAuthError {
    /// The authority answered with an explicit rejection
    #[error("Request rejected by the certificate authority")]
    Rejected,

    /// No answer arrived within the deadline
    #[error("Timed out after {timeout_ms}ms waiting for {operation}")]
    TimedOut {
        operation: &'static str,
        timeout_ms: u64,
    },

    /// The answer arrived but did not have the expected shape
    #[error("Malformed authority response: {reason}")]
    InvalidResponse { reason: String },

    /// Underlying link failure
    #[error(transparent)]
    Transport(#[from] transport::TransportError),

    /// Request could not be built
    #[error(transparent)]
    Encoding(#[from] codec::EncodingError),

    /// Response field could not be decoded
    #[error(transparent)]
    Decoding(#[from] codec::DecodingError),

    /// Cryptographic failure while issuing or checking a certificate
    #[error(transparent)]
    Crypto(#[from] crypto::CryptoError),
}

impl CertAuthError {
    /// Create an InvalidResponse error with diagnostic context
    pub fn invalid_response(reason: impl Into<String>) -> Self {
        Self::InvalidResponse {
            reason: reason.into(),
        }
    }
}

/// Result type for certificate authority operations
pub type Result<T> = std::result::Result<T, CertAuthError>;
