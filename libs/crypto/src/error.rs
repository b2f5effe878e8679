//! Crypto-level errors for key handling and cipher operations
//!
//! Wrong keys and corrupt ciphertext are *expected* failure modes on a
//! hostile wire, so every variant carries enough context to log without
//! ever panicking in library code.

use thiserror::Error;

/// Cipher and key-material errors
#[derive(Debug, Error)]
pub enum CryptoError {
    /// RSA keypair generation failed
    #[error("Key generation failed: {0}")]
    KeyGeneration(#[from] rsa::Error),

    /// Encoded key bytes did not match the expected layout
    #[error("Invalid encoded RSA key: {reason}")]
    InvalidKeyEncoding { reason: String },

    /// Plaintext block is numerically too large for the RSA modulus
    #[error("RSA block too large: {block_bytes} bytes does not fit a {modulus_bits}-bit modulus")]
    BlockTooLarge {
        block_bytes: usize,
        modulus_bits: usize,
    },

    /// Decryption produced garbage: wrong key or foreign ciphertext
    #[error("Invalid ciphertext: {context}")]
    InvalidCiphertext { context: String },
}

impl CryptoError {
    /// Create an InvalidKeyEncoding error with diagnostic context
    pub fn invalid_key(reason: impl Into<String>) -> Self {
        Self::InvalidKeyEncoding {
            reason: reason.into(),
        }
    }

    /// Create an InvalidCiphertext error with diagnostic context
    pub fn invalid_ciphertext(context: impl Into<String>) -> Self {
        Self::InvalidCiphertext {
            context: context.into(),
        }
    }
}

/// Result type for crypto operations
pub type CryptoResult<T> = std::result::Result<T, CryptoError>;
