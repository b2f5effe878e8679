//! Codec error taxonomy
//!
//! Two distinct families: [`DecodingError`] for anything wrong with bytes
//! arriving off the wire (hostile input, never a panic), and
//! [`EncodingError`] for local construction and serialization failures
//! (usually missing key material or misuse of a read-only message).

use thiserror::Error;

use crate::metaspace::KeySlot;
use crypto::CryptoError;

/// Failures while interpreting bytes received from a peer
#[derive(Debug, Error)]
pub enum DecodingError {
    /// Buffer ended before a structurally required element
    #[error("Insufficient data reading {context}: need {need} bytes, have {have}")]
    InsufficientData {
        context: &'static str,
        need: usize,
        have: usize,
    },

    /// Buffer does not begin with the protocol magic
    #[error("Buffer does not start with the protocol magic")]
    InvalidMagic,

    /// Header declared a negative field count
    #[error("Invalid field count: {count}")]
    InvalidFieldCount { count: i32 },

    /// Header declared a negative signature length
    #[error("Invalid signature length: {length}")]
    InvalidSignatureLength { length: i32 },

    /// A field declaration carried a negative payload size
    #[error("Field {index} declares a negative size ({size})")]
    NegativeFieldSize { index: usize, size: i32 },

    /// Declared payload bytes exceed what the buffer actually holds
    #[error("Declared field payloads total {declared} bytes but only {available} remain")]
    OversizedFields { declared: u64, available: u64 },

    /// A frame exceeded the reader's configured bound
    #[error("Frame exceeds the configured limit: {requested} bytes > {limit} max")]
    FrameTooLarge { requested: u64, limit: usize },

    /// Key material needed to reverse a field encoding was absent
    #[error("No key material in slot {slot} while decoding")]
    MissingKey { slot: KeySlot },

    /// A field held a different datatype than the accessor asked for
    #[error("Field {index} holds {actual}, not {requested}")]
    WrongDatatype {
        index: usize,
        actual: &'static str,
        requested: &'static str,
    },

    /// Payload bytes did not form a valid value of the declared datatype
    #[error("Invalid field payload: {reason}")]
    InvalidFieldData { reason: String },

    /// A cipher operation failed while reversing an encoding
    #[error("Cipher failure while decoding: {0}")]
    Cipher(#[from] CryptoError),
}

impl DecodingError {
    /// Create an InsufficientData error naming the element being read
    pub fn insufficient(context: &'static str, need: usize, have: usize) -> Self {
        Self::InsufficientData {
            context,
            need,
            have,
        }
    }

    /// Create an InvalidFieldData error with diagnostic context
    pub fn invalid_field(reason: impl Into<String>) -> Self {
        Self::InvalidFieldData {
            reason: reason.into(),
        }
    }
}

/// Failures while building or serializing an outgoing message
#[derive(Debug, Error)]
pub enum EncodingError {
    /// Parsed messages are immutable; mutation was attempted
    #[error("Message is read-only: parsed messages cannot be modified or signed")]
    ReadOnly,

    /// Key material needed to apply a field encoding was absent
    #[error("No key material in slot {slot} while encoding")]
    MissingKey { slot: KeySlot },

    /// A value was handed to a datatype that cannot represent it
    #[error("Value of kind {actual} cannot be encoded as {datatype}")]
    ValueMismatch {
        datatype: &'static str,
        actual: &'static str,
    },

    /// A cipher operation failed while applying an encoding
    #[error("Cipher failure while encoding: {0}")]
    Cipher(#[from] CryptoError),
}

/// Result type for wire decoding
pub type DecodeResult<T> = std::result::Result<T, DecodingError>;

/// Result type for message construction and serialization
pub type EncodeResult<T> = std::result::Result<T, EncodingError>;
