//! # Aeris Wire Protocol Codec
//!
//! ## Purpose
//!
//! Everything between raw bytes and a typed [`Message`]:
//! - Frame layout: magic, timestamps, flags, signature, field declarations
//! - The per-field pipeline: a [`Datatype`](datatype::Datatype) converts
//!   native values to payload bytes, an [`Encoding`](encoding::Encoding)
//!   transforms payload bytes for the wire (possibly cryptographically)
//! - Message signing and validation
//! - A resynchronizing [`FrameReader`] for byte streams
//!
//! ## Architecture Role
//!
//! ```text
//! transport (sockets, dispatch) → [codec] → crypto (ciphers, keys)
//!                                    ↓
//!                       Message, Field, MetaSpace
//! ```
//!
//! ## Key Design Points
//!
//! - **Lazy both ways**: parsed fields stay encrypted until first read;
//!   built fields stay native until first serialization. Each conversion
//!   runs once and is cached.
//! - **Keys travel with the message**: encodings take their key material
//!   from the message's [`MetaSpace`], never from process-wide state.
//! - **Hostile-wire posture**: parsing returns typed errors, unknown ids
//!   degrade to passthrough with a warning, and the stream reader rescans
//!   rather than dying on a bad frame.

mod cursor;
pub mod datatype;
pub mod encoding;
pub mod error;
pub mod field;
pub mod frame;
pub mod message;
pub mod metaspace;
mod signing;
pub mod value;

use std::sync::Arc;

use once_cell::sync::Lazy;

pub use crate::datatype::{Datatype, DatatypeRegistry};
pub use crate::encoding::{Encoding, EncodingRegistry};
pub use crate::error::{DecodeResult, DecodingError, EncodeResult, EncodingError};
pub use crate::field::Field;
pub use crate::frame::{FrameReader, DEFAULT_MAX_FRAME_BYTES};
pub use crate::message::{flag, Message, MAGIC, MIN_WIRE_LEN};
pub use crate::metaspace::{KeyMaterial, KeySlot, MetaSpace};
pub use crate::value::{Value, WireInstant};

/// A datatype table and an encoding table, bundled.
///
/// Most callers use the immutable process default via [`Codec::shared`];
/// anything that needs custom datatypes or encodings builds its own and
/// threads it through `Message::with_codec` / `FrameReader::with_codec`.
pub struct Codec {
    datatypes: DatatypeRegistry,
    encodings: EncodingRegistry,
}

impl Codec {
    /// The standard datatypes and encodings.
    pub fn standard() -> Self {
        Self {
            datatypes: DatatypeRegistry::standard(),
            encodings: EncodingRegistry::standard(),
        }
    }

    /// A codec from explicit registries.
    pub fn new(datatypes: DatatypeRegistry, encodings: EncodingRegistry) -> Self {
        Self {
            datatypes,
            encodings,
        }
    }

    /// The shared process-default codec.
    pub fn shared() -> Arc<Codec> {
        static SHARED: Lazy<Arc<Codec>> = Lazy::new(|| Arc::new(Codec::standard()));
        Arc::clone(&SHARED)
    }

    pub fn datatypes(&self) -> &DatatypeRegistry {
        &self.datatypes
    }

    pub fn encodings(&self) -> &EncodingRegistry {
        &self.encodings
    }
}

impl Default for Codec {
    fn default() -> Self {
        Self::standard()
    }
}
