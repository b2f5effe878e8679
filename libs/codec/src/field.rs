//! A single message field with lazy dual representation
//!
//! Every field holds at least one of two forms: the native [`Value`] and
//! the encoded wire bytes. Converting to the missing form happens on first
//! access and is memoized, so repeated reads of a parsed field decrypt
//! once, and serializing an outgoing message encodes each field once.
//! Writing a new value through [`Field::set_value`] drops the stale wire
//! cache.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use once_cell::sync::OnceCell;
use parking_lot::RwLock;

use crate::datatype::Datatype;
use crate::encoding::Encoding;
use crate::error::{DecodeResult, DecodingError, EncodeResult};
use crate::metaspace::MetaSpace;
use crate::value::{Value, WireInstant};
use crypto::RsaPublicKey;

#[derive(Clone)]
pub struct Field {
    index: usize,
    datatype: Arc<dyn Datatype>,
    encoding: Arc<dyn Encoding>,
    native: OnceCell<Value>,
    wire: OnceCell<Bytes>,
    // Shared with the owning message so keys attached after parsing are
    // visible here without any propagation step.
    meta: Arc<RwLock<MetaSpace>>,
}

impl Field {
    /// A locally-built field: the native side is populated.
    pub(crate) fn outgoing(
        index: usize,
        datatype: Arc<dyn Datatype>,
        encoding: Arc<dyn Encoding>,
        value: Value,
        meta: Arc<RwLock<MetaSpace>>,
    ) -> Self {
        Self {
            index,
            datatype,
            encoding,
            native: OnceCell::with_value(value),
            wire: OnceCell::new(),
            meta,
        }
    }

    /// A parsed field: the wire side is populated.
    pub(crate) fn incoming(
        index: usize,
        datatype: Arc<dyn Datatype>,
        encoding: Arc<dyn Encoding>,
        wire: Bytes,
        meta: Arc<RwLock<MetaSpace>>,
    ) -> Self {
        Self {
            index,
            datatype,
            encoding,
            native: OnceCell::new(),
            wire: OnceCell::with_value(wire),
            meta,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn datatype(&self) -> &Arc<dyn Datatype> {
        &self.datatype
    }

    pub fn encoding(&self) -> &Arc<dyn Encoding> {
        &self.encoding
    }

    /// The native value, decoding (and caching) from wire bytes on first
    /// access. Needs whatever key material the encoding consults to be in
    /// the message's meta space by now.
    pub fn value(&self) -> DecodeResult<&Value> {
        self.native.get_or_try_init(|| {
            // One side is always populated by construction; an empty wire
            // cache here would decode as a zero-length payload.
            let wire = self.wire.get().cloned().unwrap_or_default();
            let payload = self.encoding.decode(&wire, &self.meta.read())?;
            self.datatype.decode(&payload)
        })
    }

    /// The wire bytes, encoding (and caching) from the native value on
    /// first access.
    pub fn encoded(&self) -> EncodeResult<Bytes> {
        if let Some(wire) = self.wire.get() {
            return Ok(wire.clone());
        }
        // Wire cache empty implies the native side is populated; an empty
        // field degrades to zero bytes.
        let Some(value) = self.native.get() else {
            return Ok(Bytes::new());
        };
        let payload = self.datatype.encode(value)?;
        let wire = self.encoding.encode(&payload, &self.meta.read())?;
        Ok(self.wire.get_or_init(|| wire).clone())
    }

    /// Replaces the native value and invalidates the stale wire cache.
    /// Reachable only through a writable message.
    pub fn set_value(&mut self, value: Value) {
        self.native = OnceCell::with_value(value);
        self.wire = OnceCell::new();
    }

    fn wrong_datatype(&self, requested: &'static str, actual: &Value) -> DecodingError {
        DecodingError::WrongDatatype {
            index: self.index,
            actual: actual.kind(),
            requested,
        }
    }

    pub fn as_str(&self) -> DecodeResult<&str> {
        match self.value()? {
            Value::Text(s) => Ok(s),
            other => Err(self.wrong_datatype("string", other)),
        }
    }

    pub fn as_blob(&self) -> DecodeResult<&[u8]> {
        match self.value()? {
            Value::Blob(b) => Ok(b),
            other => Err(self.wrong_datatype("blob", other)),
        }
    }

    pub fn as_instant(&self) -> DecodeResult<WireInstant> {
        match self.value()? {
            Value::Instant(t) => Ok(*t),
            other => Err(self.wrong_datatype("instant", other)),
        }
    }

    pub fn as_rsa_key(&self) -> DecodeResult<&RsaPublicKey> {
        match self.value()? {
            Value::RsaKey(k) => Ok(k),
            other => Err(self.wrong_datatype("rsa-key", other)),
        }
    }

    pub fn as_aes_key(&self) -> DecodeResult<&[u8]> {
        match self.value()? {
            Value::AesKey(b) => Ok(b),
            other => Err(self.wrong_datatype("aes-key", other)),
        }
    }

    pub fn as_i32(&self) -> DecodeResult<i32> {
        match self.value()? {
            Value::I32(v) => Ok(*v),
            other => Err(self.wrong_datatype("i32", other)),
        }
    }

    pub fn as_i64(&self) -> DecodeResult<i64> {
        match self.value()? {
            Value::I64(v) => Ok(*v),
            other => Err(self.wrong_datatype("i64", other)),
        }
    }
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("index", &self.index)
            .field("datatype", &self.datatype.name())
            .field("encoding", &self.encoding.name())
            .field("native_cached", &self.native.get().is_some())
            .field("wire_cached", &self.wire.get().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatype::{AesKeyType, StringType};
    use crate::encoding::{AesEncoding, PlainEncoding};

    fn shared_meta() -> Arc<RwLock<MetaSpace>> {
        Arc::new(RwLock::new(MetaSpace::new()))
    }

    #[test]
    fn outgoing_field_encodes_once_and_caches() {
        let field = Field::outgoing(
            0,
            Arc::new(StringType),
            Arc::new(PlainEncoding),
            Value::from("hello"),
            shared_meta(),
        );
        let first = field.encoded().unwrap();
        let second = field.encoded().unwrap();
        assert_eq!(first, second);
        assert_eq!(&first[..], b"hello");
    }

    #[test]
    fn incoming_field_decodes_lazily() {
        let field = Field::incoming(
            0,
            Arc::new(StringType),
            Arc::new(PlainEncoding),
            Bytes::from_static(b"hello"),
            shared_meta(),
        );
        assert_eq!(field.as_str().unwrap(), "hello");
    }

    #[test]
    fn set_value_invalidates_wire_cache() {
        let mut field = Field::outgoing(
            0,
            Arc::new(StringType),
            Arc::new(PlainEncoding),
            Value::from("before"),
            shared_meta(),
        );
        assert_eq!(&field.encoded().unwrap()[..], b"before");

        field.set_value(Value::from("after"));
        assert_eq!(&field.encoded().unwrap()[..], b"after");
        assert_eq!(field.as_str().unwrap(), "after");
    }

    #[test]
    fn keys_attached_after_construction_are_seen() {
        let meta = shared_meta();
        let key = crypto::random_key();
        let ciphertext = crypto::aes_encrypt(&key, b"\x00\x00\x00\x2A");

        let field = Field::incoming(
            0,
            Arc::new(AesKeyType),
            Arc::new(AesEncoding),
            Bytes::from(ciphertext),
            Arc::clone(&meta),
        );

        // Key arrives only now, through the shared meta space.
        meta.write().set_aes(key.to_vec());
        assert_eq!(field.as_aes_key().unwrap(), b"\x00\x00\x00\x2A");
    }

    #[test]
    fn wrong_accessor_reports_both_kinds() {
        let field = Field::incoming(
            3,
            Arc::new(StringType),
            Arc::new(PlainEncoding),
            Bytes::from_static(b"text"),
            shared_meta(),
        );
        let err = field.as_i32().unwrap_err();
        assert!(matches!(
            err,
            DecodingError::WrongDatatype {
                index: 3,
                actual: "string",
                requested: "i32",
            }
        ));
    }
}
