//! Field datatypes: native value <-> payload bytes
//!
//! A datatype is the *inner* half of the field pipeline; it never touches
//! keys. Each one owns a wire id carried in the field declaration. Multi-
//! byte scalars inside payloads are always big-endian regardless of the
//! header flag, which only governs header and declaration scalars.

use std::collections::HashMap;
use std::sync::Arc;

use byteorder::{BigEndian, ByteOrder};
use bytes::Bytes;
use tracing::warn;

use crate::error::{DecodeResult, DecodingError, EncodeResult, EncodingError};
use crate::value::{Value, WireInstant};
use crypto::{decode_public_key, encode_public_key};

/// Wire ids of the standard datatypes.
pub mod ids {
    pub const BLOB: u16 = 0;
    pub const STRING: u16 = 1;
    pub const INSTANT: u16 = 2;
    pub const RSA_KEY: u16 = 3;
    pub const AES_KEY: u16 = 4;
    pub const I32: u16 = 5;
    pub const I64: u16 = 6;
    pub const F32: u16 = 7;
    pub const F64: u16 = 8;
}

/// Converts between a [`Value`] and its payload byte form.
pub trait Datatype: Send + Sync {
    fn id(&self) -> u16;
    fn name(&self) -> &'static str;
    fn encode(&self, value: &Value) -> EncodeResult<Bytes>;
    fn decode(&self, payload: &[u8]) -> DecodeResult<Value>;
}

fn mismatch(datatype: &'static str, value: &Value) -> EncodingError {
    EncodingError::ValueMismatch {
        datatype,
        actual: value.kind(),
    }
}

/// Opaque bytes. Also the fallback for unrecognized datatype ids, so it
/// accepts any payload on decode.
pub struct BlobType;

impl Datatype for BlobType {
    fn id(&self) -> u16 {
        ids::BLOB
    }

    fn name(&self) -> &'static str {
        "blob"
    }

    fn encode(&self, value: &Value) -> EncodeResult<Bytes> {
        match value {
            Value::Blob(b) => Ok(b.clone()),
            other => Err(mismatch(self.name(), other)),
        }
    }

    fn decode(&self, payload: &[u8]) -> DecodeResult<Value> {
        Ok(Value::Blob(Bytes::copy_from_slice(payload)))
    }
}

/// UTF-8 text.
pub struct StringType;

impl Datatype for StringType {
    fn id(&self) -> u16 {
        ids::STRING
    }

    fn name(&self) -> &'static str {
        "string"
    }

    fn encode(&self, value: &Value) -> EncodeResult<Bytes> {
        match value {
            Value::Text(s) => Ok(Bytes::copy_from_slice(s.as_bytes())),
            other => Err(mismatch(self.name(), other)),
        }
    }

    fn decode(&self, payload: &[u8]) -> DecodeResult<Value> {
        let text = std::str::from_utf8(payload)
            .map_err(|e| DecodingError::invalid_field(format!("not valid UTF-8: {e}")))?;
        Ok(Value::Text(text.to_owned()))
    }
}

/// `[i64 secs][i32 nanos]`, big-endian.
pub struct InstantType;

impl Datatype for InstantType {
    fn id(&self) -> u16 {
        ids::INSTANT
    }

    fn name(&self) -> &'static str {
        "instant"
    }

    fn encode(&self, value: &Value) -> EncodeResult<Bytes> {
        match value {
            Value::Instant(t) => {
                let mut buf = [0u8; WireInstant::WIDTH];
                BigEndian::write_i64(&mut buf[..8], t.secs);
                BigEndian::write_i32(&mut buf[8..], t.nanos);
                Ok(Bytes::copy_from_slice(&buf))
            }
            other => Err(mismatch(self.name(), other)),
        }
    }

    fn decode(&self, payload: &[u8]) -> DecodeResult<Value> {
        if payload.len() != WireInstant::WIDTH {
            return Err(DecodingError::invalid_field(format!(
                "instant payload must be {} bytes, got {}",
                WireInstant::WIDTH,
                payload.len()
            )));
        }
        Ok(Value::Instant(WireInstant {
            secs: BigEndian::read_i64(&payload[..8]),
            nanos: BigEndian::read_i32(&payload[8..]),
        }))
    }
}

/// An RSA public key in its magic-guarded byte encoding.
pub struct RsaKeyType;

impl Datatype for RsaKeyType {
    fn id(&self) -> u16 {
        ids::RSA_KEY
    }

    fn name(&self) -> &'static str {
        "rsa-key"
    }

    fn encode(&self, value: &Value) -> EncodeResult<Bytes> {
        match value {
            Value::RsaKey(key) => Ok(Bytes::from(encode_public_key(key))),
            other => Err(mismatch(self.name(), other)),
        }
    }

    fn decode(&self, payload: &[u8]) -> DecodeResult<Value> {
        Ok(Value::RsaKey(decode_public_key(payload)?))
    }
}

/// Raw AES key bytes.
pub struct AesKeyType;

impl Datatype for AesKeyType {
    fn id(&self) -> u16 {
        ids::AES_KEY
    }

    fn name(&self) -> &'static str {
        "aes-key"
    }

    fn encode(&self, value: &Value) -> EncodeResult<Bytes> {
        match value {
            Value::AesKey(b) => Ok(b.clone()),
            other => Err(mismatch(self.name(), other)),
        }
    }

    fn decode(&self, payload: &[u8]) -> DecodeResult<Value> {
        Ok(Value::AesKey(Bytes::copy_from_slice(payload)))
    }
}

macro_rules! scalar_datatype {
    ($ty:ident, $id:expr, $name:literal, $variant:ident, $width:expr, $write:ident, $read:ident) => {
        pub struct $ty;

        impl Datatype for $ty {
            fn id(&self) -> u16 {
                $id
            }

            fn name(&self) -> &'static str {
                $name
            }

            fn encode(&self, value: &Value) -> EncodeResult<Bytes> {
                match value {
                    Value::$variant(v) => {
                        let mut buf = [0u8; $width];
                        BigEndian::$write(&mut buf, *v);
                        Ok(Bytes::copy_from_slice(&buf))
                    }
                    other => Err(mismatch(self.name(), other)),
                }
            }

            fn decode(&self, payload: &[u8]) -> DecodeResult<Value> {
                if payload.len() != $width {
                    return Err(DecodingError::invalid_field(format!(
                        "{} payload must be {} bytes, got {}",
                        $name,
                        $width,
                        payload.len()
                    )));
                }
                Ok(Value::$variant(BigEndian::$read(payload)))
            }
        }
    };
}

scalar_datatype!(I32Type, ids::I32, "i32", I32, 4, write_i32, read_i32);
scalar_datatype!(I64Type, ids::I64, "i64", I64, 8, write_i64, read_i64);
scalar_datatype!(F32Type, ids::F32, "f32", F32, 4, write_f32, read_f32);
scalar_datatype!(F64Type, ids::F64, "f64", F64, 8, write_f64, read_f64);

/// Id-indexed datatype table.
///
/// Unknown ids resolve to [`BlobType`] with a warning rather than failing
/// the whole message, so one exotic field never poisons its neighbors.
pub struct DatatypeRegistry {
    by_id: HashMap<u16, Arc<dyn Datatype>>,
    fallback: Arc<dyn Datatype>,
}

impl DatatypeRegistry {
    /// Empty registry with only the blob fallback.
    pub fn new() -> Self {
        Self {
            by_id: HashMap::new(),
            fallback: Arc::new(BlobType),
        }
    }

    /// All standard datatypes registered.
    pub fn standard() -> Self {
        let mut reg = Self::new();
        reg.register(Arc::new(BlobType));
        reg.register(Arc::new(StringType));
        reg.register(Arc::new(InstantType));
        reg.register(Arc::new(RsaKeyType));
        reg.register(Arc::new(AesKeyType));
        reg.register(Arc::new(I32Type));
        reg.register(Arc::new(I64Type));
        reg.register(Arc::new(F32Type));
        reg.register(Arc::new(F64Type));
        reg
    }

    /// Registers (or replaces) a datatype under its own id.
    pub fn register(&mut self, datatype: Arc<dyn Datatype>) {
        self.by_id.insert(datatype.id(), datatype);
    }

    /// Resolves an id, falling back to blob for anything unknown.
    pub fn get(&self, id: u16) -> Arc<dyn Datatype> {
        match self.by_id.get(&id) {
            Some(dt) => Arc::clone(dt),
            None => {
                warn!(datatype_id = id, "unknown datatype id, treating payload as blob");
                Arc::clone(&self.fallback)
            }
        }
    }

    /// Picks the datatype matching a value's variant.
    pub fn for_value(&self, value: &Value) -> Arc<dyn Datatype> {
        let id = match value {
            Value::Blob(_) => ids::BLOB,
            Value::Text(_) => ids::STRING,
            Value::Instant(_) => ids::INSTANT,
            Value::RsaKey(_) => ids::RSA_KEY,
            Value::AesKey(_) => ids::AES_KEY,
            Value::I32(_) => ids::I32,
            Value::I64(_) => ids::I64,
            Value::F32(_) => ids::F32,
            Value::F64(_) => ids::F64,
        };
        self.get(id)
    }
}

impl Default for DatatypeRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_round_trip() {
        let dt = StringType;
        let bytes = dt.encode(&Value::from("héllo")).unwrap();
        assert_eq!(dt.decode(&bytes).unwrap(), Value::from("héllo"));
    }

    #[test]
    fn string_rejects_bad_utf8() {
        assert!(matches!(
            StringType.decode(&[0xFF, 0xFE]),
            Err(DecodingError::InvalidFieldData { .. })
        ));
    }

    #[test]
    fn instant_round_trip() {
        let t = WireInstant {
            secs: 1_700_000_000,
            nanos: 123_456_789,
        };
        let bytes = InstantType.encode(&Value::Instant(t)).unwrap();
        assert_eq!(bytes.len(), 12);
        assert_eq!(InstantType.decode(&bytes).unwrap(), Value::Instant(t));
    }

    #[test]
    fn instant_rejects_wrong_width() {
        assert!(InstantType.decode(&[0u8; 11]).is_err());
    }

    #[test]
    fn scalars_are_big_endian_on_the_wire() {
        let bytes = I32Type.encode(&Value::I32(1)).unwrap();
        assert_eq!(&bytes[..], &[0, 0, 0, 1]);

        let bytes = F64Type.encode(&Value::F64(1.5)).unwrap();
        assert_eq!(F64Type.decode(&bytes).unwrap(), Value::F64(1.5));
    }

    #[test]
    fn wrong_value_kind_is_a_typed_error() {
        assert!(matches!(
            I32Type.encode(&Value::from("nope")),
            Err(EncodingError::ValueMismatch {
                datatype: "i32",
                actual: "string",
            })
        ));
    }

    #[test]
    fn unknown_id_falls_back_to_blob() {
        let reg = DatatypeRegistry::standard();
        let dt = reg.get(9999);
        assert_eq!(dt.id(), ids::BLOB);
        assert_eq!(
            dt.decode(b"anything").unwrap(),
            Value::Blob(bytes::Bytes::from_static(b"anything"))
        );
    }

    #[test]
    fn for_value_picks_matching_id() {
        let reg = DatatypeRegistry::standard();
        assert_eq!(reg.for_value(&Value::from("x")).id(), ids::STRING);
        assert_eq!(reg.for_value(&Value::I64(7)).id(), ids::I64);
    }
}
