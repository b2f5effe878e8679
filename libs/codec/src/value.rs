//! Native value representation of message fields

use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use crypto::RsaPublicKey;

/// A point in time as it travels on the wire: whole seconds since the Unix
/// epoch plus a nanosecond remainder. Serialized as `[i64 secs][i32 nanos]`,
/// always big-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireInstant {
    pub secs: i64,
    pub nanos: i32,
}

impl WireInstant {
    pub const EPOCH: WireInstant = WireInstant { secs: 0, nanos: 0 };

    /// Wire width in bytes.
    pub const WIDTH: usize = 12;

    /// Captures the current system time.
    pub fn now() -> Self {
        // A pre-1970 clock degrades to the epoch rather than failing.
        match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(d) => Self {
                secs: d.as_secs() as i64,
                nanos: d.subsec_nanos() as i32,
            },
            Err(_) => Self::EPOCH,
        }
    }
}

/// Decoded (native-side) contents of a message field.
///
/// Each variant corresponds to one wire datatype id; the codec picks the
/// datatype from the variant when building outgoing fields.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Opaque bytes, also the fallback for unknown datatype ids
    Blob(Bytes),
    /// UTF-8 text
    Text(String),
    /// A timestamp
    Instant(WireInstant),
    /// An encoded RSA public key
    RsaKey(RsaPublicKey),
    /// Raw AES key material
    AesKey(Bytes),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
}

impl Value {
    /// Human-readable kind name, used in error reporting.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Blob(_) => "blob",
            Value::Text(_) => "string",
            Value::Instant(_) => "instant",
            Value::RsaKey(_) => "rsa-key",
            Value::AesKey(_) => "aes-key",
            Value::I32(_) => "i32",
            Value::I64(_) => "i64",
            Value::F32(_) => "f32",
            Value::F64(_) => "f64",
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Blob(Bytes::from(b))
    }
}

impl From<&[u8]> for Value {
    fn from(b: &[u8]) -> Self {
        Value::Blob(Bytes::copy_from_slice(b))
    }
}

impl From<WireInstant> for Value {
    fn from(i: WireInstant) -> Self {
        Value::Instant(i)
    }
}

impl From<&RsaPublicKey> for Value {
    fn from(k: &RsaPublicKey) -> Self {
        Value::RsaKey(k.clone())
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::I32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::I64(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::F32(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::F64(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_is_past_2020() {
        let now = WireInstant::now();
        assert!(now.secs > 1_577_836_800); // 2020-01-01
        assert!(now.nanos >= 0 && now.nanos < 1_000_000_000);
    }

    #[test]
    fn kind_names_are_stable() {
        assert_eq!(Value::from("x").kind(), "string");
        assert_eq!(Value::from(vec![1u8]).kind(), "blob");
        assert_eq!(Value::from(WireInstant::EPOCH).kind(), "instant");
    }
}
