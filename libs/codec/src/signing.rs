//! Message signatures
//!
//! The signature covers a 20-byte digest: a CRC32 of every field's encoded
//! bytes (in field order, widened to u64) followed by the signing
//! timestamp. The digest is hybrid-encrypted under the signer's *private*
//! exponent, so anyone holding the signer's public key can open it and
//! compare. CRC32 is an integrity check against a holder of the private
//! key's blessing, not collision resistance; the trust model assumes the
//! private key is what's being proven.

use byteorder::{BigEndian, ByteOrder};
use bytes::Bytes;

use crate::error::{EncodeResult, EncodingError};
use crate::message::Message;
use crate::metaspace::KeySlot;
use crate::value::WireInstant;
use crypto::{rsa_decrypt, rsa_encrypt, RawRsaKey, RsaPublicKey};

/// CRC (u64) + signing time (i64 secs + i32 nanos).
const DIGEST_LEN: usize = 20;

impl Message {
    /// Digest of the current field contents and signing time.
    fn digest(&self) -> EncodeResult<[u8; DIGEST_LEN]> {
        let mut hasher = crc32fast::Hasher::new();
        for field in self.fields() {
            hasher.update(&field.encoded()?);
        }
        let mut out = [0u8; DIGEST_LEN];
        BigEndian::write_u64(&mut out[..8], hasher.finalize() as u64);
        BigEndian::write_i64(&mut out[8..16], self.signing_time().secs);
        BigEndian::write_i32(&mut out[16..], self.signing_time().nanos);
        Ok(out)
    }

    /// Signs the message with the keypair in the [`KeySlot::RsaSelf`]
    /// slot, refreshing the signing time. Parsed messages cannot be
    /// re-signed.
    pub fn sign(&mut self) -> EncodeResult<&mut Self> {
        if self.is_read_only() {
            return Err(EncodingError::ReadOnly);
        }
        let pair = self
            .meta()
            .read()
            .rsa_self()
            .cloned()
            .ok_or(EncodingError::MissingKey {
                slot: KeySlot::RsaSelf,
            })?;
        self.set_signing_time(WireInstant::now());
        let digest = self.digest()?;
        self.signature = Bytes::from(rsa_encrypt(&digest, &RawRsaKey::from(pair.private()))?);
        Ok(self)
    }

    /// Checks the signature against a purported signer's public key.
    ///
    /// Returns `false` for unsigned messages, tampered fields, a stale
    /// digest, or the wrong key; it never errors, because a bad signature
    /// on a hostile wire is an answer, not a fault.
    pub fn validate(&self, signer: &RsaPublicKey) -> bool {
        if self.signature.is_empty() {
            return false;
        }
        let Ok(expected) = self.digest() else {
            return false;
        };
        let Ok(opened) = rsa_decrypt(&self.signature, &RawRsaKey::from(signer)) else {
            return false;
        };
        opened == expected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metaspace::MetaSpace;
    use crate::value::Value;
    use crypto::RsaKeyPair;
    use once_cell::sync::Lazy;

    static KEY: Lazy<RsaKeyPair> =
        Lazy::new(|| RsaKeyPair::generate_with_bits(2048).expect("keygen"));

    fn signed_message() -> Message {
        let mut msg = Message::of(["attack at dawn"]).unwrap();
        msg.set_meta_space(MetaSpace::new().with_rsa_self(KEY.clone()));
        msg.sign().unwrap();
        msg
    }

    #[test]
    fn signature_survives_the_wire() {
        let wire = signed_message().to_bytes().unwrap();
        let parsed = Message::parse(&wire).unwrap();
        assert!(parsed.is_signed());
        assert!(parsed.validate(KEY.public()));
    }

    #[test]
    fn unsigned_message_never_validates() {
        let msg = Message::of(["plain"]).unwrap();
        assert!(!msg.validate(KEY.public()));
    }

    #[test]
    fn signing_without_a_keypair_is_typed() {
        let mut msg = Message::of(["x"]).unwrap();
        assert!(matches!(
            msg.sign(),
            Err(EncodingError::MissingKey {
                slot: KeySlot::RsaSelf,
            })
        ));
    }

    #[test]
    fn tampered_payload_fails_validation() {
        let wire = signed_message().to_bytes().unwrap();
        let mut wire = wire.to_vec();
        let last = wire.len() - 1;
        wire[last] ^= 0xFF;
        let parsed = Message::parse(&wire).unwrap();
        assert!(!parsed.validate(KEY.public()));
    }

    #[test]
    fn wrong_key_fails_validation() {
        let other = RsaKeyPair::generate_with_bits(2048).unwrap();
        let wire = signed_message().to_bytes().unwrap();
        let parsed = Message::parse(&wire).unwrap();
        assert!(!parsed.validate(other.public()));
    }

    #[test]
    fn out_of_range_field_mut_keeps_the_signature() {
        let mut msg = signed_message();
        assert!(msg.field_mut(99).unwrap().is_none());
        assert!(msg.is_signed());
        assert!(msg.validate(KEY.public()));

        // A resolving index still voids it.
        let field = msg.field_mut(0).unwrap().expect("field 0 exists");
        field.set_value(Value::from("retreat at dusk"));
        assert!(!msg.is_signed());
    }

    #[test]
    fn mutation_voids_the_signature() {
        let mut msg = signed_message();
        assert!(msg.is_signed());
        msg.add(Value::I32(1)).unwrap();
        assert!(!msg.is_signed());
        assert!(!msg.validate(KEY.public()));

        // Re-signing covers the new field.
        msg.sign().unwrap();
        let parsed = Message::parse(&msg.to_bytes().unwrap()).unwrap();
        assert!(parsed.validate(KEY.public()));
    }
}
