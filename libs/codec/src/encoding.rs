//! Field encodings: payload bytes <-> wire bytes
//!
//! An encoding is the *outer* half of the field pipeline. The cryptographic
//! ones pull key material from the message's [`MetaSpace`] at call time;
//! a missing slot is a typed error, never a silent passthrough.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use tracing::warn;

use crate::error::{DecodeResult, DecodingError, EncodeResult, EncodingError};
use crate::metaspace::{KeySlot, MetaSpace};
use crypto::{aes_decrypt, aes_encrypt, rsa_decrypt, rsa_encrypt, RawRsaKey};

/// Wire ids of the standard encodings.
pub mod ids {
    pub const PLAIN: u16 = 0;
    pub const DEFLATE: u16 = 1;
    pub const RSA_ENCRYPT: u16 = 2;
    pub const RSA_SIGN: u16 = 3;
    pub const AES: u16 = 4;
}

/// A reversible transform applied to a field's payload bytes.
pub trait Encoding: Send + Sync {
    fn id(&self) -> u16;
    fn name(&self) -> &'static str;
    fn encode(&self, payload: &[u8], meta: &MetaSpace) -> EncodeResult<Bytes>;
    fn decode(&self, wire: &[u8], meta: &MetaSpace) -> DecodeResult<Bytes>;
}

/// Identity transform. Also the fallback for unrecognized encoding ids.
pub struct PlainEncoding;

impl Encoding for PlainEncoding {
    fn id(&self) -> u16 {
        ids::PLAIN
    }

    fn name(&self) -> &'static str {
        "plain"
    }

    fn encode(&self, payload: &[u8], _meta: &MetaSpace) -> EncodeResult<Bytes> {
        Ok(Bytes::copy_from_slice(payload))
    }

    fn decode(&self, wire: &[u8], _meta: &MetaSpace) -> DecodeResult<Bytes> {
        Ok(Bytes::copy_from_slice(wire))
    }
}

/// Reserved compression slot. The id is pinned for wire compatibility but
/// the transform has always been the identity; peers negotiate nothing.
pub struct DeflateEncoding;

impl Encoding for DeflateEncoding {
    fn id(&self) -> u16 {
        ids::DEFLATE
    }

    fn name(&self) -> &'static str {
        "deflate"
    }

    fn encode(&self, payload: &[u8], _meta: &MetaSpace) -> EncodeResult<Bytes> {
        Ok(Bytes::copy_from_slice(payload))
    }

    fn decode(&self, wire: &[u8], _meta: &MetaSpace) -> DecodeResult<Bytes> {
        Ok(Bytes::copy_from_slice(wire))
    }
}

/// Confidentiality toward the remote peer: encrypts under their public key,
/// decrypts with our own private key.
pub struct RsaEncryptEncoding;

impl Encoding for RsaEncryptEncoding {
    fn id(&self) -> u16 {
        ids::RSA_ENCRYPT
    }

    fn name(&self) -> &'static str {
        "rsa-encrypt"
    }

    fn encode(&self, payload: &[u8], meta: &MetaSpace) -> EncodeResult<Bytes> {
        let key = meta.rsa_extern().ok_or(EncodingError::MissingKey {
            slot: KeySlot::RsaExtern,
        })?;
        Ok(Bytes::from(rsa_encrypt(payload, &RawRsaKey::from(key))?))
    }

    fn decode(&self, wire: &[u8], meta: &MetaSpace) -> DecodeResult<Bytes> {
        let pair = meta.rsa_self().ok_or(DecodingError::MissingKey {
            slot: KeySlot::RsaSelf,
        })?;
        Ok(Bytes::from(rsa_decrypt(
            wire,
            &RawRsaKey::from(pair.private()),
        )?))
    }
}

/// Authenticity of the sender: encrypts under our own private key so that
/// anyone holding our public key can open (and thereby verify) it.
pub struct RsaSignEncoding;

impl Encoding for RsaSignEncoding {
    fn id(&self) -> u16 {
        ids::RSA_SIGN
    }

    fn name(&self) -> &'static str {
        "rsa-sign"
    }

    fn encode(&self, payload: &[u8], meta: &MetaSpace) -> EncodeResult<Bytes> {
        let pair = meta.rsa_self().ok_or(EncodingError::MissingKey {
            slot: KeySlot::RsaSelf,
        })?;
        Ok(Bytes::from(rsa_encrypt(
            payload,
            &RawRsaKey::from(pair.private()),
        )?))
    }

    fn decode(&self, wire: &[u8], meta: &MetaSpace) -> DecodeResult<Bytes> {
        let key = meta.rsa_extern().ok_or(DecodingError::MissingKey {
            slot: KeySlot::RsaExtern,
        })?;
        Ok(Bytes::from(rsa_decrypt(wire, &RawRsaKey::from(key))?))
    }
}

/// Symmetric encryption under the shared AES key, both directions.
pub struct AesEncoding;

impl Encoding for AesEncoding {
    fn id(&self) -> u16 {
        ids::AES
    }

    fn name(&self) -> &'static str {
        "aes"
    }

    fn encode(&self, payload: &[u8], meta: &MetaSpace) -> EncodeResult<Bytes> {
        let key = meta
            .aes()
            .ok_or(EncodingError::MissingKey { slot: KeySlot::Aes })?;
        Ok(Bytes::from(aes_encrypt(key, payload)))
    }

    fn decode(&self, wire: &[u8], meta: &MetaSpace) -> DecodeResult<Bytes> {
        let key = meta
            .aes()
            .ok_or(DecodingError::MissingKey { slot: KeySlot::Aes })?;
        Ok(Bytes::from(aes_decrypt(key, wire)?))
    }
}

/// Id-indexed encoding table.
///
/// Unknown ids resolve to [`PlainEncoding`] with a warning, matching the
/// datatype registry's fallback policy.
pub struct EncodingRegistry {
    by_id: HashMap<u16, Arc<dyn Encoding>>,
    fallback: Arc<dyn Encoding>,
}

impl EncodingRegistry {
    /// Empty registry with only the plain fallback.
    pub fn new() -> Self {
        Self {
            by_id: HashMap::new(),
            fallback: Arc::new(PlainEncoding),
        }
    }

    /// All standard encodings registered.
    pub fn standard() -> Self {
        let mut reg = Self::new();
        reg.register(Arc::new(PlainEncoding));
        reg.register(Arc::new(DeflateEncoding));
        reg.register(Arc::new(RsaEncryptEncoding));
        reg.register(Arc::new(RsaSignEncoding));
        reg.register(Arc::new(AesEncoding));
        reg
    }

    /// Registers (or replaces) an encoding under its own id.
    pub fn register(&mut self, encoding: Arc<dyn Encoding>) {
        self.by_id.insert(encoding.id(), encoding);
    }

    /// Resolves an id, falling back to plain for anything unknown.
    pub fn get(&self, id: u16) -> Arc<dyn Encoding> {
        match self.by_id.get(&id) {
            Some(enc) => Arc::clone(enc),
            None => {
                warn!(encoding_id = id, "unknown encoding id, passing bytes through unchanged");
                Arc::clone(&self.fallback)
            }
        }
    }
}

impl Default for EncodingRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crypto::RsaKeyPair;
    use once_cell::sync::Lazy;

    static KEY: Lazy<RsaKeyPair> =
        Lazy::new(|| RsaKeyPair::generate_with_bits(2048).expect("keygen"));

    #[test]
    fn aes_round_trip_through_metaspace() {
        let meta = MetaSpace::new().with_aes(crypto::random_key().to_vec());
        let wire = AesEncoding.encode(b"payload", &meta).unwrap();
        assert_ne!(&wire[..], b"payload");
        assert_eq!(&AesEncoding.decode(&wire, &meta).unwrap()[..], b"payload");
    }

    #[test]
    fn aes_without_key_is_typed_error() {
        let meta = MetaSpace::new();
        assert!(matches!(
            AesEncoding.encode(b"x", &meta),
            Err(EncodingError::MissingKey { slot: KeySlot::Aes })
        ));
        assert!(matches!(
            AesEncoding.decode(b"x", &meta),
            Err(DecodingError::MissingKey { slot: KeySlot::Aes })
        ));
    }

    #[test]
    fn rsa_encrypt_crosses_a_keypair() {
        // Sender knows the recipient's public key...
        let sender = MetaSpace::new().with_rsa_extern(KEY.public().clone());
        let wire = RsaEncryptEncoding.encode(b"for your eyes", &sender).unwrap();

        // ...recipient opens it with their own pair.
        let recipient = MetaSpace::new().with_rsa_self(KEY.clone());
        assert_eq!(
            &RsaEncryptEncoding.decode(&wire, &recipient).unwrap()[..],
            b"for your eyes"
        );
    }

    #[test]
    fn rsa_sign_opens_with_the_public_key() {
        let signer = MetaSpace::new().with_rsa_self(KEY.clone());
        let wire = RsaSignEncoding.encode(b"it was me", &signer).unwrap();

        let verifier = MetaSpace::new().with_rsa_extern(KEY.public().clone());
        assert_eq!(
            &RsaSignEncoding.decode(&wire, &verifier).unwrap()[..],
            b"it was me"
        );
    }

    #[test]
    fn unknown_id_falls_back_to_plain() {
        let reg = EncodingRegistry::standard();
        let enc = reg.get(555);
        assert_eq!(enc.id(), ids::PLAIN);
    }
}
