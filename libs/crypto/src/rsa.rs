//! Raw-RSA hybrid encryption and public key byte-encoding
//!
//! The asymmetric operation here is plain modular exponentiation
//! (`block ^ exponent mod n`) over a single-use AES key, not a PKCS#1
//! scheme. Either half of a keypair can drive it: the public exponent
//! realizes "encrypt to recipient", the private exponent realizes the
//! signing direction used by the message signer. Changing this to a padded
//! scheme would break wire compatibility and the trust model, so don't.
//!
//! Encoded keys and hybrid blocks are both guarded by the `SC-RSA-0001`
//! magic so that feeding arbitrary bytes to the decoder fails loudly
//! instead of yielding a garbage key.

use rand::rngs::OsRng;
use rsa::traits::{PrivateKeyParts, PublicKeyParts};
use rsa::{BigUint, RsaPrivateKey, RsaPublicKey};

use crate::aes::{aes_decrypt, aes_encrypt, random_key, AES_KEY_SIZE};
use crate::error::{CryptoError, CryptoResult};

/// Magic prefix for encoded keys and hybrid ciphertext plaintext blocks.
pub const RSA_MAGIC: &[u8] = b"SC-RSA-0001";

/// Default modulus size for generated keypairs.
const DEFAULT_KEY_BITS: usize = 4096;

/// An RSA keypair held by this peer.
#[derive(Debug, Clone)]
pub struct RsaKeyPair {
    public: RsaPublicKey,
    private: RsaPrivateKey,
}

impl RsaKeyPair {
    /// Generates a brand new 4096-bit keypair.
    ///
    /// **WARNING**: computationally expensive; run it off the hot path.
    pub fn generate() -> CryptoResult<Self> {
        Self::generate_with_bits(DEFAULT_KEY_BITS)
    }

    /// Generates a keypair with an explicit modulus size.
    pub fn generate_with_bits(bits: usize) -> CryptoResult<Self> {
        let private = RsaPrivateKey::new(&mut OsRng, bits)?;
        let public = private.to_public_key();
        Ok(Self { public, private })
    }

    pub fn from_parts(public: RsaPublicKey, private: RsaPrivateKey) -> Self {
        Self { public, private }
    }

    pub fn public(&self) -> &RsaPublicKey {
        &self.public
    }

    pub fn private(&self) -> &RsaPrivateKey {
        &self.private
    }
}

/// One exponent/modulus half of a keypair, usable as either direction of
/// the raw RSA operation.
#[derive(Debug, Clone)]
pub struct RawRsaKey {
    exponent: BigUint,
    modulus: BigUint,
}

impl RawRsaKey {
    /// Applies `block ^ exponent mod modulus` to a big-endian block.
    fn process(&self, block: &[u8]) -> CryptoResult<Vec<u8>> {
        let m = BigUint::from_bytes_be(block);
        if m >= self.modulus {
            return Err(CryptoError::BlockTooLarge {
                block_bytes: block.len(),
                modulus_bits: self.modulus.bits(),
            });
        }
        Ok(m.modpow(&self.exponent, &self.modulus).to_bytes_be())
    }
}

impl From<&RsaPublicKey> for RawRsaKey {
    fn from(key: &RsaPublicKey) -> Self {
        Self {
            exponent: key.e().clone(),
            modulus: key.n().clone(),
        }
    }
}

impl From<&RsaPrivateKey> for RawRsaKey {
    fn from(key: &RsaPrivateKey) -> Self {
        Self {
            exponent: key.d().clone(),
            modulus: key.n().clone(),
        }
    }
}

impl From<&RsaKeyPair> for RawRsaKey {
    fn from(pair: &RsaKeyPair) -> Self {
        Self::from(pair.private())
    }
}

/// Hybrid-encrypts `data` under `key`.
///
/// Layout: `[u32 rsa block len][raw-RSA(random aes key)][AES-CBC(magic || data)]`.
/// Reversed by [`rsa_decrypt`] with the complementary key half.
pub fn rsa_encrypt(data: &[u8], key: &RawRsaKey) -> CryptoResult<Vec<u8>> {
    let aes_key = random_key();
    let rsa_block = key.process(&aes_key)?;

    let mut plaintext = Vec::with_capacity(RSA_MAGIC.len() + data.len());
    plaintext.extend_from_slice(RSA_MAGIC);
    plaintext.extend_from_slice(data);
    let aes_cipher = aes_encrypt(&aes_key, &plaintext);

    let mut out = Vec::with_capacity(4 + rsa_block.len() + aes_cipher.len());
    out.extend_from_slice(&(rsa_block.len() as u32).to_be_bytes());
    out.extend_from_slice(&rsa_block);
    out.extend_from_slice(&aes_cipher);
    Ok(out)
}

/// Hybrid-decrypts an [`rsa_encrypt`] block.
///
/// Any structural violation, padding failure, or magic mismatch is a
/// [`CryptoError::InvalidCiphertext`]: a wrong key and corrupt bytes are
/// indistinguishable by design.
pub fn rsa_decrypt(data: &[u8], key: &RawRsaKey) -> CryptoResult<Vec<u8>> {
    if data.len() < 4 {
        return Err(CryptoError::invalid_ciphertext(
            "hybrid block shorter than its length prefix",
        ));
    }
    let rsa_len = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
    if rsa_len == 0 || rsa_len > data.len() - 4 {
        return Err(CryptoError::invalid_ciphertext(format!(
            "declared RSA block of {} bytes exceeds {} remaining",
            rsa_len,
            data.len() - 4
        )));
    }
    let rsa_block = &data[4..4 + rsa_len];
    let aes_cipher = &data[4 + rsa_len..];

    // Big-endian round trip strips leading zero bytes; restore them.
    let aes_key = left_pad(&key.process(rsa_block)?, AES_KEY_SIZE);

    let plaintext = aes_decrypt(&aes_key, aes_cipher)?;
    if plaintext.len() < RSA_MAGIC.len() || &plaintext[..RSA_MAGIC.len()] != RSA_MAGIC {
        return Err(CryptoError::invalid_ciphertext(
            "wrong RSA key or data was not produced by this scheme",
        ));
    }
    Ok(plaintext[RSA_MAGIC.len()..].to_vec())
}

fn left_pad(bytes: &[u8], width: usize) -> Vec<u8> {
    if bytes.len() >= width {
        return bytes.to_vec();
    }
    let mut out = vec![0u8; width];
    out[width - bytes.len()..].copy_from_slice(bytes);
    out
}

/// Encodes a public key as `[magic][i32 exp len][i32 mod len][exp][mod]`.
///
/// Reversed by [`decode_public_key`].
pub fn encode_public_key(key: &RsaPublicKey) -> Vec<u8> {
    let exp = key.e().to_bytes_be();
    let modulus = key.n().to_bytes_be();

    let mut out = Vec::with_capacity(RSA_MAGIC.len() + 8 + exp.len() + modulus.len());
    out.extend_from_slice(RSA_MAGIC);
    out.extend_from_slice(&(exp.len() as i32).to_be_bytes());
    out.extend_from_slice(&(modulus.len() as i32).to_be_bytes());
    out.extend_from_slice(&exp);
    out.extend_from_slice(&modulus);
    out
}

/// Decodes an [`encode_public_key`] blob, validating magic and layout.
pub fn decode_public_key(bytes: &[u8]) -> CryptoResult<RsaPublicKey> {
    let header = RSA_MAGIC.len() + 8;
    if bytes.len() < header {
        return Err(CryptoError::invalid_key(format!(
            "need at least {} bytes, got {}",
            header,
            bytes.len()
        )));
    }
    if &bytes[..RSA_MAGIC.len()] != RSA_MAGIC {
        return Err(CryptoError::invalid_key(
            "key was not encoded with this version of the scheme",
        ));
    }

    let mut at = RSA_MAGIC.len();
    let exp_len = i32::from_be_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]);
    at += 4;
    let mod_len = i32::from_be_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]);
    at += 4;

    if exp_len < 1 {
        return Err(CryptoError::invalid_key(format!(
            "non-positive exponent length ({exp_len})"
        )));
    }
    if mod_len < 1 {
        return Err(CryptoError::invalid_key(format!(
            "non-positive modulus length ({mod_len})"
        )));
    }
    let (exp_len, mod_len) = (exp_len as usize, mod_len as usize);
    if bytes.len() - at != exp_len + mod_len {
        return Err(CryptoError::invalid_key(format!(
            "declared {} key bytes, found {}",
            exp_len + mod_len,
            bytes.len() - at
        )));
    }

    let exp = BigUint::from_bytes_be(&bytes[at..at + exp_len]);
    let modulus = BigUint::from_bytes_be(&bytes[at + exp_len..]);
    RsaPublicKey::new(modulus, exp)
        .map_err(|e| CryptoError::invalid_key(format!("rejected key components: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use once_cell::sync::Lazy;

    // Keypair generation dominates test time; share one pair.
    static KEY: Lazy<RsaKeyPair> =
        Lazy::new(|| RsaKeyPair::generate_with_bits(2048).expect("keygen"));

    #[test]
    fn public_key_encoding_round_trip() {
        let encoded = encode_public_key(KEY.public());
        assert!(encoded.starts_with(RSA_MAGIC));

        let decoded = decode_public_key(&encoded).unwrap();
        assert_eq!(&decoded, KEY.public());
    }

    #[test]
    fn corrupt_magic_is_rejected() {
        let mut encoded = encode_public_key(KEY.public());
        encoded[0] ^= 0xFF;
        assert!(matches!(
            decode_public_key(&encoded),
            Err(CryptoError::InvalidKeyEncoding { .. })
        ));
    }

    #[test]
    fn truncated_key_is_rejected() {
        let encoded = encode_public_key(KEY.public());
        assert!(decode_public_key(&encoded[..encoded.len() - 3]).is_err());
    }

    #[test]
    fn hybrid_round_trip_public_to_private() {
        let ciphertext = rsa_encrypt(b"Top Secret Message!", &RawRsaKey::from(KEY.public())).unwrap();
        let plaintext = rsa_decrypt(&ciphertext, &RawRsaKey::from(KEY.private())).unwrap();
        assert_eq!(plaintext, b"Top Secret Message!");
    }

    #[test]
    fn hybrid_round_trip_private_to_public() {
        // The signing direction: encrypt under the private exponent.
        let ciphertext = rsa_encrypt(b"digest bytes", &RawRsaKey::from(KEY.private())).unwrap();
        let plaintext = rsa_decrypt(&ciphertext, &RawRsaKey::from(KEY.public())).unwrap();
        assert_eq!(plaintext, b"digest bytes");
    }

    #[test]
    fn wrong_key_fails_typed() {
        let other = RsaKeyPair::generate_with_bits(2048).unwrap();
        let ciphertext = rsa_encrypt(b"secret", &RawRsaKey::from(KEY.public())).unwrap();
        assert!(matches!(
            rsa_decrypt(&ciphertext, &RawRsaKey::from(other.private())),
            Err(CryptoError::InvalidCiphertext { .. })
        ));
    }

    #[test]
    fn truncated_hybrid_block_fails() {
        let ciphertext = rsa_encrypt(b"secret", &RawRsaKey::from(KEY.public())).unwrap();
        assert!(rsa_decrypt(&ciphertext[..3], &RawRsaKey::from(KEY.private())).is_err());
    }
}
