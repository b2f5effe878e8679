//! AES-256-CBC encryption with PKCS7 padding
//!
//! The CBC IV is fixed at all zeroes: every AES key in the hybrid scheme is
//! generated fresh for a single payload, so the IV never repeats under one
//! key. Keys shorter or longer than 256 bits are normalized by truncating
//! or zero-extending on the right.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::{CryptoError, CryptoResult};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Number of bytes in an AES key.
pub const AES_KEY_SIZE: usize = 32;

/// Generates a fresh 256-bit key from OS entropy.
pub fn random_key() -> [u8; AES_KEY_SIZE] {
    let mut key = [0u8; AES_KEY_SIZE];
    OsRng.fill_bytes(&mut key);
    key
}

/// Truncate or zero-extend arbitrary key material to exactly 256 bits.
fn normalize_key(key: &[u8]) -> [u8; AES_KEY_SIZE] {
    let mut out = [0u8; AES_KEY_SIZE];
    let n = key.len().min(AES_KEY_SIZE);
    out[..n].copy_from_slice(&key[..n]);
    out
}

/// Encrypts `plaintext` under `key` using AES-256-CBC with PKCS7 padding.
pub fn aes_encrypt(key: &[u8], plaintext: &[u8]) -> Vec<u8> {
    let key = normalize_key(key);
    let iv = [0u8; 16];
    Aes256CbcEnc::new(&key.into(), &iv.into()).encrypt_padded_vec_mut::<Pkcs7>(plaintext)
}

/// Decrypts an [`aes_encrypt`] ciphertext.
///
/// A wrong key almost always surfaces here as a padding failure, which is
/// reported as [`CryptoError::InvalidCiphertext`].
pub fn aes_decrypt(key: &[u8], ciphertext: &[u8]) -> CryptoResult<Vec<u8>> {
    let key = normalize_key(key);
    let iv = [0u8; 16];
    Aes256CbcDec::new(&key.into(), &iv.into())
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| CryptoError::invalid_ciphertext("AES-CBC padding check failed"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let key = random_key();
        let plaintext = b"Top Secret Message!";

        let ciphertext = aes_encrypt(&key, plaintext);
        assert_ne!(&ciphertext[..], &plaintext[..]);

        let recovered = aes_decrypt(&key, &ciphertext).unwrap();
        assert_eq!(recovered, plaintext);
    }

    #[test]
    fn empty_plaintext_round_trip() {
        let key = random_key();
        let ciphertext = aes_encrypt(&key, b"");
        // PKCS7 always emits at least one full block.
        assert_eq!(ciphertext.len(), 16);
        assert_eq!(aes_decrypt(&key, &ciphertext).unwrap(), b"");
    }

    #[test]
    fn short_key_is_normalized() {
        let ciphertext = aes_encrypt(b"Secret Key", b"hello");
        assert_eq!(aes_decrypt(b"Secret Key", &ciphertext).unwrap(), b"hello");
    }

    #[test]
    fn wrong_key_fails() {
        let ciphertext = aes_encrypt(&random_key(), b"hello");
        let result = aes_decrypt(&random_key(), &ciphertext);
        // Either a padding error or (rarely) garbage that happens to unpad;
        // it must never silently yield the original plaintext.
        if let Ok(recovered) = result {
            assert_ne!(recovered, b"hello");
        }
    }

    #[test]
    fn truncated_ciphertext_fails() {
        let key = random_key();
        let ciphertext = aes_encrypt(&key, b"hello world");
        assert!(aes_decrypt(&key, &ciphertext[..ciphertext.len() - 1]).is_err());
    }
}
