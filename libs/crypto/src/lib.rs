//! # Aeris Cryptographic Primitives
//!
//! ## Purpose
//!
//! This crate contains the "keys and ciphers" layer of the Aeris system:
//! - AES-256-CBC symmetric encryption with PKCS7 padding
//! - The raw-RSA hybrid scheme used for field encryption and message signing
//! - The byte-level encoding of RSA public keys exchanged on the wire
//!
//! ## Architecture Role
//!
//! ```text
//! codec (field encodings, signer) → [crypto] → rsa / aes / cbc crates
//!            ↑                          ↓
//!     MetaSpace key slots        RawRsaKey, hybrid blocks
//! ```
//!
//! ## Hybrid scheme
//!
//! Every asymmetric operation wraps a single-use random AES key:
//! `[u32 rsa block len][raw-RSA(aes key)][AES-CBC(magic || payload)]`.
//! The raw RSA operation is plain modular exponentiation over either half
//! of the keypair, which is what lets the same code path realize both
//! "encrypt to recipient" (public exponent) and "sign" (private exponent)
//! semantics. This is intentionally not PKCS#1: changing it changes the
//! wire format and the trust model.
//!
//! ## What This Crate Does NOT Contain
//! - Wire message framing (belongs in codec)
//! - Key distribution or certification policy (belongs in certauth)

pub mod aes;
pub mod error;
pub mod rsa;

pub use crate::aes::{aes_decrypt, aes_encrypt, random_key, AES_KEY_SIZE};
pub use crate::error::{CryptoError, CryptoResult};
pub use crate::rsa::{
    decode_public_key, encode_public_key, rsa_decrypt, rsa_encrypt, RawRsaKey, RsaKeyPair,
    RSA_MAGIC,
};

// Re-export the key types callers hold on to.
pub use ::rsa::{RsaPrivateKey, RsaPublicKey};
