//! Out-of-band key material attached to a message
//!
//! Encodings that need cryptographic keys look them up here by slot at the
//! moment a field is encoded or decoded, never from process-wide state. A
//! missing slot is a hard, typed error: encodings never fall back to a
//! weaker operation when a key is absent.

use std::collections::HashMap;
use std::fmt;

use crypto::{RsaKeyPair, RsaPublicKey};

/// Well-known key slots consulted by the standard encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeySlot {
    /// This peer's own keypair (signing, decrypting traffic sent to us)
    RsaSelf,
    /// The remote peer's public key (encrypting to them, checking their
    /// signatures)
    RsaExtern,
    /// A shared symmetric key
    Aes,
}

impl fmt::Display for KeySlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            KeySlot::RsaSelf => "rsa-self",
            KeySlot::RsaExtern => "rsa-extern",
            KeySlot::Aes => "aes",
        };
        f.write_str(name)
    }
}

/// Key material occupying a slot.
#[derive(Debug, Clone)]
pub enum KeyMaterial {
    RsaPair(RsaKeyPair),
    RsaPublic(RsaPublicKey),
    Aes(Vec<u8>),
}

/// Per-message key context.
///
/// Plain data with owned keys; shared between a message and its fields
/// behind an `Arc<RwLock<_>>` so keys attached after parsing are visible to
/// every lazily-decoded field.
#[derive(Debug, Clone, Default)]
pub struct MetaSpace {
    slots: HashMap<KeySlot, KeyMaterial>,
}

impl MetaSpace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores this peer's own keypair.
    pub fn set_rsa_self(&mut self, pair: RsaKeyPair) -> &mut Self {
        self.slots.insert(KeySlot::RsaSelf, KeyMaterial::RsaPair(pair));
        self
    }

    /// Stores the remote peer's public key.
    pub fn set_rsa_extern(&mut self, key: RsaPublicKey) -> &mut Self {
        self.slots
            .insert(KeySlot::RsaExtern, KeyMaterial::RsaPublic(key));
        self
    }

    /// Stores a shared symmetric key.
    pub fn set_aes(&mut self, key: impl Into<Vec<u8>>) -> &mut Self {
        self.slots.insert(KeySlot::Aes, KeyMaterial::Aes(key.into()));
        self
    }

    /// Builder-style variants for constructing a context in one expression.
    pub fn with_rsa_self(mut self, pair: RsaKeyPair) -> Self {
        self.set_rsa_self(pair);
        self
    }

    pub fn with_rsa_extern(mut self, key: RsaPublicKey) -> Self {
        self.set_rsa_extern(key);
        self
    }

    pub fn with_aes(mut self, key: impl Into<Vec<u8>>) -> Self {
        self.set_aes(key);
        self
    }

    /// This peer's keypair, if present with the right shape.
    pub fn rsa_self(&self) -> Option<&RsaKeyPair> {
        match self.slots.get(&KeySlot::RsaSelf) {
            Some(KeyMaterial::RsaPair(pair)) => Some(pair),
            _ => None,
        }
    }

    /// The remote peer's public key, if present with the right shape.
    pub fn rsa_extern(&self) -> Option<&RsaPublicKey> {
        match self.slots.get(&KeySlot::RsaExtern) {
            Some(KeyMaterial::RsaPublic(key)) => Some(key),
            _ => None,
        }
    }

    /// The shared symmetric key, if present with the right shape.
    pub fn aes(&self) -> Option<&[u8]> {
        match self.slots.get(&KeySlot::Aes) {
            Some(KeyMaterial::Aes(key)) => Some(key.as_slice()),
            _ => None,
        }
    }

    pub fn contains(&self, slot: KeySlot) -> bool {
        self.slots.contains_key(&slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_slots_are_none() {
        let meta = MetaSpace::new();
        assert!(meta.rsa_self().is_none());
        assert!(meta.rsa_extern().is_none());
        assert!(meta.aes().is_none());
    }

    #[test]
    fn aes_slot_round_trip() {
        let meta = MetaSpace::new().with_aes(vec![7u8; 32]);
        assert_eq!(meta.aes().unwrap(), &[7u8; 32][..]);
        assert!(meta.contains(KeySlot::Aes));
        assert!(!meta.contains(KeySlot::RsaSelf));
    }
}
