//! Certificates issued by an authority
//!
//! A certificate is the subject's encoded public key hybrid-encrypted
//! under the authority's *private* exponent. Anyone holding the
//! authority's public key can open it and compare against the subject key
//! they were handed; a match proves the authority blessed exactly that
//! key.

use bytes::Bytes;
use crypto::{encode_public_key, rsa_decrypt, RawRsaKey, RsaPublicKey};

#[derive(Debug, Clone)]
pub struct Certificate {
    subject: RsaPublicKey,
    token: Bytes,
}

/// A named peer: who they claim to be, their key, and the authority's
/// blessing of that key. This is what application layers pass around when
/// introducing peers to each other.
#[derive(Debug, Clone)]
pub struct Identity {
    pub username: String,
    pub certificate: Certificate,
}

impl Identity {
    pub fn new(username: impl Into<String>, certificate: Certificate) -> Self {
        Self {
            username: username.into(),
            certificate,
        }
    }

    pub fn public_key(&self) -> &RsaPublicKey {
        self.certificate.subject()
    }

    /// Whether the claimed key is blessed by `authority`. Says nothing
    /// about the username; binding names to keys is application policy.
    pub fn verify(&self, authority: &RsaPublicKey) -> bool {
        self.certificate.verify(authority)
    }
}

impl Certificate {
    pub fn new(subject: RsaPublicKey, token: Bytes) -> Self {
        Self { subject, token }
    }

    /// The key this certificate vouches for.
    pub fn subject(&self) -> &RsaPublicKey {
        &self.subject
    }

    /// The opaque blessing; what actually travels with the subject key.
    pub fn token(&self) -> &Bytes {
        &self.token
    }

    /// Checks the token against the authority's public key.
    ///
    /// `false` covers every failure: wrong authority, tampered token, or
    /// a token issued for a different subject.
    pub fn verify(&self, authority: &RsaPublicKey) -> bool {
        match rsa_decrypt(&self.token, &RawRsaKey::from(authority)) {
            Ok(opened) => opened == encode_public_key(&self.subject),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crypto::{rsa_encrypt, RsaKeyPair};
    use once_cell::sync::Lazy;

    static CA: Lazy<RsaKeyPair> =
        Lazy::new(|| RsaKeyPair::generate_with_bits(2048).expect("keygen"));
    static SUBJECT: Lazy<RsaKeyPair> =
        Lazy::new(|| RsaKeyPair::generate_with_bits(2048).expect("keygen"));

    fn issue(subject: &RsaPublicKey) -> Certificate {
        let token = rsa_encrypt(
            &encode_public_key(subject),
            &RawRsaKey::from(CA.private()),
        )
        .unwrap();
        Certificate::new(subject.clone(), Bytes::from(token))
    }

    #[test]
    fn issued_certificate_verifies() {
        assert!(issue(SUBJECT.public()).verify(CA.public()));
    }

    #[test]
    fn wrong_authority_fails() {
        let other = RsaKeyPair::generate_with_bits(2048).unwrap();
        assert!(!issue(SUBJECT.public()).verify(other.public()));
    }

    #[test]
    fn tampered_token_fails() {
        let cert = issue(SUBJECT.public());
        let mut token = cert.token().to_vec();
        let last = token.len() - 1;
        token[last] ^= 0x01;
        let forged = Certificate::new(SUBJECT.public().clone(), Bytes::from(token));
        assert!(!forged.verify(CA.public()));
    }

    #[test]
    fn substituted_subject_fails() {
        let cert = issue(SUBJECT.public());
        let swapped = Certificate::new(CA.public().clone(), cert.token().clone());
        assert!(!swapped.verify(CA.public()));
    }
}
