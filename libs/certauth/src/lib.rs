//! # Aeris Certificate Authority
//!
//! ## Purpose
//!
//! The trust-bootstrap layer: a [`CertAuthHost`] distributes its public
//! key and certifies requester keys; a [`CertAuthClient`] fetches the
//! authority key and requests certification. A [`Certificate`] is the
//! requester's encoded public key encrypted under the authority's private
//! exponent, verifiable by anyone who trusts the authority's public key.
//!
//! ## Architecture Role
//!
//! ```text
//! applications → [certauth] → transport → codec → crypto
//! ```
//!
//! ## Trust Model
//!
//! Possession of the authority's private key is the only secret. The
//! authority key itself is distributed in the clear; deployments that
//! need a stronger bootstrap pin it out of band and use the distribution
//! path as a convenience, gated by verification checks.

pub mod certificate;
pub mod client;
pub mod error;
pub mod host;

pub use crate::certificate::{Certificate, Identity};
pub use crate::client::{CertAuthClient, RequestHook, DEFAULT_TIMEOUT};
pub use crate::error::{CertAuthError, Result};
pub use crate::host::{CertAuthHost, Check};

/// First field of a key-distribution request.
pub const DIST_REQUEST: &str = "SC-DIST-0001";
/// First field of a certification request.
pub const CERT_REQUEST: &str = "SC-CERT-0001";
/// First field of a positive authority answer.
pub const CA_ACCEPT: &str = "SC-CA-ACCEPT";
/// First field of a negative authority answer.
pub const CA_REJECT: &str = "SC-CA-REJECT";

/// Standard authority port.
pub const DEFAULT_PORT: u16 = 777;

/// Reads an RSA public key out of a message field.
///
/// The protocol carries keys as blobs of their magic-guarded encoding,
/// but a typed rsa-key field is accepted too.
pub(crate) fn key_from_field(field: &codec::Field) -> error::Result<crypto::RsaPublicKey> {
    match field.value()? {
        codec::Value::RsaKey(key) => Ok(key.clone()),
        codec::Value::Blob(bytes) => Ok(crypto::decode_public_key(bytes)?),
        other => Err(error::CertAuthError::invalid_response(format!(
            "expected a public key field, found {}",
            other.kind()
        ))),
    }
}
