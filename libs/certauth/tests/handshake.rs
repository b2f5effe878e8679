//! Full authority handshakes over loopback.

use std::net::SocketAddr;
use std::time::Duration;

use certauth::{CertAuthClient, CertAuthError, CertAuthHost};
use codec::Message;
use crypto::RsaKeyPair;
use once_cell::sync::Lazy;
use tokio::sync::oneshot;
use transport::{Host, TransportConfig};

static CA: Lazy<RsaKeyPair> = Lazy::new(|| RsaKeyPair::generate_with_bits(2048).expect("keygen"));
static REQUESTER: Lazy<RsaKeyPair> =
    Lazy::new(|| RsaKeyPair::generate_with_bits(2048).expect("keygen"));

async fn start_authority(authority: CertAuthHost) -> TransportConfig {
    let bound = authority
        .start_at(SocketAddr::from(([127, 0, 0, 1], 0)))
        .await
        .unwrap();
    TransportConfig {
        port: bound.local_addr().port(),
        ..TransportConfig::default()
    }
}

#[tokio::test]
async fn key_distribution_hands_out_the_authority_key() {
    let config = start_authority(CertAuthHost::new(CA.clone())).await;
    let client = CertAuthClient::connect_with("127.0.0.1", config).await.unwrap();

    let key = client.fetch_ca_key().await.unwrap();
    assert_eq!(&key, CA.public());
    client.close();
}

#[tokio::test]
async fn certification_yields_a_verifiable_certificate() {
    let config = start_authority(CertAuthHost::new(CA.clone())).await;
    let client = CertAuthClient::connect_with("127.0.0.1", config).await.unwrap();

    let cert = client.certify(REQUESTER.public()).await.unwrap();
    assert_eq!(cert.subject(), REQUESTER.public());
    assert!(cert.verify(CA.public()));

    // Not verifiable against some other authority.
    let other = RsaKeyPair::generate_with_bits(2048).unwrap();
    assert!(!cert.verify(other.public()));
    client.close();
}

#[tokio::test]
async fn verification_checks_gate_certification() {
    // The authority demands a password in field 2.
    let authority = CertAuthHost::new(CA.clone()).require_cert_verification(|msg: &Message| {
        msg.field(2).and_then(|f| f.as_str().ok()) == Some("letmein")
    });
    let config = start_authority(authority).await;

    // Without the credential: explicit rejection.
    let bare = CertAuthClient::connect_with("127.0.0.1", config.clone())
        .await
        .unwrap();
    assert!(matches!(
        bare.certify(REQUESTER.public()).await,
        Err(CertAuthError::Rejected)
    ));
    bare.close();

    // With an authentication hook appending it: accepted.
    let credentialed = CertAuthClient::connect_with("127.0.0.1", config).await.unwrap();
    credentialed.add_cert_authentication(|request| request.add("letmein").map(|_| ()));
    let cert = credentialed.certify(REQUESTER.public()).await.unwrap();
    assert!(cert.verify(CA.public()));
    credentialed.close();
}

#[tokio::test]
async fn rejected_distribution_is_an_error_not_a_key() {
    let authority = CertAuthHost::new(CA.clone()).require_dist_verification(|_| false);
    let config = start_authority(authority).await;

    let client = CertAuthClient::connect_with("127.0.0.1", config).await.unwrap();
    assert!(matches!(
        client.fetch_ca_key().await,
        Err(CertAuthError::Rejected)
    ));
    client.close();
}

#[tokio::test]
async fn silence_times_out() {
    // A plain transport host that absorbs everything and never answers.
    let mute = Host::new(TransportConfig::default());
    mute.multiplexer().listen(|_| true, |_, _| async {});
    let bound = mute
        .bind_addr(SocketAddr::from(([127, 0, 0, 1], 0)))
        .await
        .unwrap();
    let config = TransportConfig {
        port: bound.local_addr().port(),
        ..TransportConfig::default()
    };

    let client = CertAuthClient::connect_with("127.0.0.1", config).await.unwrap();
    client.set_timeout(Duration::from_millis(200));
    assert!(matches!(
        client.fetch_ca_key().await,
        Err(CertAuthError::TimedOut { .. })
    ));
    client.close();
}

#[tokio::test]
async fn callback_variant_reports_through_the_callback() {
    let config = start_authority(CertAuthHost::new(CA.clone())).await;
    let client = CertAuthClient::connect_with("127.0.0.1", config).await.unwrap();

    let (tx, rx) = oneshot::channel();
    client.certify_with_callback(REQUESTER.public().clone(), move |outcome| {
        let _ = tx.send(outcome);
    });

    let cert = tokio::time::timeout(Duration::from_secs(10), rx)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(cert.verify(CA.public()));
    client.close();
}
