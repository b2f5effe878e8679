//! The authority side: answers distribution and certification requests
//!
//! Two request kinds, each a listener on one transport host:
//! - distribution (`SC-DIST-0001`): hand out the authority's public key
//! - certification (`SC-CERT-0001`): bless the requester's public key
//!   (field 1) by encrypting its encoded form under the authority's
//!   private exponent
//!
//! Every configured verification check must pass or the requester gets an
//! explicit rejection frame. Checks see the whole request message, so
//! deployments can demand extra credential fields appended by client-side
//! authentication hooks.

use std::net::SocketAddr;
use std::sync::Arc;

use codec::Message;
use crypto::{encode_public_key, rsa_encrypt, RawRsaKey, RsaKeyPair};
use tracing::{debug, info, warn};
use transport::{BoundHost, Host, Replier, TransportConfig};

use crate::error::Result;
use crate::{key_from_field, CA_ACCEPT, CA_REJECT, CERT_REQUEST, DEFAULT_PORT, DIST_REQUEST};

/// A verification check run against an incoming request.
pub type Check = Arc<dyn Fn(&Message) -> bool + Send + Sync>;

pub struct CertAuthHost {
    keypair: RsaKeyPair,
    config: TransportConfig,
    dist_checks: Vec<Check>,
    cert_checks: Vec<Check>,
}

impl CertAuthHost {
    /// An authority on the standard authority port.
    pub fn new(keypair: RsaKeyPair) -> Self {
        let config = TransportConfig {
            port: DEFAULT_PORT,
            ..TransportConfig::default()
        };
        Self::with_config(keypair, config)
    }

    pub fn with_config(keypair: RsaKeyPair, config: TransportConfig) -> Self {
        Self {
            keypair,
            config,
            dist_checks: Vec::new(),
            cert_checks: Vec::new(),
        }
    }

    /// Adds a check that distribution requests must pass.
    pub fn require_dist_verification<F>(mut self, check: F) -> Self
    where
        F: Fn(&Message) -> bool + Send + Sync + 'static,
    {
        self.dist_checks.push(Arc::new(check));
        self
    }

    /// Adds a check that certification requests must pass.
    pub fn require_cert_verification<F>(mut self, check: F) -> Self
    where
        F: Fn(&Message) -> bool + Send + Sync + 'static,
    {
        self.cert_checks.push(Arc::new(check));
        self
    }

    /// Binds on all interfaces at the configured port and starts
    /// answering.
    pub async fn start(self) -> Result<BoundHost> {
        let port = self.config.port;
        self.start_at(SocketAddr::from(([0, 0, 0, 0], port))).await
    }

    /// Binds an explicit address.
    pub async fn start_at(self, addr: SocketAddr) -> Result<BoundHost> {
        let host = Host::new(self.config.clone());
        let keypair = Arc::new(self.keypair);

        {
            let keypair = Arc::clone(&keypair);
            let checks = self.dist_checks.clone();
            host.multiplexer().listen(
                |msg| is_request(msg, DIST_REQUEST),
                move |msg, replier| {
                    let keypair = Arc::clone(&keypair);
                    let checks = checks.clone();
                    async move {
                        answer_dist(&msg, &replier, &keypair, &checks);
                    }
                },
            );
        }

        {
            let keypair = Arc::clone(&keypair);
            let checks = self.cert_checks.clone();
            host.multiplexer().listen(
                |msg| is_request(msg, CERT_REQUEST),
                move |msg, replier| {
                    let keypair = Arc::clone(&keypair);
                    let checks = checks.clone();
                    async move {
                        answer_cert(&msg, &replier, &keypair, &checks);
                    }
                },
            );
        }

        let bound = host.bind_addr(addr).await?;
        info!(addr = %bound.local_addr(), "certificate authority serving");
        Ok(bound)
    }
}

fn is_request(msg: &Message, kind: &str) -> bool {
    msg.field(0).and_then(|f| f.as_str().ok()) == Some(kind)
}

fn passes(msg: &Message, checks: &[Check]) -> bool {
    checks.iter().all(|check| check(msg))
}

fn reply(replier: &Replier, msg: Message) {
    if let Err(e) = replier.send(msg) {
        warn!(error = %e, "authority reply could not be queued");
    }
}

fn reject(replier: &Replier) {
    match Message::of([CA_REJECT]) {
        Ok(msg) => reply(replier, msg),
        Err(e) => warn!(error = %e, "could not build rejection"),
    }
}

fn answer_dist(msg: &Message, replier: &Replier, keypair: &RsaKeyPair, checks: &[Check]) {
    if !passes(msg, checks) {
        debug!(
            connection_id = msg.connection_id(),
            "distribution request failed verification"
        );
        reject(replier);
        return;
    }
    let mut answer = Message::new();
    let built = answer
        .add(CA_ACCEPT)
        .and_then(|m| m.add(encode_public_key(keypair.public())))
        .map(|_| ());
    match built {
        Ok(()) => {
            debug!(connection_id = msg.connection_id(), "authority key distributed");
            reply(replier, answer);
        }
        Err(e) => warn!(error = %e, "could not build distribution answer"),
    }
}

fn answer_cert(msg: &Message, replier: &Replier, keypair: &RsaKeyPair, checks: &[Check]) {
    if !passes(msg, checks) {
        debug!(
            connection_id = msg.connection_id(),
            "certification request failed verification"
        );
        reject(replier);
        return;
    }
    // The key being certified rides in field 1.
    let subject = match msg.field(1).map(key_from_field) {
        Some(Ok(key)) => key,
        _ => {
            debug!(
                connection_id = msg.connection_id(),
                "certification request without a usable subject key"
            );
            reject(replier);
            return;
        }
    };

    let token = match rsa_encrypt(
        &encode_public_key(&subject),
        &RawRsaKey::from(keypair.private()),
    ) {
        Ok(token) => token,
        Err(e) => {
            warn!(error = %e, "certificate issuance failed");
            reject(replier);
            return;
        }
    };

    let mut answer = Message::new();
    let built = answer
        .add(CA_ACCEPT)
        .and_then(|m| m.add(token))
        .map(|_| ());
    match built {
        Ok(()) => {
            debug!(connection_id = msg.connection_id(), "certificate issued");
            reply(replier, answer);
        }
        Err(e) => warn!(error = %e, "could not build certification answer"),
    }
}
