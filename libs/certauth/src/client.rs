//! The requester side: fetch the authority key, get certified
//!
//! A request is sent at most once; the outcome is an answer, an explicit
//! rejection, or a timeout. There is no retry here; callers decide
//! whether asking again is appropriate. Requests on one client are
//! serialized, and answers left over from a timed-out request are
//! discarded before the next one is sent.
//!
//! Authentication hooks let a deployment append credential fields to
//! outgoing requests, mirroring the verification checks an authority may
//! demand.

use std::sync::Arc;
use std::time::Duration;

use codec::Message;
use crypto::{encode_public_key, RsaPublicKey};
use parking_lot::RwLock;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;
use transport::{ServerConn, TransportConfig, TransportError};

use crate::certificate::Certificate;
use crate::error::{CertAuthError, Result};
use crate::{key_from_field, CA_ACCEPT, CA_REJECT, CERT_REQUEST, DEFAULT_PORT, DIST_REQUEST};

/// Default patience for an authority's answer.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// A mutation applied to an outgoing request before it is sent.
pub type RequestHook = Arc<dyn Fn(&mut Message) -> codec::EncodeResult<()> + Send + Sync>;

#[derive(Clone)]
pub struct CertAuthClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    conn: ServerConn,
    // Locked across one full request/answer exchange.
    answers: Mutex<mpsc::UnboundedReceiver<Arc<Message>>>,
    timeout: RwLock<Duration>,
    dist_hooks: RwLock<Vec<RequestHook>>,
    cert_hooks: RwLock<Vec<RequestHook>>,
}

impl CertAuthClient {
    /// Connects to an authority on the standard authority port.
    pub async fn connect(host: &str) -> Result<Self> {
        let config = TransportConfig {
            port: DEFAULT_PORT,
            ..TransportConfig::default()
        };
        Self::connect_with(host, config).await
    }

    pub async fn connect_with(host: &str, config: TransportConfig) -> Result<Self> {
        let conn = ServerConn::connect(host, config).await?;

        let (tx, rx) = mpsc::unbounded_channel();
        conn.multiplexer().listen(
            |msg| {
                matches!(
                    msg.field(0).and_then(|f| f.as_str().ok()),
                    Some(CA_ACCEPT) | Some(CA_REJECT)
                )
            },
            move |msg, _| {
                let tx = tx.clone();
                async move {
                    let _ = tx.send(msg);
                }
            },
        );

        Ok(Self {
            inner: Arc::new(ClientInner {
                conn,
                answers: Mutex::new(rx),
                timeout: RwLock::new(DEFAULT_TIMEOUT),
                dist_hooks: RwLock::new(Vec::new()),
                cert_hooks: RwLock::new(Vec::new()),
            }),
        })
    }

    /// Registers a hook applied to distribution requests.
    pub fn add_dist_authentication<F>(&self, hook: F)
    where
        F: Fn(&mut Message) -> codec::EncodeResult<()> + Send + Sync + 'static,
    {
        self.inner.dist_hooks.write().push(Arc::new(hook));
    }

    /// Registers a hook applied to certification requests.
    pub fn add_cert_authentication<F>(&self, hook: F)
    where
        F: Fn(&mut Message) -> codec::EncodeResult<()> + Send + Sync + 'static,
    {
        self.inner.cert_hooks.write().push(Arc::new(hook));
    }

    /// Asks the authority for its public key.
    pub async fn fetch_ca_key(&self) -> Result<RsaPublicKey> {
        let mut request = Message::new();
        request.add(DIST_REQUEST)?;
        apply_hooks(&mut request, &self.inner.dist_hooks)?;

        let answer = self.exchange(request, "authority key").await?;
        let key = answer
            .field(1)
            .ok_or_else(|| CertAuthError::invalid_response("accept frame without a key field"))
            .and_then(key_from_field)?;
        debug!("authority key received");
        Ok(key)
    }

    /// Asks the authority to certify `subject`.
    pub async fn certify(&self, subject: &RsaPublicKey) -> Result<Certificate> {
        let mut request = Message::new();
        request.add(CERT_REQUEST)?;
        request.add(encode_public_key(subject))?;
        apply_hooks(&mut request, &self.inner.cert_hooks)?;

        let answer = self.exchange(request, "certificate").await?;
        let token = answer
            .field(1)
            .ok_or_else(|| {
                CertAuthError::invalid_response("accept frame without a certificate field")
            })?
            .as_blob()?;
        debug!("certificate received");
        Ok(Certificate::new(
            subject.clone(),
            bytes::Bytes::copy_from_slice(token),
        ))
    }

    /// Spawned variant of [`fetch_ca_key`](Self::fetch_ca_key).
    pub fn fetch_ca_key_with_callback<F>(&self, callback: F)
    where
        F: FnOnce(Result<RsaPublicKey>) + Send + 'static,
    {
        let client = self.clone();
        tokio::spawn(async move {
            callback(client.fetch_ca_key().await);
        });
    }

    /// Spawned variant of [`certify`](Self::certify).
    pub fn certify_with_callback<F>(&self, subject: RsaPublicKey, callback: F)
    where
        F: FnOnce(Result<Certificate>) + Send + 'static,
    {
        let client = self.clone();
        tokio::spawn(async move {
            callback(client.certify(&subject).await);
        });
    }

    /// Adjusts how long to wait for an answer.
    pub fn set_timeout(&self, timeout: Duration) {
        *self.inner.timeout.write() = timeout;
    }

    /// Closes the underlying link.
    pub fn close(&self) {
        self.inner.conn.close();
    }

    /// Sends one request and waits for one accept/reject answer.
    ///
    /// The wire protocol carries no correlation id, so a straggler answer
    /// from a timed-out request that lands after the pre-send drain is
    /// indistinguishable from the current request's answer. Both requests
    /// went to the same authority, so the substituted answer is at worst
    /// stale, never foreign.
    async fn exchange(&self, request: Message, operation: &'static str) -> Result<Arc<Message>> {
        let mut answers = self.inner.answers.lock().await;
        // Discard anything stale from an earlier timed-out exchange.
        while answers.try_recv().is_ok() {}

        self.inner.conn.send(request)?;

        let timeout = *self.inner.timeout.read();
        let answer = tokio::time::timeout(timeout, answers.recv())
            .await
            .map_err(|_| CertAuthError::TimedOut {
                operation,
                timeout_ms: timeout.as_millis() as u64,
            })?
            .ok_or(CertAuthError::Transport(TransportError::closed(
                "answer channel gone",
            )))?;

        match answer.field(0).and_then(|f| f.as_str().ok()) {
            Some(CA_ACCEPT) => Ok(answer),
            Some(CA_REJECT) => Err(CertAuthError::Rejected),
            _ => Err(CertAuthError::invalid_response(
                "answer is neither accept nor reject",
            )),
        }
    }
}

fn apply_hooks(request: &mut Message, hooks: &RwLock<Vec<RequestHook>>) -> Result<()> {
    for hook in hooks.read().iter() {
        hook(request)?;
    }
    Ok(())
}
