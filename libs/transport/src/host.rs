//! Accepting side: one task per connection, one writer per socket
//!
//! Each accepted connection gets a monotonically increasing id (from 1)
//! and two tasks: a reader that frames inbound bytes and dispatches them
//! through the multiplexer, and a writer that drains a reply channel so
//! concurrent handlers never interleave bytes on the socket. Keep-alive
//! frames are absorbed here and never reach listeners.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use codec::{Codec, FrameReader, Message};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::config::TransportConfig;
use crate::error::{Result, TransportError};
use crate::listener::Replier;
use crate::multiplexer::Multiplexer;
use crate::KEEP_ALIVE_TOKEN;

pub struct Host {
    config: TransportConfig,
    codec: Arc<Codec>,
    mux: Arc<Multiplexer>,
    next_id: Arc<AtomicU64>,
}

impl Host {
    pub fn new(config: TransportConfig) -> Self {
        Self::with_codec(config, Codec::shared())
    }

    pub fn with_codec(config: TransportConfig, codec: Arc<Codec>) -> Self {
        Self {
            config,
            codec,
            mux: Arc::new(Multiplexer::new()),
            // Connection ids start at 1; 0 means "not stamped".
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// The multiplexer, for registering listeners before (or after)
    /// binding.
    pub fn multiplexer(&self) -> &Multiplexer {
        &self.mux
    }

    /// Binds on all interfaces at the configured port and starts
    /// accepting.
    pub async fn bind(&self) -> Result<BoundHost> {
        self.bind_addr(SocketAddr::from(([0, 0, 0, 0], self.config.port)))
            .await
    }

    /// Binds an explicit address (port 0 picks an ephemeral one).
    pub async fn bind_addr(&self, addr: SocketAddr) -> Result<BoundHost> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| TransportError::Bind { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| TransportError::Bind { addr, source })?;
        info!(%local_addr, "host listening");

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let accept = AcceptLoop {
            listener,
            codec: Arc::clone(&self.codec),
            mux: Arc::clone(&self.mux),
            next_id: Arc::clone(&self.next_id),
            max_frame_bytes: self.config.max_frame_bytes,
        };
        let task = tokio::spawn(accept.run(shutdown_rx));

        Ok(BoundHost {
            local_addr,
            shutdown: shutdown_tx,
            task,
        })
    }
}

/// A running host. Dropping it does not stop the accept loop; call
/// [`BoundHost::shutdown`].
pub struct BoundHost {
    local_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    task: tokio::task::JoinHandle<()>,
}

impl BoundHost {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops accepting and drops every established connection.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }
}

struct AcceptLoop {
    listener: TcpListener,
    codec: Arc<Codec>,
    mux: Arc<Multiplexer>,
    next_id: Arc<AtomicU64>,
    max_frame_bytes: usize,
}

impl AcceptLoop {
    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("host accept loop stopping");
                    return;
                }
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                            debug!(connection_id = id, %peer, "connection accepted");
                            tokio::spawn(serve_connection(
                                stream,
                                peer,
                                id,
                                Arc::clone(&self.codec),
                                Arc::clone(&self.mux),
                                self.max_frame_bytes,
                                shutdown.clone(),
                            ));
                        }
                        Err(e) => {
                            error!(error = %e, "accept failed");
                        }
                    }
                }
            }
        }
    }
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    id: u64,
    codec: Arc<Codec>,
    mux: Arc<Multiplexer>,
    max_frame_bytes: usize,
    mut shutdown: watch::Receiver<bool>,
) {
    let (read_half, mut write_half) = stream.into_split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    // Writer: sole owner of the socket's write half.
    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let bytes = match msg.to_bytes() {
                Ok(b) => b,
                Err(e) => {
                    warn!(connection_id = id, error = %e, "dropping unserializable reply");
                    continue;
                }
            };
            if let Err(e) = write_half.write_all(&bytes).await {
                debug!(connection_id = id, error = %e, "write failed, closing writer");
                return;
            }
            if let Err(e) = write_half.flush().await {
                debug!(connection_id = id, error = %e, "flush failed, closing writer");
                return;
            }
        }
    });

    let replier_tx = tx.clone();
    let replier = Replier::new(id, move |msg| {
        replier_tx
            .send(msg)
            .map_err(|_| TransportError::closed("connection writer gone"))
    });

    let mut reader = FrameReader::with_codec(read_half, codec).max_frame_bytes(max_frame_bytes);
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            next = reader.next_message() => {
                let Some(mut msg) = next else { break };
                if is_keep_alive(&msg) {
                    debug!(connection_id = id, "keep-alive absorbed");
                    continue;
                }
                msg.set_connection_id(id);
                mux.dispatch(msg, replier.clone());
            }
        }
    }

    info!(connection_id = id, %peer, "connection closed");
    drop(tx);
    let _ = writer.await;
}

/// Keep-alives are a single plain string field holding the service token.
pub(crate) fn is_keep_alive(msg: &Message) -> bool {
    msg.field_count() == 1
        && msg
            .field(0)
            .and_then(|f| f.as_str().ok())
            .map(|s| s == KEEP_ALIVE_TOKEN)
            .unwrap_or(false)
}
