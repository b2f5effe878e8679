//! Client side: a resilient link to one host
//!
//! Outbound messages go through a FIFO queue drained by a single sender;
//! a message is popped only after its bytes are flushed, so a link that
//! dies mid-send retries the same message on the next session. A watchdog
//! queues a keep-alive whenever the link is idle and the session loop
//! reconnects (after a configured pause) for as long as the link is open.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use codec::{Codec, FrameReader, Message};
use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::config::TransportConfig;
use crate::error::{Result, TransportError};
use crate::listener::Replier;
use crate::multiplexer::Multiplexer;
use crate::KEEP_ALIVE_TOKEN;

/// A maintained connection to one remote host.
#[derive(Clone)]
pub struct ServerConn {
    inner: Arc<ConnInner>,
}

struct ConnInner {
    target: String,
    config: TransportConfig,
    codec: Arc<Codec>,
    queue: Mutex<VecDeque<Message>>,
    wakeup: Notify,
    mux: Arc<Multiplexer>,
    closed: AtomicBool,
}

impl ServerConn {
    /// Connects to `host` on the configured port. Fails if the first
    /// connection cannot be established; after that, drops are handled by
    /// reconnection.
    pub async fn connect(host: &str, config: TransportConfig) -> Result<Self> {
        Self::connect_with_codec(host, config, Codec::shared()).await
    }

    pub async fn connect_with_codec(
        host: &str,
        config: TransportConfig,
        codec: Arc<Codec>,
    ) -> Result<Self> {
        let target = format!("{}:{}", host, config.port);
        let stream = TcpStream::connect(&target).await.map_err(|source| {
            TransportError::connection_with_source(
                format!("initial connect to {target} failed"),
                None,
                source,
            )
        })?;
        info!(%target, "link established");

        let inner = Arc::new(ConnInner {
            target,
            config,
            codec,
            queue: Mutex::new(VecDeque::new()),
            wakeup: Notify::new(),
            mux: Arc::new(Multiplexer::new()),
            closed: AtomicBool::new(false),
        });

        tokio::spawn(supervise(Arc::clone(&inner), stream));
        tokio::spawn(watchdog(Arc::clone(&inner)));

        Ok(Self { inner })
    }

    /// Queues a message. Returns immediately; delivery order is FIFO and
    /// survives reconnections. The queue is unbounded: a long outage with
    /// a chatty caller costs memory, not errors.
    pub fn send(&self, msg: Message) -> Result<()> {
        enqueue(&self.inner, msg)
    }

    /// The multiplexer for traffic arriving from the host.
    pub fn multiplexer(&self) -> &Multiplexer {
        &self.inner.mux
    }

    /// Number of messages waiting to be flushed.
    pub fn pending(&self) -> usize {
        self.inner.queue.lock().len()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Closes the link. Queued-but-unsent messages are dropped; sends
    /// after this return an error.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        self.inner.wakeup.notify_waiters();
        info!(target = %self.inner.target, "link closed");
    }
}

fn enqueue(inner: &ConnInner, msg: Message) -> Result<()> {
    if inner.closed.load(Ordering::SeqCst) {
        return Err(TransportError::closed("link closed"));
    }
    inner.queue.lock().push_back(msg);
    inner.wakeup.notify_one();
    Ok(())
}

/// Owns the session lifecycle: run a session until it drops, pause,
/// reconnect, repeat.
async fn supervise(inner: Arc<ConnInner>, first: TcpStream) {
    let mut stream = Some(first);
    loop {
        if inner.closed.load(Ordering::SeqCst) {
            return;
        }
        let s = match stream.take() {
            Some(s) => s,
            None => match TcpStream::connect(&inner.target).await {
                Ok(s) => {
                    info!(target = %inner.target, "link re-established");
                    s
                }
                Err(e) => {
                    debug!(target = %inner.target, error = %e, "reconnect attempt failed");
                    tokio::time::sleep(inner.config.retry()).await;
                    continue;
                }
            },
        };

        run_session(&inner, s).await;

        if inner.closed.load(Ordering::SeqCst) {
            return;
        }
        warn!(target = %inner.target, "link dropped, retrying");
        tokio::time::sleep(inner.config.retry()).await;
    }
}

/// One connected session: a reader task dispatching inbound traffic and
/// the drain loop feeding the write half. Ends when either side fails or
/// the link is closed.
async fn run_session(inner: &Arc<ConnInner>, stream: TcpStream) {
    let (read_half, mut write_half) = stream.into_split();

    let replier = {
        let inner = Arc::clone(inner);
        Replier::new(0, move |msg| enqueue(&inner, msg))
    };
    let mux = Arc::clone(&inner.mux);
    let codec = Arc::clone(&inner.codec);
    let max_frame_bytes = inner.config.max_frame_bytes;
    let mut reader = tokio::spawn(async move {
        let mut frames =
            FrameReader::with_codec(read_half, codec).max_frame_bytes(max_frame_bytes);
        while let Some(msg) = frames.next_message().await {
            mux.dispatch(msg, replier.clone());
        }
    });

    loop {
        // Peek the queue head; it stays queued until flushed.
        let front = loop {
            if inner.closed.load(Ordering::SeqCst) {
                reader.abort();
                return;
            }
            if let Some(front) = inner.queue.lock().front().cloned() {
                break front;
            }
            tokio::select! {
                _ = inner.wakeup.notified() => {}
                _ = &mut reader => return,
            }
        };

        let bytes = match front.to_bytes() {
            Ok(b) => b,
            Err(e) => {
                // Unserializable messages cannot be retried into success;
                // drop this one and keep the queue moving.
                warn!(error = %e, "dropping unserializable message");
                inner.queue.lock().pop_front();
                continue;
            }
        };
        if let Err(e) = write_half.write_all(&bytes).await {
            debug!(error = %e, "write failed, ending session");
            reader.abort();
            return;
        }
        if let Err(e) = write_half.flush().await {
            debug!(error = %e, "flush failed, ending session");
            reader.abort();
            return;
        }
        inner.queue.lock().pop_front();
    }
}

/// Queues a keep-alive whenever the link has nothing else to say.
async fn watchdog(inner: Arc<ConnInner>) {
    let mut tick = tokio::time::interval(inner.config.heartbeat());
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // The first tick fires immediately; skip it so an idle link sends its
    // first keep-alive one heartbeat after connecting.
    tick.tick().await;
    loop {
        tick.tick().await;
        if inner.closed.load(Ordering::SeqCst) {
            return;
        }
        if inner.queue.lock().is_empty() {
            let mut msg = Message::with_codec(Arc::clone(&inner.codec));
            if msg.add(KEEP_ALIVE_TOKEN).is_ok() {
                let _ = enqueue(&inner, msg);
            }
        }
    }
}
