//! Fan-out of inbound messages to matching listeners
//!
//! Every listener whose predicate matches gets the message, each in its
//! own task; listeners are independent and one slow handler never blocks
//! another. A message no listener wants goes to the rejection handler, or
//! failing that, a log line.

use std::future::Future;
use std::sync::Arc;

use codec::Message;
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::listener::{Handler, Listener, Replier};

#[derive(Default)]
pub struct Multiplexer {
    listeners: RwLock<Vec<Listener>>,
    rejection: RwLock<Option<Handler>>,
}

impl Multiplexer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener. Listeners accumulate; there is no removal,
    /// a multiplexer lives as long as its host or link.
    pub fn listen<P, H, F>(&self, predicate: P, handler: H)
    where
        P: Fn(&Message) -> bool + Send + Sync + 'static,
        H: Fn(Arc<Message>, Replier) -> F + Send + Sync + 'static,
        F: Future<Output = ()> + Send + 'static,
    {
        self.listeners.write().push(Listener::new(predicate, handler));
    }

    /// Installs the handler for messages nobody matched.
    pub fn on_rejected<H, F>(&self, handler: H)
    where
        H: Fn(Arc<Message>, Replier) -> F + Send + Sync + 'static,
        F: Future<Output = ()> + Send + 'static,
    {
        *self.rejection.write() =
            Some(Arc::new(move |msg, replier| Box::pin(handler(msg, replier))));
    }

    /// Routes one message. Spawns a task per matching listener.
    pub fn dispatch(&self, msg: Message, replier: Replier) {
        let msg = Arc::new(msg);
        let mut matched = 0usize;
        for listener in self.listeners.read().iter() {
            if (listener.predicate)(&msg) {
                matched += 1;
                let handler = Arc::clone(&listener.handler);
                let msg = Arc::clone(&msg);
                let replier = replier.clone();
                tokio::spawn(async move {
                    handler(msg, replier).await;
                });
            }
        }
        if matched > 0 {
            debug!(connection_id = replier.connection_id(), matched, "message dispatched");
            return;
        }

        let rejection = self.rejection.read().clone();
        match rejection {
            Some(handler) => {
                tokio::spawn(async move {
                    handler(msg, replier).await;
                });
            }
            None => {
                warn!(
                    connection_id = replier.connection_id(),
                    fields = msg.field_count(),
                    "message matched no listener and no rejection handler is set"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    fn text_message(s: &str) -> Message {
        Message::parse(&Message::of([s]).unwrap().to_bytes().unwrap()).unwrap()
    }

    fn counting_replier() -> Replier {
        Replier::new(1, |_| Ok(()))
    }

    #[tokio::test]
    async fn every_matching_listener_fires() {
        let mux = Multiplexer::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        for tag in ["a", "b"] {
            let tx = tx.clone();
            mux.listen(
                |msg| msg.field(0).and_then(|f| f.as_str().ok()) == Some("ping"),
                move |_, _| {
                    let tx = tx.clone();
                    async move {
                        let _ = tx.send(tag);
                    }
                },
            );
        }
        mux.listen(|_| false, |_, _| async {});

        mux.dispatch(text_message("ping"), counting_replier());

        let mut got = vec![rx.recv().await.unwrap(), rx.recv().await.unwrap()];
        got.sort();
        assert_eq!(got, ["a", "b"]);
    }

    #[tokio::test]
    async fn unmatched_messages_hit_the_rejection_handler() {
        let mux = Multiplexer::new();
        static REJECTED: AtomicUsize = AtomicUsize::new(0);

        mux.listen(|_| false, |_, _| async {});
        mux.on_rejected(|_, _| async {
            REJECTED.fetch_add(1, Ordering::SeqCst);
        });

        mux.dispatch(text_message("stray"), counting_replier());
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(REJECTED.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn rejection_handler_skipped_when_someone_matched() {
        let mux = Multiplexer::new();
        static STRAYS: AtomicUsize = AtomicUsize::new(0);

        mux.listen(|_| true, |_, _| async {});
        mux.on_rejected(|_, _| async {
            STRAYS.fetch_add(1, Ordering::SeqCst);
        });

        mux.dispatch(text_message("hello"), counting_replier());
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(STRAYS.load(Ordering::SeqCst), 0);
    }
}
