//! Listeners: a match predicate paired with a handler

use std::future::Future;
use std::sync::Arc;

use codec::Message;
use futures::future::BoxFuture;

use crate::error::Result;

/// Decides whether a listener wants a message. Runs inline on the
/// connection's read path, so keep it cheap.
pub type Predicate = Arc<dyn Fn(&Message) -> bool + Send + Sync>;

/// Reacts to a matched message. Each invocation runs in its own task.
pub type Handler = Arc<dyn Fn(Arc<Message>, Replier) -> BoxFuture<'static, ()> + Send + Sync>;

/// A registered (predicate, handler) pair.
#[derive(Clone)]
pub struct Listener {
    pub(crate) predicate: Predicate,
    pub(crate) handler: Handler,
}

impl Listener {
    pub fn new<P, H, F>(predicate: P, handler: H) -> Self
    where
        P: Fn(&Message) -> bool + Send + Sync + 'static,
        H: Fn(Arc<Message>, Replier) -> F + Send + Sync + 'static,
        F: Future<Output = ()> + Send + 'static,
    {
        Self {
            predicate: Arc::new(predicate),
            handler: Arc::new(move |msg, replier| Box::pin(handler(msg, replier))),
        }
    }
}

/// Write access back to the connection a message arrived on.
///
/// Cheap to clone; every write funnels through the connection's single
/// sender, so handlers never contend for the socket.
#[derive(Clone)]
pub struct Replier {
    sink: Arc<dyn Fn(Message) -> Result<()> + Send + Sync>,
    connection_id: u64,
}

impl Replier {
    pub(crate) fn new<S>(connection_id: u64, sink: S) -> Self
    where
        S: Fn(Message) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            sink: Arc::new(sink),
            connection_id,
        }
    }

    /// Queues a message for the connection this one arrived on.
    pub fn send(&self, msg: Message) -> Result<()> {
        (self.sink)(msg)
    }

    /// Transport id of the originating connection; 0 on client links.
    pub fn connection_id(&self) -> u64 {
        self.connection_id
    }
}
