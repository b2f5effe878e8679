//! Host/client behavior over real loopback sockets.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use codec::Message;
use tokio::sync::mpsc;
use tokio::time::timeout;
use transport::{Host, ServerConn, TransportConfig};

const WAIT: Duration = Duration::from_secs(5);

async fn start_host(host: &Host) -> (transport::BoundHost, TransportConfig) {
    let bound = host
        .bind_addr(SocketAddr::from(([127, 0, 0, 1], 0)))
        .await
        .unwrap();
    let config = TransportConfig {
        port: bound.local_addr().port(),
        ..TransportConfig::default()
    };
    (bound, config)
}

fn first_text(msg: &Message) -> Option<&str> {
    msg.field(0).and_then(|f| f.as_str().ok())
}

#[tokio::test]
async fn request_reply_round_trip() {
    let host = Host::new(TransportConfig::default());
    host.multiplexer().listen(
        |msg| first_text(msg) == Some("ping"),
        |_, replier| async move {
            replier.send(Message::of(["pong"]).unwrap()).unwrap();
        },
    );
    let (_bound, config) = start_host(&host).await;

    let conn = ServerConn::connect("127.0.0.1", config).await.unwrap();
    let (tx, mut rx) = mpsc::unbounded_channel();
    conn.multiplexer().listen(
        |msg| first_text(msg) == Some("pong"),
        move |_, _| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(());
            }
        },
    );

    conn.send(Message::of(["ping"]).unwrap()).unwrap();
    timeout(WAIT, rx.recv()).await.expect("pong arrives").unwrap();
    conn.close();
}

#[tokio::test]
async fn messages_arrive_in_send_order() {
    let host = Host::new(TransportConfig::default());
    let (tx, mut rx) = mpsc::unbounded_channel();
    host.multiplexer().listen(
        |_| true,
        move |msg, _| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(first_text(&msg).unwrap_or("").to_owned());
            }
        },
    );
    let (_bound, config) = start_host(&host).await;

    let conn = ServerConn::connect("127.0.0.1", config).await.unwrap();
    for i in 0..20 {
        conn.send(Message::of([format!("msg-{i}")]).unwrap()).unwrap();
    }
    for i in 0..20 {
        let got = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
        assert_eq!(got, format!("msg-{i}"));
    }
    conn.close();
}

#[tokio::test]
async fn connections_get_distinct_nonzero_ids() {
    let host = Host::new(TransportConfig::default());
    let (tx, mut rx) = mpsc::unbounded_channel();
    host.multiplexer().listen(
        |_| true,
        move |msg, replier| {
            let tx = tx.clone();
            async move {
                assert_eq!(msg.connection_id(), replier.connection_id());
                let _ = tx.send(msg.connection_id());
            }
        },
    );
    let (_bound, config) = start_host(&host).await;

    let a = ServerConn::connect("127.0.0.1", config.clone()).await.unwrap();
    let b = ServerConn::connect("127.0.0.1", config).await.unwrap();
    a.send(Message::of(["from a"]).unwrap()).unwrap();
    b.send(Message::of(["from b"]).unwrap()).unwrap();

    let first = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    let second = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert!(first >= 1);
    assert!(second >= 1);
    assert_ne!(first, second);
    a.close();
    b.close();
}

#[tokio::test]
async fn unclaimed_messages_reach_the_rejection_handler() {
    let host = Host::new(TransportConfig::default());
    host.multiplexer()
        .listen(|msg| first_text(msg) == Some("wanted"), |_, _| async {});
    let (tx, mut rx) = mpsc::unbounded_channel();
    host.multiplexer().on_rejected(move |msg, _| {
        let tx = tx.clone();
        async move {
            let _ = tx.send(first_text(&msg).unwrap_or("").to_owned());
        }
    });
    let (_bound, config) = start_host(&host).await;

    let conn = ServerConn::connect("127.0.0.1", config).await.unwrap();
    conn.send(Message::of(["stray"]).unwrap()).unwrap();
    let got = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(got, "stray");
    conn.close();
}

#[tokio::test]
async fn keep_alives_never_reach_listeners() {
    let host = Host::new(TransportConfig::default());
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&seen);
    host.multiplexer().listen(
        |_| true,
        move |_, _| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        },
    );
    let (_bound, mut config) = start_host(&host).await;
    config.heartbeat_ms = 50;

    let conn = ServerConn::connect("127.0.0.1", config).await.unwrap();
    // Idle long enough for several heartbeats.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(seen.load(Ordering::SeqCst), 0);

    conn.send(Message::of(["real"]).unwrap()).unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(seen.load(Ordering::SeqCst), 1);
    conn.close();
}

#[tokio::test]
async fn sends_after_close_fail() {
    let host = Host::new(TransportConfig::default());
    let (_bound, config) = start_host(&host).await;

    let conn = ServerConn::connect("127.0.0.1", config).await.unwrap();
    conn.close();
    assert!(conn.is_closed());
    assert!(conn.send(Message::of(["too late"]).unwrap()).is_err());
}

#[tokio::test]
async fn queued_messages_survive_a_host_restart() {
    let host = Host::new(TransportConfig::default());
    let (bound, config) = start_host(&host).await;
    let addr = bound.local_addr();

    let mut client_config = config.clone();
    client_config.retry_ms = 50;
    let conn = ServerConn::connect("127.0.0.1", client_config).await.unwrap();

    // Kill the host, queue a message while the link is down.
    bound.shutdown().await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    conn.send(Message::of(["persistent"]).unwrap()).unwrap();

    // Bring a fresh host up on the same port.
    let host2 = Host::new(TransportConfig::default());
    let (tx, mut rx) = mpsc::unbounded_channel();
    host2.multiplexer().listen(
        |_| true,
        move |msg, _| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(first_text(&msg).unwrap_or("").to_owned());
            }
        },
    );
    let _bound2 = host2.bind_addr(addr).await.unwrap();

    let got = timeout(WAIT, rx.recv()).await.expect("redelivered").unwrap();
    assert_eq!(got, "persistent");
    conn.close();
}
