//! Reconnecting client tests against a local WebSocket stub.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use funnel_sdk::envelope::{event_types, EventEnvelope, Identity, GREETING_MSG};
use funnel_sdk::ws::{ClientConfig, ClientState, ReconnectingClient, WsError};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;

const WAIT: Duration = Duration::from_secs(5);

/// Minimal relay stand-in: greets, records every frame and echoes it back.
struct Stub {
    addr: SocketAddr,
    frames: mpsc::UnboundedReceiver<String>,
    accepts: Arc<AtomicUsize>,
}

impl Stub {
    fn url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    async fn next_frame(&mut self) -> EventEnvelope {
        let raw = timeout(WAIT, self.frames.recv())
            .await
            .expect("frame in time")
            .expect("stub running");
        EventEnvelope::decode(&raw).expect("valid envelope")
    }
}

/// Starts a stub. The first `drop_first` connections are closed right
/// after the handshake.
async fn spawn_stub_on(listener: TcpListener, drop_first: usize) -> Stub {
    let addr = listener.local_addr().expect("local addr");
    let (tx, frames) = mpsc::unbounded_channel();
    let accepts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&accepts);

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            let n = counter.fetch_add(1, Ordering::SeqCst);
            let tx = tx.clone();

            tokio::spawn(async move {
                let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
                    return;
                };
                if n < drop_first {
                    drop(ws);
                    return;
                }

                let hello = EventEnvelope::hello(GREETING_MSG).encode().expect("encode");
                if ws.send(Message::Text(hello.into())).await.is_err() {
                    return;
                }

                while let Some(Ok(msg)) = ws.next().await {
                    if let Message::Text(text) = msg {
                        let _ = tx.send(text.as_str().to_string());
                        if ws.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                }
            });
        }
    });

    Stub {
        addr,
        frames,
        accepts,
    }
}

async fn spawn_stub(drop_first: usize) -> Stub {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    spawn_stub_on(listener, drop_first).await
}

fn fast_config(url: String) -> ClientConfig {
    ClientConfig::new(url)
        .with_identity(Identity::new("dev-test", "sess-test"))
        .with_reconnect_floor(Duration::from_millis(50))
        .with_reconnect_ceiling(Duration::from_millis(200))
        .with_heartbeat_interval(Duration::from_secs(60))
}

async fn wait_open(client: &ReconnectingClient) {
    timeout(WAIT, client.wait_for(ClientState::Open))
        .await
        .expect("open in time")
        .expect("client running");
}

#[tokio::test]
async fn test_open_sends_hello_then_presence() {
    let mut stub = spawn_stub(0).await;
    let client = ReconnectingClient::new(fast_config(stub.url())).expect("client");

    client.connect().await.expect("connect");
    wait_open(&client).await;

    let first = stub.next_frame().await;
    assert!(first.is_event_type(event_types::CLIENT_HELLO));
    assert_eq!(first.device_id.as_deref(), Some("dev-test"));

    let second = stub.next_frame().await;
    assert!(second.is_event_type(event_types::PRESENCE));
    assert_eq!(second.field("status"), Some(&serde_json::Value::from("online")));

    client.shutdown().await;
}

#[tokio::test]
async fn test_broadcast_delivered_and_greeting_skipped() {
    let stub = spawn_stub(0).await;
    let config = fast_config(stub.url()).with_hello(false);
    let client = ReconnectingClient::new(config).expect("client");

    client.connect().await.expect("connect");
    wait_open(&client).await;

    // The immediate heartbeat is echoed first; the greeting never surfaces.
    let echoed = timeout(WAIT, client.next_envelope())
        .await
        .expect("envelope in time")
        .expect("envelope");
    assert!(echoed.is_event_type(event_types::PRESENCE));

    let step = client.event(event_types::STEP_VIEW).with_page(2);
    client.send(&step).await.expect("send");

    let echoed = timeout(WAIT, client.next_envelope())
        .await
        .expect("envelope in time")
        .expect("envelope");
    assert!(echoed.is_event_type(event_types::STEP_VIEW));
    assert_eq!(echoed.page, Some(2));

    client.shutdown().await;
}

#[tokio::test]
async fn test_heartbeat_cadence() {
    let mut stub = spawn_stub(0).await;
    let config = fast_config(stub.url())
        .with_hello(false)
        .with_heartbeat_interval(Duration::from_millis(100));
    let client = ReconnectingClient::new(config).expect("client");

    client.connect().await.expect("connect");
    wait_open(&client).await;
    tokio::time::sleep(Duration::from_millis(450)).await;
    client.shutdown().await;
    tokio::time::sleep(Duration::from_millis(150)).await;

    let mut presences = 0;
    while let Ok(raw) = stub.frames.try_recv() {
        let envelope = EventEnvelope::decode(&raw).expect("valid envelope");
        if envelope.is_event_type(event_types::PRESENCE) {
            presences += 1;
        }
    }

    // Immediate tick plus one every 100ms.
    assert!((3..=6).contains(&presences), "presences = {}", presences);

    // Nothing more once the connection has left OPEN.
    tokio::time::sleep(Duration::from_millis(250)).await;
    let mut late = 0;
    while let Ok(raw) = stub.frames.try_recv() {
        let envelope = EventEnvelope::decode(&raw).expect("valid envelope");
        if envelope.is_event_type(event_types::PRESENCE) {
            late += 1;
        }
    }
    assert_eq!(late, 0);
}

#[tokio::test]
async fn test_reconnects_after_drop() {
    let mut stub = spawn_stub(1).await;
    let client = ReconnectingClient::new(fast_config(stub.url())).expect("client");

    client.connect().await.expect("connect");

    // The first session is dropped; the hello only arrives on the second.
    let hello = stub.next_frame().await;
    assert!(hello.is_event_type(event_types::CLIENT_HELLO));
    assert!(stub.accepts.load(Ordering::SeqCst) >= 2);
    wait_open(&client).await;

    client.shutdown().await;
}

#[tokio::test]
async fn test_retries_until_relay_appears() {
    let reserved = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = reserved.local_addr().expect("local addr");
    drop(reserved);

    let client =
        ReconnectingClient::new(fast_config(format!("ws://{}/ws", addr))).expect("client");
    client.connect().await.expect("connect");

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_ne!(client.state(), ClientState::Open);

    let listener = TcpListener::bind(addr).await.expect("rebind");
    let mut stub = spawn_stub_on(listener, 0).await;

    wait_open(&client).await;
    let hello = stub.next_frame().await;
    assert!(hello.is_event_type(event_types::CLIENT_HELLO));

    client.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_sends_disconnect() {
    let mut stub = spawn_stub(0).await;
    let config = fast_config(stub.url()).with_hello(false);
    let client = ReconnectingClient::new(config).expect("client");

    client.connect().await.expect("connect");
    wait_open(&client).await;
    let presence = stub.next_frame().await;
    assert!(presence.is_event_type(event_types::PRESENCE));

    client.shutdown().await;
    assert_eq!(client.state(), ClientState::Closed);

    let bye = stub.next_frame().await;
    assert!(bye.is_event_type(event_types::DISCONNECT));
    assert_eq!(bye.session_id.as_deref(), Some("sess-test"));

    let late = client.send(&client.event(event_types::CONSENT)).await;
    assert!(matches!(late, Err(WsError::NotConnected)));
}

#[tokio::test]
async fn test_connect_is_idempotent() {
    let stub = spawn_stub(0).await;
    let client = ReconnectingClient::new(fast_config(stub.url())).expect("client");

    tokio_test::assert_ok!(client.connect().await);
    tokio_test::assert_ok!(client.connect().await);
    wait_open(&client).await;

    assert_eq!(stub.accepts.load(Ordering::SeqCst), 1);
    client.shutdown().await;

    let err = tokio_test::assert_err!(client.connect().await);
    assert!(matches!(err, WsError::Closed));
}

/// Relay stand-in that greets and then never reads again.
async fn spawn_stalled_relay() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");

    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            if let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await {
                let hello = EventEnvelope::hello(GREETING_MSG).encode().expect("encode");
                let _ = ws.send(Message::Text(hello.into())).await;
                held.push(ws);
            }
        }
    });

    addr
}

#[tokio::test]
async fn test_send_and_shutdown_do_not_block_on_stalled_relay() {
    let addr = spawn_stalled_relay().await;
    let config = fast_config(format!("ws://{}/ws", addr))
        .with_hello(false)
        .with_outbound_buffer(4)
        .with_close_timeout(Duration::from_millis(300));
    let client = ReconnectingClient::new(config).expect("client");

    client.connect().await.expect("connect");
    wait_open(&client).await;

    let blob = "x".repeat(1 << 20);
    let mut refused = 0;
    for _ in 0..64 {
        let envelope = client
            .event(event_types::REGISTER)
            .with_field("blob", blob.as_str());
        let result = timeout(Duration::from_secs(2), client.send(&envelope))
            .await
            .expect("send returned without waiting on the socket");
        if matches!(result, Err(WsError::SendFailed(_))) {
            refused += 1;
        }
    }
    assert!(refused > 0, "outbound queue never reported full");

    let stopped = timeout(WAIT, client.shutdown()).await;
    assert!(stopped.is_ok(), "shutdown waited on a stalled writer");
    assert_eq!(client.state(), ClientState::Closed);
}

#[tokio::test]
async fn test_current_page_stamped_on_every_envelope() {
    let mut stub = spawn_stub(0).await;
    let config = fast_config(stub.url()).with_hello(false).with_page(2);
    let client = ReconnectingClient::new(config).expect("client");

    client.connect().await.expect("connect");
    wait_open(&client).await;

    let presence = stub.next_frame().await;
    assert!(presence.is_event_type(event_types::PRESENCE));
    assert_eq!(presence.page, Some(2));

    client.set_page(5);
    client
        .send(&client.event(event_types::STEP_VIEW))
        .await
        .expect("send");
    let step = stub.next_frame().await;
    assert!(step.is_event_type(event_types::STEP_VIEW));
    assert_eq!(step.page, Some(5));

    client.shutdown().await;
    let bye = stub.next_frame().await;
    assert!(bye.is_event_type(event_types::DISCONNECT));
    assert_eq!(bye.page, Some(5));
}
