//! End-to-end scenarios for the standalone host.
//!
//! Every test binds an ephemeral port on 127.0.0.1 and talks to it with a
//! real WebSocket client.

use std::sync::Arc;
use std::time::{Duration, Instant};

use devtools_bridge::{
    Bridge, BootstrapSource, ConnectionHost, ConnectionId, Container, DisconnectReason,
    DisplayState, MemoryContainer, MountHandle, Reconciler, Renderer, SessionController,
    SessionErrorKind, SessionEvent, SessionObserver,
};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

// ============================================================================
// Helpers
// ============================================================================

const WAIT: Duration = Duration::from_secs(5);

const PLACEHOLDER: &str = "<div class=\"waiting\">Waiting for React to connect...</div>";

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Forwards every session event into a channel.
fn event_channel() -> (Arc<dyn SessionObserver>, mpsc::UnboundedReceiver<SessionEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let observer: Arc<dyn SessionObserver> = Arc::new(move |event: &SessionEvent| {
        let _ = tx.send(event.clone());
    });
    (observer, rx)
}

async fn next_event(rx: &mut mpsc::UnboundedReceiver<SessionEvent>) -> SessionEvent {
    timeout(WAIT, rx.recv())
        .await
        .expect("event in time")
        .expect("observer alive")
}

async fn expect_listening(rx: &mut mpsc::UnboundedReceiver<SessionEvent>) -> u16 {
    match next_event(rx).await {
        SessionEvent::Listening { port } => port,
        other => panic!("expected Listening, got {other:?}"),
    }
}

async fn expect_connected(rx: &mut mpsc::UnboundedReceiver<SessionEvent>) -> (ConnectionId, Bridge) {
    match next_event(rx).await {
        SessionEvent::Connected { id, bridge } => (id, bridge),
        other => panic!("expected Connected, got {other:?}"),
    }
}

async fn connect(port: u16) -> Client {
    let (client, _) = tokio_tungstenite::connect_async(format!("ws://127.0.0.1:{port}"))
        .await
        .expect("connect");
    client
}

async fn send_event(client: &mut Client, event: &str, payload: Value) {
    let text = json!({ "event": event, "payload": payload }).to_string();
    client
        .send(WsMessage::Text(text.into()))
        .await
        .expect("client send");
}

/// Polls `check` until it holds or the wait runs out.
async fn eventually(mut check: impl FnMut() -> bool) {
    let deadline = Instant::now() + WAIT;
    while !check() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        sleep(Duration::from_millis(10)).await;
    }
}

fn controller_builder() -> devtools_bridge::SessionControllerBuilder {
    SessionController::builder()
        .host("127.0.0.1")
        .port(0)
        .retry_delay(Duration::from_millis(100))
}

// ============================================================================
// UI Doubles
// ============================================================================

struct Ui;

struct Mounted;

impl MountHandle for Mounted {
    fn unmount(self: Box<Self>) {}
}

impl Renderer for Ui {
    fn mount(
        &self,
        container: &Arc<dyn Container>,
        _bridge: &Bridge,
        _reconciler: &Arc<dyn Reconciler>,
    ) -> Box<dyn MountHandle> {
        container.set_inner_html("<devtools/>");
        Box::new(Mounted)
    }
}

struct Store;

impl Reconciler for Store {}

type Received = Arc<Mutex<Vec<(String, Value)>>>;

/// Host whose reconciler records every message for `events`.
fn recording_host(events: Vec<String>) -> (ConnectionHost, Arc<MemoryContainer>, Received) {
    let received: Received = Arc::new(Mutex::new(Vec::new()));

    let sink = Arc::clone(&received);
    let reconcilers = move |bridge: &Bridge| -> Arc<dyn Reconciler> {
        for event in &events {
            let sink = Arc::clone(&sink);
            let _ = bridge.subscribe(event.clone(), move |message| {
                sink.lock()
                    .push((message.event().to_string(), message.payload().clone()));
                Ok(())
            });
        }
        Arc::new(Store)
    };

    let host = ConnectionHost::new(Arc::new(Ui), Arc::new(reconcilers));
    let container = Arc::new(MemoryContainer::new(PLACEHOLDER));
    host.set_container(container.clone());

    (host, container, received)
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn test_ten_events_then_peer_close_restores_placeholder() {
    init_tracing();

    let names: Vec<String> = (0..10).map(|i| format!("event{i}")).collect();
    let (host, container, received) = recording_host(names.clone());
    let (observer, mut events) = event_channel();

    let controller = controller_builder()
        .observer(Arc::new(host.clone()))
        .observer(observer)
        .build()
        .expect("build");
    controller.start();
    let port = expect_listening(&mut events).await;

    let mut client = connect(port).await;
    let _ = expect_connected(&mut events).await;
    assert_eq!(host.state(), DisplayState::Connected);

    for (i, name) in names.iter().enumerate() {
        send_event(&mut client, name, json!({ "index": i })).await;
    }

    eventually(|| received.lock().len() >= 10).await;
    sleep(Duration::from_millis(50)).await;

    let received = received.lock().clone();
    assert_eq!(received.len(), 10, "each handler exactly once");
    for (i, (event, payload)) in received.iter().enumerate() {
        assert_eq!(event, &names[i]);
        assert_eq!(payload, &json!({ "index": i }));
    }

    client.close(None).await.expect("client close");

    match next_event(&mut events).await {
        SessionEvent::Disconnected { reason, .. } => {
            assert_eq!(reason, DisconnectReason::PeerClosed);
        }
        other => panic!("expected Disconnected, got {other:?}"),
    }
    assert_eq!(host.state(), DisplayState::Disconnected);
    assert_eq!(container.inner_html(), PLACEHOLDER);

    controller.stop();
}

#[tokio::test]
async fn test_second_connection_evicts_first() {
    init_tracing();

    let statuses = Arc::new(Mutex::new(Vec::<String>::new()));
    let status_sink = Arc::clone(&statuses);

    let deliveries: Arc<Mutex<Vec<ConnectionId>>> = Arc::new(Mutex::new(Vec::new()));
    let delivery_sink = Arc::clone(&deliveries);

    // Subscribe per connection before the connection starts reading.
    let tagger = Arc::new(move |event: &SessionEvent| {
        if let SessionEvent::Connected { id, bridge } = event {
            let id = *id;
            let sink = Arc::clone(&delivery_sink);
            let _ = bridge.subscribe("ping", move |_| {
                sink.lock().push(id);
                Ok(())
            });
        }
    });
    let (observer, mut events) = event_channel();

    let controller = controller_builder()
        .status_listener(move |status| status_sink.lock().push(status.to_string()))
        .observer(tagger)
        .observer(observer)
        .build()
        .expect("build");
    controller.start();
    let port = expect_listening(&mut events).await;

    let mut first = connect(port).await;
    let (first_id, first_bridge) = expect_connected(&mut events).await;

    let mut second = connect(port).await;
    match next_event(&mut events).await {
        SessionEvent::Disconnected { id, reason } => {
            assert_eq!(id, first_id);
            assert_eq!(reason, DisconnectReason::Evicted);
        }
        other => panic!("expected eviction, got {other:?}"),
    }
    let (second_id, _) = expect_connected(&mut events).await;

    let active = controller.active_connection().expect("active connection");
    assert_eq!(active.id(), second_id);
    assert!(!first_bridge.is_open());

    // The evicted socket may already be gone; its send result is irrelevant.
    let _ = first
        .send(WsMessage::Text(
            json!({"event": "ping", "payload": 1}).to_string().into(),
        ))
        .await;
    send_event(&mut second, "ping", json!(2)).await;

    eventually(|| !deliveries.lock().is_empty()).await;
    sleep(Duration::from_millis(100)).await;
    assert_eq!(*deliveries.lock(), vec![second_id]);

    let evictions = statuses
        .lock()
        .iter()
        .filter(|s| s.starts_with("Only one connection allowed at a time."))
        .count();
    assert_eq!(evictions, 1);

    controller.stop();
}

#[tokio::test]
async fn test_address_in_use_three_times_then_success() {
    init_tracing();

    let blocker = std::net::TcpListener::bind("127.0.0.1:0").expect("blocker");
    let port = blocker.local_addr().expect("addr").port();
    let blocker = Arc::new(Mutex::new(Some(blocker)));

    let failures = Arc::new(Mutex::new(Vec::<Instant>::new()));
    let failure_sink = Arc::clone(&failures);
    let release = Arc::clone(&blocker);

    // Free the port on the third failure.
    let releaser = Arc::new(move |event: &SessionEvent| {
        if let SessionEvent::ListenFailed(error) = event {
            assert_eq!(error.kind, SessionErrorKind::AddressInUse);
            let mut failures = failure_sink.lock();
            failures.push(Instant::now());
            if failures.len() == 3 {
                drop(release.lock().take());
            }
        }
    });
    let (observer, mut events) = event_channel();

    let controller = controller_builder()
        .port(port)
        .observer(releaser)
        .observer(observer)
        .build()
        .expect("build");
    controller.start();

    for _ in 0..3 {
        assert!(matches!(
            next_event(&mut events).await,
            SessionEvent::ListenFailed(_)
        ));
    }
    let bound = expect_listening(&mut events).await;
    let listening_at = Instant::now();

    assert_eq!(bound, port);
    assert!(!controller.has_pending_retry(), "no retry left behind");

    let failures = failures.lock().clone();
    assert_eq!(failures.len(), 3);
    for pair in failures.windows(2) {
        assert!(pair[1] - pair[0] >= Duration::from_millis(80));
    }
    assert!(listening_at - failures[2] >= Duration::from_millis(80));

    assert!(
        timeout(Duration::from_millis(300), events.recv()).await.is_err(),
        "exactly one listening event and nothing after"
    );

    controller.stop();
}

#[tokio::test]
async fn test_listen_error_renders_in_host() {
    init_tracing();

    let blocker = std::net::TcpListener::bind("127.0.0.1:0").expect("blocker");
    let port = blocker.local_addr().expect("addr").port();

    let (host, container, _) = recording_host(Vec::new());
    let (observer, mut events) = event_channel();

    let controller = controller_builder()
        .port(port)
        .observer(Arc::new(host.clone()))
        .observer(observer)
        .build()
        .expect("build");
    controller.start();

    assert!(matches!(
        next_event(&mut events).await,
        SessionEvent::ListenFailed(_)
    ));
    assert!(host.state().is_error());
    assert!(
        container
            .inner_html()
            .contains("Another instance of DevTools is running.")
    );

    controller.stop();
    drop(blocker);
}

#[tokio::test]
async fn test_malformed_frames_are_dropped_and_connection_survives() {
    init_tracing();

    let (host, _container, received) = recording_host(vec!["update".to_string()]);
    let (observer, mut events) = event_channel();

    let controller = controller_builder()
        .observer(Arc::new(host.clone()))
        .observer(observer)
        .build()
        .expect("build");
    controller.start();
    let port = expect_listening(&mut events).await;

    let mut client = connect(port).await;
    let _ = expect_connected(&mut events).await;

    for text in [
        "not json",
        r#"{"event":"update"}"#,
        r#"{"event":"update","payload":1,"extra":2}"#,
    ] {
        client
            .send(WsMessage::Text(text.into()))
            .await
            .expect("client send");
    }
    client
        .send(WsMessage::Binary(vec![1, 2, 3].into()))
        .await
        .expect("binary send");
    send_event(&mut client, "update", json!("ok")).await;

    eventually(|| !received.lock().is_empty()).await;
    assert_eq!(
        *received.lock(),
        vec![("update".to_string(), json!("ok"))]
    );
    assert!(controller.active_connection().is_some());

    controller.stop();
}

#[tokio::test]
async fn test_plain_http_gets_bootstrap_script() {
    init_tracing();

    let (observer, mut events) = event_channel();
    let controller = controller_builder()
        .bootstrap(BootstrapSource::bytes(b"/* backend */".to_vec()))
        .bootstrap_connect_call(true)
        .observer(observer)
        .build()
        .expect("build");
    controller.start();
    let port = expect_listening(&mut events).await;

    let mut stream = TcpStream::connect(("127.0.0.1", port))
        .await
        .expect("tcp connect");
    stream
        .write_all(b"GET /backend.js HTTP/1.1\r\nHost: localhost\r\n\r\n")
        .await
        .expect("request");

    let mut response = Vec::new();
    timeout(WAIT, stream.read_to_end(&mut response))
        .await
        .expect("response in time")
        .expect("read");
    let text = String::from_utf8(response).expect("utf8");

    assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
    let (_, body) = text.split_once("\r\n\r\n").expect("head and body");
    assert!(body.starts_with("/* backend */"));
    assert!(body.contains(&format!("port: {port}")));

    // The same listener still upgrades WebSocket clients.
    let _client = connect(port).await;
    let _ = expect_connected(&mut events).await;

    controller.stop();
}

#[tokio::test]
async fn test_observer_sends_reach_client() {
    init_tracing();

    let (observer, mut events) = event_channel();
    let controller = controller_builder()
        .observer(observer)
        .build()
        .expect("build");
    controller.start();
    let port = expect_listening(&mut events).await;

    let mut client = connect(port).await;
    let (_, bridge) = expect_connected(&mut events).await;

    bridge
        .send("highlightNativeElement", json!({ "id": 9 }))
        .expect("send");

    let frame = timeout(WAIT, client.next())
        .await
        .expect("frame in time")
        .expect("frame")
        .expect("ok frame");
    let WsMessage::Text(text) = frame else {
        panic!("expected text frame");
    };
    let value: Value = serde_json::from_str(text.as_str()).expect("json");
    assert_eq!(
        value,
        json!({ "event": "highlightNativeElement", "payload": { "id": 9 } })
    );

    controller.stop();
}
