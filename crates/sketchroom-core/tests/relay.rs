//! Integration tests against an in-process relay.
//!
//! Each test starts a small WebSocket relay on a local port and drives a
//! real session against it through its handle.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use sketchroom_core::session::{latest_per_id, BackoffPolicy};
use sketchroom_core::{
    spawn_session, ConnectionState, Endpoint, Point, SessionConfig, Stroke, Tool,
};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

const WAIT: Duration = Duration::from_secs(5);

#[derive(Clone, Default)]
struct RelayOptions {
    /// Frame sent right after the handshake
    init: Option<String>,
    /// Reply to PING with PONG
    answer_pings: bool,
}

/// A relay that records what clients send and lets tests push frames
struct Relay {
    url: String,
    received: mpsc::UnboundedReceiver<(usize, String)>,
    connections: mpsc::UnboundedReceiver<(usize, mpsc::UnboundedSender<Message>)>,
}

impl Relay {
    async fn start(options: RelayOptions) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        Self::serve(listener, options)
    }

    async fn bind(port: u16, options: RelayOptions) -> Self {
        let listener = TcpListener::bind(("127.0.0.1", port)).await.unwrap();
        Self::serve(listener, options)
    }

    fn serve(listener: TcpListener, options: RelayOptions) -> Self {
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let (received_tx, received) = mpsc::unbounded_channel();
        let (connections_tx, connections) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            let mut index = 0;
            while let Ok((stream, _)) = listener.accept().await {
                index += 1;
                tokio::spawn(serve_connection(
                    stream,
                    index,
                    options.clone(),
                    received_tx.clone(),
                    connections_tx.clone(),
                ));
            }
        });

        Self {
            url,
            received,
            connections,
        }
    }

    fn endpoint(&self) -> Endpoint {
        self.url.parse().unwrap()
    }

    async fn next_connection(&mut self) -> (usize, mpsc::UnboundedSender<Message>) {
        timeout(WAIT, self.connections.recv())
            .await
            .expect("timed out waiting for a connection")
            .expect("relay stopped")
    }

    /// Next decoded message of the given type
    async fn next_of_type(&mut self, kind: &str) -> (usize, Value) {
        loop {
            let (index, text) = timeout(WAIT, self.received.recv())
                .await
                .expect("timed out waiting for a message")
                .expect("relay stopped");
            let value: Value = serde_json::from_str(&text).expect("client sent invalid JSON");
            if value["type"] == kind {
                return (index, value);
            }
        }
    }
}

async fn serve_connection(
    stream: TcpStream,
    index: usize,
    options: RelayOptions,
    received_tx: mpsc::UnboundedSender<(usize, String)>,
    connections_tx: mpsc::UnboundedSender<(usize, mpsc::UnboundedSender<Message>)>,
) {
    let Ok(ws) = accept_async(stream).await else {
        return;
    };
    let (mut write, mut read) = ws.split();
    let (push_tx, mut push_rx) = mpsc::unbounded_channel::<Message>();
    let _ = connections_tx.send((index, push_tx));

    if let Some(init) = &options.init {
        if write.send(Message::Text(init.clone())).await.is_err() {
            return;
        }
    }

    loop {
        tokio::select! {
            Some(message) = push_rx.recv() => {
                let closing = matches!(message, Message::Close(_));
                if write.send(message).await.is_err() || closing {
                    return;
                }
            }
            incoming = read.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    if options.answer_pings && text.contains(r#""PING""#) {
                        let pong = Message::Text(r#"{"type":"PONG"}"#.to_string());
                        let _ = write.send(pong).await;
                    }
                    let _ = received_tx.send((index, text));
                }
                Some(Ok(_)) => {}
                _ => return,
            },
        }
    }
}

/// Bind and release a port so nothing is listening on it
async fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

fn config(endpoints: Vec<Endpoint>) -> SessionConfig {
    SessionConfig {
        display_name: "Alice".to_string(),
        endpoints,
        announce_join: false,
        backoff: BackoffPolicy {
            base_delay: Duration::from_millis(50),
            max_delay: Duration::from_millis(200),
            max_jitter: Duration::ZERO,
            ..BackoffPolicy::default()
        },
        connect_timeout: Duration::from_secs(2),
        ..SessionConfig::default()
    }
}

async fn wait_until<T: Clone>(rx: &watch::Receiver<T>, predicate: impl FnMut(&T) -> bool) -> T {
    let mut rx = rx.clone();
    let value = timeout(WAIT, rx.wait_for(predicate))
        .await
        .expect("timed out waiting for state")
        .expect("session task stopped")
        .clone();
    value
}

fn stroke_json(id: &str, points: &[(f64, f64)]) -> String {
    let points: Vec<Value> = points
        .iter()
        .map(|(x, y)| serde_json::json!({ "x": x, "y": y }))
        .collect();
    serde_json::json!({
        "id": id,
        "tool": "pen",
        "color": "#000000",
        "width": 3,
        "points": points,
    })
    .to_string()
}

#[tokio::test]
async fn test_initial_sync_replaces_canvas() {
    let init = format!(
        r#"{{"type":"INIT","data":[{},{}]}}"#,
        stroke_json("a", &[(0.0, 0.0)]),
        stroke_json("b", &[(1.0, 1.0), (2.0, 2.0)])
    );
    let relay = Relay::start(RelayOptions {
        init: Some(init),
        answer_pings: true,
    })
    .await;

    let handle = spawn_session(config(vec![relay.endpoint()])).unwrap();

    let strokes = wait_until(&handle.canvas_rx, |s| s.len() == 2).await;
    let ids: Vec<&str> = strokes.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b"]);

    let status = wait_until(&handle.status_rx, |s| s.state == ConnectionState::Open).await;
    assert_eq!(status.attempts, 0);
    assert_eq!(status.to_string(), format!("Connected to {}", relay.url));

    handle.shutdown().await;
}

#[tokio::test]
async fn test_offline_chat_flushes_in_order_once_relay_is_up() {
    let port = free_port().await;
    let endpoint: Endpoint = format!("ws://127.0.0.1:{}", port).parse().unwrap();
    let handle = spawn_session(config(vec![endpoint])).unwrap();

    for text in ["A", "B", "C"] {
        handle.send_chat(text).unwrap();
    }
    let chat = wait_until(&handle.chat_rx, |c| c.iter().filter(|e| e.pending).count() == 3).await;
    assert!(chat.iter().filter(|e| !e.is_system()).all(|e| e.pending));

    let mut relay = Relay::bind(port, RelayOptions::default()).await;

    let mut texts = Vec::new();
    while texts.len() < 3 {
        let (_, message) = relay.next_of_type("CHAT").await;
        assert_eq!(message["Name"], "Alice");
        texts.push(message["res"].as_str().unwrap().to_string());
    }
    assert_eq!(texts, vec!["A", "B", "C"]);

    wait_until(&handle.chat_rx, |c| c.iter().all(|e| !e.pending)).await;
    wait_until(&handle.status_rx, |s| s.queued == 0).await;

    handle.shutdown().await;
}

#[tokio::test]
async fn test_local_stroke_is_broadcast_with_full_points() {
    let mut relay = Relay::start(RelayOptions::default()).await;
    let handle = spawn_session(config(vec![relay.endpoint()])).unwrap();
    wait_until(&handle.status_rx, |s| s.state == ConnectionState::Open).await;

    let stroke = Stroke::begin(Tool::Pen, "#ff0000", 4.0, Point::new(1.0, 1.0));
    let id = stroke.id.clone();
    handle.begin_stroke(stroke).unwrap();
    handle
        .extend_stroke(&id, vec![Point::new(2.0, 2.0), Point::new(3.0, 3.0)])
        .unwrap();
    handle.end_stroke(&id).unwrap();

    let (_, first) = relay.next_of_type("DRAW").await;
    let (_, second) = relay.next_of_type("DRAW").await;
    assert_eq!(first["data"]["id"], id.as_str());
    assert_eq!(first["data"]["points"].as_array().unwrap().len(), 1);
    assert_eq!(second["data"]["points"].as_array().unwrap().len(), 3);

    handle.shutdown().await;
}

#[tokio::test]
async fn test_inbound_dispatch_survives_bad_input() {
    let mut relay = Relay::start(RelayOptions::default()).await;
    let handle = spawn_session(config(vec![relay.endpoint()])).unwrap();
    let (_, push) = relay.next_connection().await;
    wait_until(&handle.status_rx, |s| s.state == ConnectionState::Open).await;

    let frame = [
        format!(r#"{{"type":"DRAW","data":{}}}"#, stroke_json("r", &[(0.0, 0.0)])),
        "this is not json".to_string(),
        r#"{"type":"SHOUT","message":"?"}"#.to_string(),
        format!(
            r#"{{"type":"DRAW","data":{}}}"#,
            stroke_json("r", &[(0.0, 0.0), (5.0, 5.0)])
        ),
        r#"{"type":"CHAT","Name":"Bob","res":"hi"}"#.to_string(),
    ]
    .join("\n");
    push.send(Message::Text(frame)).unwrap();
    push.send(Message::Text(r#"{"type":"SYSTEM","message":"Carol joined"}"#.to_string()))
        .unwrap();

    let chat = wait_until(&handle.chat_rx, |c| c.iter().any(|e| e.text == "Carol joined")).await;
    assert!(chat.iter().any(|e| e.sender == "Bob" && e.text == "hi" && !e.pending));

    let strokes = handle.canvas_rx.borrow().clone();
    assert_eq!(strokes.len(), 2);
    let rendered = latest_per_id(&strokes);
    assert_eq!(rendered.len(), 1);
    assert_eq!(rendered[0].points.len(), 2);

    assert_eq!(handle.status_rx.borrow().state, ConnectionState::Open);

    handle.shutdown().await;
}

#[tokio::test]
async fn test_relay_close_triggers_reconnect() {
    let mut relay = Relay::start(RelayOptions::default()).await;
    let handle = spawn_session(config(vec![relay.endpoint()])).unwrap();

    let (first, push) = relay.next_connection().await;
    wait_until(&handle.status_rx, |s| s.state == ConnectionState::Open).await;

    push.send(Message::Close(None)).unwrap();

    let (second, _push) = relay.next_connection().await;
    assert!(second > first);
    wait_until(&handle.status_rx, |s| s.state == ConnectionState::Open).await;

    let chat = handle.chat_rx.borrow().clone();
    assert!(chat
        .iter()
        .any(|e| e.is_system() && e.text.starts_with("Disconnected")));

    handle.shutdown().await;
}

#[tokio::test]
async fn test_heartbeat_timeout_reconnects() {
    let mut relay = Relay::start(RelayOptions::default()).await;
    let mut config = config(vec![relay.endpoint()]);
    config.heartbeat_interval = Duration::from_millis(100);
    config.heartbeat_timeout = Duration::from_millis(250);
    let handle = spawn_session(config).unwrap();

    let (first, _push) = relay.next_connection().await;
    let (from, _) = relay.next_of_type("PING").await;
    assert_eq!(from, first);

    // The relay never answers, so the session gives up and reconnects
    let (second, _push) = relay.next_connection().await;
    assert!(second > first);

    let chat = handle.chat_rx.borrow().clone();
    assert!(chat.iter().any(|e| e.text.contains("heartbeat timeout")));

    handle.shutdown().await;
}

#[tokio::test]
async fn test_pong_keeps_connection_alive() {
    let mut relay = Relay::start(RelayOptions {
        init: None,
        answer_pings: true,
    })
    .await;
    let mut config = config(vec![relay.endpoint()]);
    config.heartbeat_interval = Duration::from_millis(50);
    config.heartbeat_timeout = Duration::from_millis(150);
    let handle = spawn_session(config).unwrap();

    relay.next_connection().await;
    for _ in 0..6 {
        relay.next_of_type("PING").await;
    }

    // Several timeouts have elapsed, but every probe was answered
    assert!(relay.connections.try_recv().is_err());
    assert_eq!(handle.status_rx.borrow().state, ConnectionState::Open);

    handle.shutdown().await;
}

#[tokio::test]
async fn test_rotation_skips_dead_endpoint() {
    let dead: Endpoint = format!("ws://127.0.0.1:{}", free_port().await)
        .parse()
        .unwrap();
    let mut relay = Relay::start(RelayOptions::default()).await;
    let live = relay.endpoint();

    let handle = spawn_session(config(vec![dead, live.clone()])).unwrap();

    relay.next_connection().await;
    let status = wait_until(&handle.status_rx, |s| s.state == ConnectionState::Open).await;
    assert_eq!(status.endpoint, Some(live));
    assert_eq!(status.attempts, 0);

    handle.shutdown().await;
}

#[tokio::test]
async fn test_join_announcement_follows_flush() {
    let port = free_port().await;
    let endpoint: Endpoint = format!("ws://127.0.0.1:{}", port).parse().unwrap();
    let mut config = config(vec![endpoint]);
    config.announce_join = true;
    let handle = spawn_session(config).unwrap();

    handle.send_chat("early").unwrap();
    wait_until(&handle.status_rx, |s| s.queued == 1).await;

    let mut relay = Relay::bind(port, RelayOptions::default()).await;
    let mut received = relay.received_texts(2).await;
    let second: Value = serde_json::from_str(&received.pop().unwrap()).unwrap();
    let first: Value = serde_json::from_str(&received.pop().unwrap()).unwrap();

    assert_eq!(first["type"], "CHAT");
    assert_eq!(first["res"], "early");
    assert_eq!(second["type"], "SYSTEM");
    assert_eq!(second["message"], "Alice joined");

    handle.shutdown().await;
}

impl Relay {
    async fn received_texts(&mut self, count: usize) -> Vec<String> {
        let mut texts = Vec::with_capacity(count);
        while texts.len() < count {
            let (_, text) = timeout(WAIT, self.received.recv())
                .await
                .expect("timed out waiting for a message")
                .expect("relay stopped");
            texts.push(text);
        }
        texts
    }
}

#[tokio::test]
async fn test_zero_heartbeat_interval_does_not_stop_session() {
    let mut relay = Relay::start(RelayOptions {
        init: None,
        answer_pings: true,
    })
    .await;
    let handle = spawn_session(SessionConfig {
        heartbeat_interval: Duration::ZERO,
        ..config(vec![relay.endpoint()])
    })
    .unwrap();

    wait_until(&handle.status_rx, |s| s.state == ConnectionState::Open).await;
    relay.next_of_type("PING").await;

    handle.send_chat("still here").unwrap();
    let (_, message) = relay.next_of_type("CHAT").await;
    assert_eq!(message["res"], "still here");
    assert!(handle.status_rx.has_changed().is_ok());

    handle.shutdown().await;
}
