/*
[INPUT]:  Test configuration and mock venue requirements
[OUTPUT]: Shared test utilities: in-process mock venue, config fixtures, polling helpers
[POS]:    Test infrastructure - shared across all test modules
[UPDATE]: When adding new test patterns or venue behaviors
*/

//! Common test utilities for venue-ws-adapter tests

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use venue_ws_adapter::ClientConfig;

/// How the mock venue answers login requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginReply {
    Accept,
    Reject,
    Ignore,
}

#[derive(Debug, Clone, Copy)]
pub struct VenueBehavior {
    pub login: LoginReply,
    pub answer_ping: bool,
    pub ack_subscribe: bool,
}

impl Default for VenueBehavior {
    fn default() -> Self {
        Self {
            login: LoginReply::Accept,
            answer_ping: true,
            ack_subscribe: false,
        }
    }
}

#[derive(Debug, Clone)]
struct Connection {
    received: Arc<Mutex<Vec<String>>>,
    tx: mpsc::UnboundedSender<Message>,
    kill: CancellationToken,
}

/// In-process WebSocket venue on 127.0.0.1 that records every text frame
pub struct MockVenue {
    url: String,
    connections: Arc<Mutex<Vec<Connection>>>,
    accept_task: JoinHandle<()>,
}

impl MockVenue {
    pub async fn start(behavior: VenueBehavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock venue");
        let addr = listener.local_addr().expect("mock venue addr");
        let connections = Arc::new(Mutex::new(Vec::new()));

        let registered = connections.clone();
        let accept_task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let Ok(ws) = accept_async(stream).await else {
                    continue;
                };
                let (tx, rx) = mpsc::unbounded_channel();
                let connection = Connection {
                    received: Arc::new(Mutex::new(Vec::new())),
                    tx,
                    kill: CancellationToken::new(),
                };
                registered.lock().push(connection.clone());
                tokio::spawn(serve(ws, connection, rx, behavior));
            }
        });

        Self {
            url: format!("ws://{addr}"),
            connections,
            accept_task,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn connection_count(&self) -> usize {
        self.connections.lock().len()
    }

    /// Text frames received on connection `index`, in arrival order
    pub fn received(&self, index: usize) -> Vec<String> {
        self.connections
            .lock()
            .get(index)
            .map(|c| c.received.lock().clone())
            .unwrap_or_default()
    }

    /// Received frames parsed as JSON, skipping bare liveness strings
    pub fn received_json(&self, index: usize) -> Vec<serde_json::Value> {
        self.received(index)
            .iter()
            .filter_map(|text| serde_json::from_str(text).ok())
            .collect()
    }

    /// Push a text frame to the client on connection `index`
    pub fn push(&self, index: usize, text: impl Into<String>) {
        let text: String = text.into();
        if let Some(connection) = self.connections.lock().get(index) {
            let _ = connection.tx.send(Message::text(text));
        }
    }

    pub fn push_binary(&self, index: usize, bytes: Vec<u8>) {
        if let Some(connection) = self.connections.lock().get(index) {
            let _ = connection.tx.send(Message::binary(bytes));
        }
    }

    /// Close connection `index` from the venue side
    pub fn drop_connection(&self, index: usize) {
        if let Some(connection) = self.connections.lock().get(index) {
            connection.kill.cancel();
        }
    }
}

impl Drop for MockVenue {
    fn drop(&mut self) {
        self.accept_task.abort();
        for connection in self.connections.lock().iter() {
            connection.kill.cancel();
        }
    }
}

async fn serve(
    ws: tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>,
    connection: Connection,
    mut rx: mpsc::UnboundedReceiver<Message>,
    behavior: VenueBehavior,
) {
    let (mut sink, mut stream) = ws.split();
    loop {
        tokio::select! {
            _ = connection.kill.cancelled() => {
                let _ = sink.send(Message::Close(None)).await;
                return;
            }
            Some(outgoing) = rx.recv() => {
                if sink.send(outgoing).await.is_err() {
                    return;
                }
            }
            incoming = stream.next() => {
                let text = match incoming {
                    Some(Ok(Message::Text(text))) => text.to_string(),
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return,
                    Some(Ok(_)) => continue,
                };
                connection.received.lock().push(text.clone());
                for reply in replies(&text, behavior) {
                    if sink.send(Message::text(reply)).await.is_err() {
                        return;
                    }
                }
            }
        }
    }
}

fn replies(text: &str, behavior: VenueBehavior) -> Vec<String> {
    if text == "ping" {
        return if behavior.answer_ping {
            vec!["pong".to_string()]
        } else {
            Vec::new()
        };
    }

    let Ok(request) = serde_json::from_str::<serde_json::Value>(text) else {
        return Vec::new();
    };
    match request["op"].as_str() {
        Some("login") => match behavior.login {
            LoginReply::Accept => vec![r#"{"event":"login","code":0}"#.to_string()],
            LoginReply::Reject => {
                vec![r#"{"event":"error","code":30005,"msg":"Invalid sign"}"#.to_string()]
            }
            LoginReply::Ignore => Vec::new(),
        },
        Some("subscribe") if behavior.ack_subscribe => request["args"]
            .as_array()
            .into_iter()
            .flatten()
            .map(|arg| serde_json::json!({"event": "subscribe", "arg": arg}).to_string())
            .collect(),
        _ => Vec::new(),
    }
}

/// Client config with short timings suited to tests
pub fn fast_config(url: &str) -> ClientConfig {
    ClientConfig::public(url)
        .with_reconnect_initial_delay(Duration::from_millis(20))
        .with_reconnect_timeout(Duration::from_millis(100))
        .with_reconnect_jitter(Duration::ZERO)
        .with_login_timeout(Duration::from_millis(500))
        .with_connect_timeout(Duration::from_secs(2))
}

/// Poll `condition` every 10ms until it holds or `timeout` elapses
pub async fn eventually<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// A data frame as the venue would push it
pub fn data_frame(inst_type: &str, channel: &str, inst_id: &str, payload: &str) -> String {
    serde_json::json!({
        "action": "snapshot",
        "arg": {"instType": inst_type, "channel": channel, "instId": inst_id},
        "data": [{"v": payload}]
    })
    .to_string()
}

/// Subscribe request args flattened across every frame of one connection
pub fn subscribed_args(frames: &[serde_json::Value]) -> Vec<(String, String, String)> {
    frames
        .iter()
        .filter(|frame| frame["op"] == "subscribe")
        .flat_map(|frame| frame["args"].as_array().cloned().unwrap_or_default())
        .map(|arg| {
            (
                arg["instType"].as_str().unwrap_or_default().to_string(),
                arg["channel"].as_str().unwrap_or_default().to_string(),
                arg["instId"].as_str().unwrap_or_default().to_string(),
            )
        })
        .collect()
}
