// Shared fixtures: an in-process realtime device built on tokio-tungstenite.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

pub const WAIT: Duration = Duration::from_secs(5);

/// Wait for `fut` or fail the test.
pub async fn within<T>(fut: impl Future<Output = T>) -> T {
    tokio::time::timeout(WAIT, fut).await.expect("timed out")
}

pub fn snapshot(bri: u8) -> String {
    json!({
        "state": {
            "on": true,
            "bri": bri,
            "seg": [
                { "id": 0, "start": 0, "stop": 30, "len": 30 },
                { "id": 1, "start": 30, "stop": 60, "len": 30, "n": "Shelf" }
            ]
        },
        "info": { "ver": "0.14.4", "name": "Test Strip", "leds": { "count": 60 } }
    })
    .to_string()
}

/// How the fake device behaves on each accepted connection.
#[derive(Clone, Default)]
pub struct Script {
    /// Text frames pushed after the client asks for full state.
    pub pushes: Vec<String>,
    /// Answer every non-`v` frame with this snapshot, like the real device.
    pub echo: Option<String>,
    /// Close the first connection right after the handshake.
    pub close_first: bool,
}

pub struct TestDevice {
    pub base: Url,
    /// Every text frame the device received, in order.
    pub frames: mpsc::UnboundedReceiver<Value>,
    accepted: Arc<AtomicUsize>,
}

impl TestDevice {
    pub async fn start(script: Script) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, frames) = mpsc::unbounded_channel();
        let accepted = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&accepted);
        tokio::spawn(async move {
            while let Ok((tcp, _)) = listener.accept().await {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                let script = script.clone();
                let tx = tx.clone();
                tokio::spawn(async move {
                    let Ok(mut ws) = accept_async(tcp).await else {
                        return;
                    };
                    if script.close_first && n == 1 {
                        let _ = ws.close(None).await;
                        return;
                    }
                    while let Some(Ok(msg)) = ws.next().await {
                        let text = match msg {
                            Message::Text(text) => text,
                            Message::Close(_) => break,
                            _ => continue,
                        };
                        let value: Value = serde_json::from_str(text.as_str()).unwrap();
                        let wants_full_state = value == json!({ "v": true });
                        let _ = tx.send(value);

                        let replies = if wants_full_state {
                            script.pushes.clone()
                        } else {
                            script.echo.clone().into_iter().collect()
                        };
                        for reply in replies {
                            if ws.send(Message::text(reply)).await.is_err() {
                                return;
                            }
                        }
                    }
                });
            }
        });

        Self {
            base: Url::parse(&format!("http://{addr}")).unwrap(),
            frames,
            accepted,
        }
    }

    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    pub async fn next_frame(&mut self) -> Value {
        within(self.frames.recv()).await.unwrap()
    }
}

/// A local address with nothing listening on it.
pub async fn dead_address() -> Url {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    drop(listener);
    Url::parse(&format!("http://{addr}")).unwrap()
}
