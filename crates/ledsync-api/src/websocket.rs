//! Realtime channel: one WebSocket session with the controller.
//!
//! The controller pushes a combined `{ state, info }` payload on every state
//! change and accepts partial [`StateUpdate`]s as text frames. This module
//! only knows about a single session: endpoint derivation, opening, framing
//! and parsing. Reconnect policy lives with the connection manager in
//! `ledsync-core`.
//!
//! # Example
//!
//! ```rust,ignore
//! use ledsync_api::websocket::{realtime_url, RealtimeEvent, RealtimeSession};
//!
//! let url = realtime_url(&"http://192.168.1.50".parse()?, false)?;
//! let mut session = RealtimeSession::open(&url).await?;
//! session.send(&StateUpdate::full_state_request()).await?;
//!
//! while let Ok(event) = session.recv().await {
//!     match event {
//!         RealtimeEvent::Snapshot(snap) => println!("bri = {}", snap.state.bri),
//!         RealtimeEvent::Malformed(e) => eprintln!("skipped: {e}"),
//!         RealtimeEvent::Closed { .. } => break,
//!     }
//! }
//! ```

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::error::Error;
use crate::types::{StateSnapshot, StateUpdate};

/// Realtime endpoint path, relative to the device root.
pub const REALTIME_PATH: &str = "ws";

type RealtimeStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ── Endpoint derivation ──────────────────────────────────────────────

/// Derive the realtime endpoint from the device base URL.
///
/// `http` maps to `ws` and `https` to `wss`. When `secure_context` is set
/// (the consumer itself is served over TLS), the channel is always `wss`:
/// an insecure channel is never opened from a secure context.
pub fn realtime_url(base: &Url, secure_context: bool) -> Result<Url, Error> {
    let scheme = match (base.scheme(), secure_context) {
        ("https" | "wss", _) | ("http" | "ws", true) => "wss",
        ("http" | "ws", false) => "ws",
        (other, _) => return Err(Error::UnsupportedScheme(other.to_owned())),
    };

    let host = base
        .host_str()
        .ok_or_else(|| Error::UnsupportedScheme(format!("{base} has no host")))?;
    let authority = match base.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_owned(),
    };
    let prefix = base.path().trim_end_matches('/');

    Ok(Url::parse(&format!(
        "{scheme}://{authority}{prefix}/{REALTIME_PATH}"
    ))?)
}

// ── Message parsing ──────────────────────────────────────────────────

/// Parse a realtime text frame into a snapshot.
///
/// Anything that is not an object with both `state` and `info` is rejected.
pub fn parse_snapshot(text: &str) -> Result<StateSnapshot, Error> {
    serde_json::from_str(text).map_err(|e| Error::MalformedMessage(e.to_string()))
}

/// Encode an outbound update as a text frame.
pub fn encode_update(update: &StateUpdate) -> Result<String, Error> {
    serde_json::to_string(update).map_err(|e| Error::Deserialization {
        message: e.to_string(),
        body: String::new(),
    })
}

// ── Session ──────────────────────────────────────────────────────────

/// What a read from the channel produced.
#[derive(Debug)]
pub enum RealtimeEvent {
    /// A well-formed `{ state, info }` push.
    Snapshot(Box<StateSnapshot>),
    /// A text frame that failed to parse. The session stays usable.
    Malformed(Error),
    /// The device closed the channel, or the stream ended.
    Closed { code: Option<u16>, reason: String },
}

/// A single open realtime channel.
pub struct RealtimeSession {
    stream: RealtimeStream,
}

impl RealtimeSession {
    /// Open the channel. Resolves once the WebSocket handshake completes.
    pub async fn open(url: &Url) -> Result<Self, Error> {
        tracing::info!(url = %url, "Connecting to realtime channel");

        let (stream, _response) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| Error::WebSocketConnect(e.to_string()))?;

        tracing::info!("Realtime channel open");
        Ok(Self { stream })
    }

    /// Read until the next meaningful event.
    ///
    /// Cancel-safe: dropping the future between frames loses nothing.
    pub async fn recv(&mut self) -> Result<RealtimeEvent, Error> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    return Ok(match parse_snapshot(text.as_str()) {
                        Ok(snapshot) => RealtimeEvent::Snapshot(Box::new(snapshot)),
                        Err(e) => RealtimeEvent::Malformed(e),
                    });
                }
                Some(Ok(Message::Ping(_))) => {
                    // tungstenite queues the pong; it goes out with the next write or read
                    tracing::trace!("Realtime ping");
                }
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = frame.map_or((None, String::new()), |cf| {
                        (Some(u16::from(cf.code)), cf.reason.to_string())
                    });
                    tracing::info!(?code, reason = %reason, "Realtime close frame received");
                    return Ok(RealtimeEvent::Closed { code, reason });
                }
                Some(Err(e)) => return Err(map_ws_error(e)),
                None => {
                    tracing::info!("Realtime stream ended");
                    return Ok(RealtimeEvent::Closed {
                        code: None,
                        reason: String::new(),
                    });
                }
                Some(Ok(_)) => {
                    // Binary, Pong, raw Frame -- the controller never sends these meaningfully
                }
            }
        }
    }

    /// Send one update as a text frame.
    pub async fn send(&mut self, update: &StateUpdate) -> Result<(), Error> {
        let text = encode_update(update)?;
        self.stream
            .send(Message::text(text))
            .await
            .map_err(map_ws_error)
    }

    /// Send a close frame and wait for the stream to flush.
    pub async fn close(mut self) {
        if let Err(e) = self.stream.close(None).await {
            tracing::debug!(error = %e, "Realtime close handshake failed");
        }
    }
}

fn map_ws_error(err: tungstenite::Error) -> Error {
    match err {
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
            Error::WebSocketClosed {
                code: 1006,
                reason: err.to_string(),
            }
        }
        other => Error::WebSocketConnect(other.to_string()),
    }
}

// ── Tests ────────────────────────────────────────────────────────────
