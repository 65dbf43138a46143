// ── Core error types ──
//
// User-facing errors from ledsync-core. Consumers never see raw HTTP
// status codes or frame parse failures. The `From<ledsync_api::Error>`
// impl translates transport-layer errors into domain variants.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot connect to device at {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Device unavailable: {reason}")]
    DeviceUnavailable { reason: String },

    #[error("Device request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    // ── API errors (wrapped, not exposed raw) ────────────────────────
    #[error("API error: {message}")]
    Api {
        message: String,
        /// HTTP status code (if applicable).
        status: Option<u16>,
    },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Lifecycle errors ─────────────────────────────────────────────
    #[error("Sync already started")]
    AlreadyStarted,

    #[error("Sync not started")]
    NotStarted,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// `true` for failures a later retry may resolve.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailed { .. } | Self::DeviceUnavailable { .. } | Self::Timeout { .. }
        )
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<ledsync_api::Error> for CoreError {
    fn from(err: ledsync_api::Error) -> Self {
        match err {
            ledsync_api::Error::Transport(ref e) => {
                if e.is_timeout() {
                    CoreError::Timeout { timeout_secs: 0 }
                } else if e.is_connect() {
                    CoreError::ConnectionFailed {
                        url: e
                            .url()
                            .map_or_else(|| "<unknown>".into(), ToString::to_string),
                        reason: e.to_string(),
                    }
                } else {
                    CoreError::Api {
                        message: e.to_string(),
                        status: e.status().map(|s| s.as_u16()),
                    }
                }
            }
            ledsync_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            ledsync_api::Error::UnsupportedScheme(scheme) => CoreError::Config {
                message: format!("Unsupported URL scheme: {scheme}"),
            },
            ledsync_api::Error::Tls(msg) => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("TLS error: {msg}"),
            },
            ledsync_api::Error::Http { status, body } if status >= 500 => {
                CoreError::DeviceUnavailable {
                    reason: format!("HTTP {status}: {body}"),
                }
            }
            ledsync_api::Error::Http { status, body } => CoreError::Api {
                message: body,
                status: Some(status),
            },
            ledsync_api::Error::WebSocketConnect(reason) => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("Realtime channel failed: {reason}"),
            },
            ledsync_api::Error::WebSocketClosed { code, reason } => CoreError::DeviceUnavailable {
                reason: format!("Realtime channel closed (code {code}): {reason}"),
            },
            ledsync_api::Error::Deserialization { message, body: _ } => {
                CoreError::Internal(format!("Deserialization error: {message}"))
            }
            ledsync_api::Error::MalformedMessage(message) => {
                CoreError::Internal(format!("Malformed message: {message}"))
            }
        }
    }
}
