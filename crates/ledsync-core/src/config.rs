// ── Runtime sync configuration ──
//
// These types describe *how* to synchronize with one device endpoint.
// They never touch disk: the CLI (via ledsync-config) builds a
// `SyncConfig` and hands it to `DeviceSync`.

use std::path::PathBuf;
use std::time::Duration;

use ledsync_api::{TlsMode, TransportConfig};
use url::Url;

/// Debounce window for coalesced outbound updates.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(50);
/// First reconnect delay; doubles per failed attempt.
pub const RECONNECT_BASE_DELAY: Duration = Duration::from_secs(1);
/// Ceiling for a single reconnect delay.
pub const RECONNECT_MAX_DELAY: Duration = Duration::from_secs(30);
/// Automatic reconnects before the manager gives up.
pub const RECONNECT_MAX_ATTEMPTS: u32 = 5;
/// Poll interval while a consumer is actively viewing the device.
pub const ACTIVE_POLL_INTERVAL: Duration = Duration::from_secs(1);
/// Poll interval for passive monitoring.
pub const BACKGROUND_POLL_INTERVAL: Duration = Duration::from_secs(15);

/// TLS verification strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store (strict).
    #[default]
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(PathBuf),
    /// Skip verification (self-signed certs on the device).
    DangerAcceptInvalid,
}

/// Which channel carries canonical state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportMode {
    /// Push-based realtime channel, optionally falling back to polling
    /// once the reconnect budget runs out.
    Realtime { fallback_to_polling: bool },
    /// Periodic pull only.
    Polling,
}

impl Default for TransportMode {
    fn default() -> Self {
        Self::Realtime {
            fallback_to_polling: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollIntervals {
    pub active: Duration,
    pub background: Duration,
}

impl Default for PollIntervals {
    fn default() -> Self {
        Self {
            active: ACTIVE_POLL_INTERVAL,
            background: BACKGROUND_POLL_INTERVAL,
        }
    }
}

/// Bounded exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl ReconnectPolicy {
    /// Delay before reconnect number `attempt` (0-based): `base * 2^attempt`,
    /// capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2_u32.saturating_pow(attempt);
        self.base_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: RECONNECT_BASE_DELAY,
            max_delay: RECONNECT_MAX_DELAY,
            max_attempts: RECONNECT_MAX_ATTEMPTS,
        }
    }
}

/// Configuration for synchronizing with a single device.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Device base URL (e.g., `http://192.168.1.50`).
    pub base_url: Url,
    /// The consumer itself runs in a secure context; forces a `wss` channel.
    pub secure_context: bool,
    pub transport: TransportMode,
    pub poll: PollIntervals,
    /// HTTP request timeout.
    pub timeout: Duration,
    pub tls: TlsVerification,
    pub debounce: Duration,
    pub reconnect: ReconnectPolicy,
}

impl SyncConfig {
    /// Defaults for everything except the device address.
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            secure_context: false,
            transport: TransportMode::default(),
            poll: PollIntervals::default(),
            timeout: Duration::from_secs(10),
            tls: TlsVerification::default(),
            debounce: DEFAULT_DEBOUNCE,
            reconnect: ReconnectPolicy::default(),
        }
    }

    pub(crate) fn transport_config(&self) -> TransportConfig {
        let tls = match &self.tls {
            TlsVerification::SystemDefaults => TlsMode::System,
            TlsVerification::CustomCa(path) => TlsMode::CustomCa(path.clone()),
            TlsVerification::DangerAcceptInvalid => TlsMode::DangerAcceptInvalid,
        };
        TransportConfig {
            tls,
            timeout: self.timeout,
        }
    }
}
