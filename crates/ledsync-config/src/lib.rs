//! Shared configuration for ledsync tools.
//!
//! TOML device profiles merged with `LEDSYNC_` environment variables,
//! translation to `ledsync_core::SyncConfig`, and loading of the zone
//! document that names segment ranges.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use ledsync_core::{SyncConfig, TlsVerification, TransportMode, ZoneDefinition, ZoneDocument};

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no profile named '{name}'")]
    UnknownProfile { name: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid zone document {path}: {reason}")]
    ZoneDocument { path: PathBuf, reason: String },
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Default profile name.
    pub default_profile: Option<String>,

    /// Global defaults.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named device profiles.
    #[serde(default)]
    pub profiles: HashMap<String, DeviceProfile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

impl Config {
    /// Resolve `name`, or the default profile when `None`.
    pub fn profile<'a>(
        &'a self,
        name: Option<&'a str>,
    ) -> Result<(&'a str, &'a DeviceProfile), ConfigError> {
        let name = name
            .or(self.default_profile.as_deref())
            .unwrap_or("default");
        self.profiles
            .get(name)
            .map(|p| (name, p))
            .ok_or_else(|| ConfigError::UnknownProfile { name: name.into() })
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,

    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            timeout: default_timeout(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}
fn default_timeout() -> u64 {
    10
}

/// Which channel a profile uses for canonical state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[default]
    Realtime,
    Polling,
}

/// A named device profile.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeviceProfile {
    /// Device base URL (e.g., "http://192.168.1.50").
    pub url: String,

    #[serde(default)]
    pub transport: TransportKind,

    /// Switch to polling once realtime reconnects are exhausted.
    #[serde(default = "default_true")]
    pub fallback_to_polling: bool,

    /// Force a secure realtime channel (consumer served over TLS).
    #[serde(default)]
    pub secure_context: bool,

    /// Accept invalid TLS certificates.
    pub insecure: Option<bool>,

    /// Path to custom CA certificate.
    pub ca_cert: Option<PathBuf>,

    /// Override timeout (seconds).
    pub timeout: Option<u64>,

    /// Path to a zone document for segment labels.
    pub zones: Option<PathBuf>,

    /// Poll at the background rate.
    #[serde(default)]
    pub background: bool,
}

fn default_true() -> bool {
    true
}

impl DeviceProfile {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            transport: TransportKind::default(),
            fallback_to_polling: true,
            secure_context: false,
            insecure: None,
            ca_cert: None,
            timeout: None,
            zones: None,
            background: false,
        }
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("org", "ledsync", "ledsync").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("ledsync");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the default file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from an explicit file + environment. A missing file is not an error.
///
/// Environment keys nest on `__`: `LEDSYNC_DEFAULTS__TIMEOUT=5`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("LEDSYNC_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if the file doesn't exist.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Profile translation ─────────────────────────────────────────────

/// Build a `SyncConfig` from a profile. Library tunables (debounce,
/// reconnect budget) keep their defaults.
pub fn profile_to_sync_config(
    profile: &DeviceProfile,
    defaults: &Defaults,
) -> Result<SyncConfig, ConfigError> {
    let url: url::Url = profile.url.parse().map_err(|_| ConfigError::Validation {
        field: "url".into(),
        reason: format!("invalid URL: {}", profile.url),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::Validation {
            field: "url".into(),
            reason: format!("expected http or https, got '{}'", url.scheme()),
        });
    }

    let tls = if profile.insecure.unwrap_or(false) {
        TlsVerification::DangerAcceptInvalid
    } else if let Some(ref ca_path) = profile.ca_cert {
        TlsVerification::CustomCa(ca_path.clone())
    } else {
        TlsVerification::SystemDefaults
    };

    let transport = match profile.transport {
        TransportKind::Realtime => TransportMode::Realtime {
            fallback_to_polling: profile.fallback_to_polling,
        },
        TransportKind::Polling => TransportMode::Polling,
    };

    let mut config = SyncConfig::new(url);
    config.secure_context = profile.secure_context;
    config.transport = transport;
    config.tls = tls;
    config.timeout = Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout));
    Ok(config)
}

// ── Zone documents ──────────────────────────────────────────────────

/// Read a zone document. Newer document versions load with a warning.
pub fn load_zone_document(path: &Path) -> Result<ZoneDocument, ConfigError> {
    let raw = std::fs::read_to_string(path)?;
    let doc: ZoneDocument =
        serde_json::from_str(&raw).map_err(|e| ConfigError::ZoneDocument {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

    if doc.version != ZoneDocument::CURRENT_VERSION {
        tracing::warn!(
            version = doc.version,
            supported = ZoneDocument::CURRENT_VERSION,
            path = %path.display(),
            "unknown zone document version, loading anyway"
        );
    }
    Ok(doc)
}

/// The zone definitions from a document file.
pub fn load_zones(path: &Path) -> Result<Vec<ZoneDefinition>, ConfigError> {
    load_zone_document(path).map(|doc| doc.segments)
}

// ── Tests ───────────────────────────────────────────────────────────
