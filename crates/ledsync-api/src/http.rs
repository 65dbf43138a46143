// Device JSON API HTTP client
//
// Wraps `reqwest::Client` with endpoint URL construction and body decoding.
// This is the one-shot request/response path: initial loads, the polling
// fallback, and writes while the realtime channel is down.

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::transport::TransportConfig;
use crate::types::{DeviceInfo, DeviceState, StateSnapshot, StateUpdate};

/// Combined state + info endpoint.
pub const SNAPSHOT_PATH: &str = "json/si";
/// State endpoint (GET for the state, POST to apply a partial update).
pub const STATE_PATH: &str = "json/state";
/// Info endpoint.
pub const INFO_PATH: &str = "json/info";

/// Raw HTTP client for a single controller's JSON API.
#[derive(Debug, Clone)]
pub struct DeviceClient {
    http: reqwest::Client,
    base_url: Url,
}

impl DeviceClient {
    /// Create a client from a `TransportConfig`.
    ///
    /// `base_url` is the device root, e.g. `http://192.168.1.50`. A path
    /// prefix is kept (`https://proxy.lan/strip-1` works behind a proxy).
    pub fn new(base_url: Url, transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self { http, base_url })
    }

    /// Create a client around a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, base_url: Url) -> Self {
        Self { http, base_url }
    }

    /// Convenience constructor for tests and tools: parse `base` and use a
    /// default `reqwest::Client`.
    pub fn from_reqwest(base: &str, http: reqwest::Client) -> Result<Self, Error> {
        Ok(Self::with_client(http, Url::parse(base)?))
    }

    /// The device base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    // ── Endpoints ────────────────────────────────────────────────────

    /// `GET /json/si` -- the combined `{ state, info }` snapshot.
    pub async fn fetch_snapshot(&self) -> Result<StateSnapshot, Error> {
        self.get(self.api_url(SNAPSHOT_PATH)?).await
    }

    /// `GET /json/state`.
    pub async fn fetch_state(&self) -> Result<DeviceState, Error> {
        self.get(self.api_url(STATE_PATH)?).await
    }

    /// `GET /json/info`.
    pub async fn fetch_info(&self) -> Result<DeviceInfo, Error> {
        self.get(self.api_url(INFO_PATH)?).await
    }

    /// `POST /json/state` with a partial update.
    ///
    /// The request always carries `"v": true` so the device answers with the
    /// resulting full state instead of a bare success flag.
    pub async fn post_state(&self, update: &StateUpdate) -> Result<DeviceState, Error> {
        let mut body = update.clone();
        body.v = Some(true);
        self.post(self.api_url(STATE_PATH)?, &body).await
    }

    // ── URL builders ─────────────────────────────────────────────────

    /// Build `{base}/{path}`, keeping any path prefix on the base URL.
    pub(crate) fn api_url(&self, path: &str) -> Result<Url, Error> {
        let full = format!("{}/{}", self.base_url.as_str().trim_end_matches('/'), path);
        Ok(Url::parse(&full)?)
    }

    // ── Request helpers ──────────────────────────────────────────────

    async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<T, Error> {
        debug!("GET {}", url);

        let resp = self.http.get(url).send().await.map_err(Error::Transport)?;

        Self::parse_body(resp).await
    }

    async fn post<T: DeserializeOwned>(&self, url: Url, body: &impl Serialize) -> Result<T, Error> {
        debug!("POST {}", url);

        let resp = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(Error::Transport)?;

        Self::parse_body(resp).await
    }

    /// Check the status and decode the JSON body.
    async fn parse_body<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, Error> {
        let status = resp.status();
        let body = resp.text().await.map_err(Error::Transport)?;

        if !status.is_success() {
            return Err(Error::Http {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body,
        })
    }
}
