// ── Wire types for the controller JSON API ──
//
// These mirror the device's `/json/state`, `/json/info` and realtime
// payloads. Full snapshots (`DeviceState`, `Segment`, `DeviceInfo`) default
// every field so older firmware that omits keys still parses; partial
// updates (`StateUpdate`, `SegmentUpdate`) keep every field optional and
// only serialize what was set.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One color slot: `[r, g, b]` or `[r, g, b, w]`.
///
/// An empty slot inside a partial update means "leave this slot as is".
pub type ColorSlot = Vec<u8>;

// ── Full snapshots ───────────────────────────────────────────────────

/// Canonical device state as pushed by the controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceState {
    /// Master power.
    pub on: bool,
    /// Master brightness, 0-255.
    pub bri: u8,
    /// Transition duration in units of 100 ms.
    pub transition: u16,
    /// Active preset id, `-1` when none.
    pub ps: i16,
    /// Active playlist id, `-1` when none.
    pub pl: i16,
    pub nl: Nightlight,
    pub udpn: UdpSync,
    /// Live data override (0 = off, 1 = until live ends, 2 = until reboot).
    pub lor: u8,
    /// Index of the main segment.
    pub mainseg: u8,
    pub seg: Vec<Segment>,
    /// Fields this crate does not model, kept verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for DeviceState {
    fn default() -> Self {
        Self {
            on: false,
            bri: 128,
            transition: 7,
            ps: -1,
            pl: -1,
            nl: Nightlight::default(),
            udpn: UdpSync::default(),
            lor: 0,
            mainseg: 0,
            seg: Vec::new(),
            extra: Map::new(),
        }
    }
}

impl DeviceState {
    /// Look up a segment by its id.
    pub fn segment(&self, id: u8) -> Option<&Segment> {
        self.seg.iter().find(|s| s.id == id)
    }

    /// The segment addressed by `mainseg`, if present.
    pub fn main_segment(&self) -> Option<&Segment> {
        self.segment(self.mainseg)
    }
}

/// Nightlight sub-state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Nightlight {
    pub on: bool,
    /// Duration in minutes.
    pub dur: u8,
    /// 0 = instant, 1 = fade, 2 = color fade, 3 = sunrise.
    pub mode: u8,
    /// Target brightness.
    pub tbri: u8,
    /// Remaining seconds, `-1` when inactive.
    pub rem: i32,
}

/// UDP sync sub-state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UdpSync {
    pub send: bool,
    pub recv: bool,
    pub sgrp: u8,
    pub rgrp: u8,
}

/// One addressable sub-range of the strip. `stop` is exclusive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Segment {
    pub id: u8,
    pub start: u16,
    pub stop: u16,
    pub len: u16,
    /// Grouping.
    pub grp: u8,
    /// Spacing.
    pub spc: u8,
    /// Offset.
    pub of: u16,
    pub on: bool,
    /// Freeze.
    pub frz: bool,
    pub bri: u8,
    pub cct: u16,
    /// Up to three color slots: primary, secondary, tertiary.
    pub col: Vec<ColorSlot>,
    /// Effect id.
    pub fx: u8,
    /// Effect speed.
    pub sx: u8,
    /// Effect intensity.
    pub ix: u8,
    pub c1: u8,
    pub c2: u8,
    pub c3: u8,
    /// Palette id.
    pub pal: u8,
    pub sel: bool,
    pub rev: bool,
    pub mi: bool,
    /// Optional inline name stored on the device.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for Segment {
    fn default() -> Self {
        Self {
            id: 0,
            start: 0,
            stop: 0,
            len: 0,
            grp: 1,
            spc: 0,
            of: 0,
            on: true,
            frz: false,
            bri: 255,
            cct: 127,
            col: Vec::new(),
            fx: 0,
            sx: 128,
            ix: 128,
            c1: 128,
            c2: 128,
            c3: 16,
            pal: 0,
            sel: false,
            rev: false,
            mi: false,
            n: None,
            extra: Map::new(),
        }
    }
}

impl Segment {
    /// A default segment covering `[start, stop)`.
    pub fn new(id: u8, start: u16, stop: u16) -> Self {
        Self {
            id,
            start,
            stop,
            len: stop.saturating_sub(start),
            ..Self::default()
        }
    }

    /// The inline name, if set and not blank.
    pub fn name(&self) -> Option<&str> {
        self.n.as_deref().filter(|n| !n.trim().is_empty())
    }
}

/// Static device information (`/json/info`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceInfo {
    /// Firmware version string.
    pub ver: String,
    /// Build id.
    pub vid: u64,
    pub name: String,
    pub leds: LedInfo,
    pub udpport: u16,
    /// Whether realtime (live) data is currently overriding effects.
    pub live: bool,
    /// Connected realtime clients, `-1` when the channel is disabled.
    pub ws: i8,
    pub fxcount: u16,
    pub palcount: u16,
    pub arch: String,
    pub mac: String,
    pub ip: String,
    pub freeheap: u32,
    /// Uptime in seconds.
    pub uptime: u64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedInfo {
    pub count: u16,
    pub rgbw: bool,
    pub fps: u16,
    pub maxseg: u8,
    /// Estimated current draw in mA.
    pub pwr: u32,
}

/// Combined `{ state, info }` payload, pushed over the realtime channel and
/// returned by `GET /json/si`. Both keys are required.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub state: DeviceState,
    pub info: DeviceInfo,
}

// ── Partial updates ──────────────────────────────────────────────────

/// A partial [`DeviceState`]. Only fields that are `Some` go on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bri: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transition: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ps: Option<i16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pl: Option<i16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nl: Option<NightlightUpdate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub udpn: Option<UdpSyncUpdate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lor: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mainseg: Option<u8>,
    /// Partial segments, keyed by `id` or applied positionally when `id` is absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seg: Option<Vec<SegmentUpdate>>,
    /// Ask the device to answer with its full state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub v: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl StateUpdate {
    /// The `{"v":true}` message that asks for an immediate full-state push.
    pub fn full_state_request() -> Self {
        Self {
            v: Some(true),
            ..Self::default()
        }
    }

    pub fn power(on: bool) -> Self {
        Self {
            on: Some(on),
            ..Self::default()
        }
    }

    pub fn brightness(bri: u8) -> Self {
        Self {
            bri: Some(bri),
            ..Self::default()
        }
    }

    /// An update touching a single segment.
    pub fn segment(update: SegmentUpdate) -> Self {
        Self {
            seg: Some(vec![update]),
            ..Self::default()
        }
    }

    /// `true` when serializing this update would produce `{}`.
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NightlightUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dur: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tbri: Option<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UdpSyncUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub send: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recv: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sgrp: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rgrp: Option<u8>,
}

/// A partial [`Segment`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SegmentUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub len: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grp: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spc: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub of: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frz: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bri: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cct: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub col: Option<Vec<ColorSlot>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fx: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sx: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ix: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub c1: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub c2: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub c3: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pal: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sel: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rev: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mi: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SegmentUpdate {
    /// An empty partial segment addressed by `id`.
    pub fn for_id(id: u8) -> Self {
        Self {
            id: Some(id),
            ..Self::default()
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────
