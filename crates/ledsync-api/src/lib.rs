// ledsync-api: Async Rust client for LED controller JSON + realtime APIs

pub mod error;
pub mod http;
pub mod transport;
pub mod types;
pub mod websocket;

pub use error::Error;
pub use http::DeviceClient;
pub use transport::{TlsMode, TransportConfig};
pub use types::{
    ColorSlot, DeviceInfo, DeviceState, LedInfo, Nightlight, NightlightUpdate, Segment,
    SegmentUpdate, StateSnapshot, StateUpdate, UdpSync, UdpSyncUpdate,
};
