// ledsync-core: Device state synchronization between ledsync-api and consumers (CLI).

pub mod coalescer;
pub mod config;
pub mod connection;
pub mod error;
pub mod labels;
pub mod merge;
pub mod model;
pub mod polling;
pub mod stream;
pub mod sync;
pub mod transport;

// ── Primary re-exports ──────────────────────────────────────────────
pub use coalescer::UpdateCoalescer;
pub use config::{PollIntervals, ReconnectPolicy, SyncConfig, TlsVerification, TransportMode};
pub use connection::ConnectionManager;
pub use error::CoreError;
pub use labels::{
    MatchStatistics, ZoneIndex, find_matching_zone, label_all, label_all_with, match_statistics,
    segment_label,
};
pub use merge::{merge_state, merge_update};
pub use polling::PollingAdapter;
pub use stream::{Slot, StateStream, StateWatchStream};
pub use sync::DeviceSync;
pub use transport::{ConnectionEvent, ConnectionStatus, InboundState, UpdateSink};

// Re-export model types at the crate root for ergonomics.
pub use model::{
    ColorSlot, DeviceInfo, DeviceState, Segment, SegmentLabel, SegmentUpdate, StateSnapshot,
    StateUpdate, ZoneDefinition, ZoneDocument, ZoneGroup,
};
