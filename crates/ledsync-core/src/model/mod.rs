// ── Domain model ──
//
// Device state types come straight from the wire crate: the controller's
// JSON *is* the canonical model, and partial updates are merged structurally
// rather than converted. Zone definitions and labels are local concepts.

mod zone;

pub use ledsync_api::types::{
    ColorSlot, DeviceInfo, DeviceState, LedInfo, Nightlight, NightlightUpdate, Segment,
    SegmentUpdate, StateSnapshot, StateUpdate, UdpSync, UdpSyncUpdate,
};
pub use zone::{SegmentLabel, ZoneDefinition, ZoneDocument, ZoneGroup};
