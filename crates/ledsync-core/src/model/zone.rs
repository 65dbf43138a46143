// ── Zone domain types ──

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A named, range-addressed logical zone ("global segment").
///
/// Independent of any particular state snapshot: a runtime segment gets
/// this zone's name only while its `[start, stop)` matches exactly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneDefinition {
    /// Stable, locally generated identifier.
    pub id: String,
    pub start: u16,
    /// Exclusive.
    pub stop: u16,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
}

impl ZoneDefinition {
    /// A new zone with a freshly generated id.
    pub fn new(start: u16, stop: u16, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            start,
            stop,
            name: name.into(),
            group_id: None,
        }
    }

    pub fn range(&self) -> (u16, u16) {
        (self.start, self.stop)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneGroup {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

/// The persisted zone document, as stored on the device filesystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneDocument {
    pub version: u32,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub last_modified: Option<DateTime<Utc>>,
    #[serde(default)]
    pub segments: Vec<ZoneDefinition>,
    #[serde(default)]
    pub groups: Vec<ZoneGroup>,
}

impl ZoneDocument {
    /// The document version this crate writes.
    pub const CURRENT_VERSION: u32 = 1;
}

impl Default for ZoneDocument {
    fn default() -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            last_modified: None,
            segments: Vec::new(),
            groups: Vec::new(),
        }
    }
}

/// Display label for one runtime segment. Derived on demand, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SegmentLabel {
    /// Possibly truncated.
    pub display: String,
    /// The untruncated name, present only when `display` was truncated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tooltip: Option<String>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn new_zones_get_distinct_ids() {
        let a = ZoneDefinition::new(0, 10, "Desk");
        let b = ZoneDefinition::new(0, 10, "Desk");
        assert_ne!(a.id, b.id);
        assert_eq!(a.range(), (0, 10));
    }

    #[test]
    fn parse_zone_document() {
        let raw = json!({
            "version": 1,
            "lastModified": 1_760_000_000_000_i64,
            "segments": [
                { "id": "z1", "start": 0, "stop": 50, "name": "Desk", "groupId": "g1" },
                { "id": "z2", "start": 50, "stop": 120, "name": "Shelf" }
            ],
            "groups": [{ "id": "g1", "name": "Office" }]
        });

        let doc: ZoneDocument = serde_json::from_value(raw).unwrap();
        assert_eq!(doc.segments.len(), 2);
        assert_eq!(doc.segments[0].group_id.as_deref(), Some("g1"));
        assert!(doc.segments[1].group_id.is_none());
        assert_eq!(doc.groups[0].name, "Office");
        assert_eq!(doc.last_modified.unwrap().timestamp(), 1_760_000_000);
    }

    #[test]
    fn minimal_document_defaults() {
        let doc: ZoneDocument = serde_json::from_str(r#"{"version":1}"#).unwrap();
        assert!(doc.segments.is_empty());
        assert!(doc.last_modified.is_none());
    }
}
