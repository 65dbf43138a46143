// ── Zone label resolution ──
//
// Gives every runtime segment a display label. Segments are volatile and
// position-addressed; zones are stable and named. A segment takes a zone's
// name only when both ends of its range match exactly.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::model::{Segment, SegmentLabel, ZoneDefinition};

const ELLIPSIS: char = '\u{2026}';

/// Linear scan for the zone whose `[start, stop)` equals the segment's.
///
/// First match wins when several zones share a range.
pub fn find_matching_zone<'a>(
    segment: &Segment,
    zones: &'a [ZoneDefinition],
) -> Option<&'a ZoneDefinition> {
    zones
        .iter()
        .find(|z| z.start == segment.start && z.stop == segment.stop)
}

/// Label one segment: zone name, then inline name, then `"Segment {n}"`.
///
/// Without the surrounding list the fallback numbers by id, which equals
/// the 1-based position while ids are dense.
pub fn segment_label(
    segment: &Segment,
    zones: &[ZoneDefinition],
    max_len: Option<usize>,
) -> SegmentLabel {
    build_label(segment, find_matching_zone(segment, zones), usize::from(segment.id), max_len)
}

/// Label every segment, keyed by segment id. No truncation.
pub fn label_all(segments: &[Segment], zones: &[ZoneDefinition]) -> BTreeMap<u8, SegmentLabel> {
    label_all_with(segments, zones, None)
}

/// [`label_all`] with an optional display length limit. Fallback labels
/// number segments by their position in `segments`.
pub fn label_all_with(
    segments: &[Segment],
    zones: &[ZoneDefinition],
    max_len: Option<usize>,
) -> BTreeMap<u8, SegmentLabel> {
    let index = ZoneIndex::new(zones);
    segments
        .iter()
        .enumerate()
        .map(|(position, s)| (s.id, build_label(s, index.find(s), position, max_len)))
        .collect()
}

/// Zone coverage of a set of segments.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchStatistics {
    pub total: usize,
    pub matched: usize,
    pub unmatched: usize,
    /// Percentage of segments with a matching zone; `0.0` when there are none.
    pub match_rate: f64,
}

pub fn match_statistics(segments: &[Segment], zones: &[ZoneDefinition]) -> MatchStatistics {
    let index = ZoneIndex::new(zones);
    let total = segments.len();
    let matched = segments.iter().filter(|s| index.find(s).is_some()).count();

    MatchStatistics {
        total,
        matched,
        unmatched: total - matched,
        match_rate: percentage(matched, total),
    }
}

#[allow(clippy::cast_precision_loss, clippy::as_conversions)]
fn percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    part as f64 / whole as f64 * 100.0
}

// ── ZoneIndex ────────────────────────────────────────────────────────

/// Zones pre-indexed by `(start, stop)` for constant-time lookup.
///
/// Keeps the first definition for a duplicated range, so lookups agree
/// with [`find_matching_zone`].
pub struct ZoneIndex<'a> {
    by_range: HashMap<(u16, u16), &'a ZoneDefinition>,
}

impl<'a> ZoneIndex<'a> {
    pub fn new(zones: &'a [ZoneDefinition]) -> Self {
        let mut by_range = HashMap::with_capacity(zones.len());
        for zone in zones {
            by_range.entry(zone.range()).or_insert(zone);
        }
        Self { by_range }
    }

    pub fn find(&self, segment: &Segment) -> Option<&'a ZoneDefinition> {
        self.by_range.get(&(segment.start, segment.stop)).copied()
    }

    /// Same fallback numbering as [`segment_label`].
    pub fn label(&self, segment: &Segment, max_len: Option<usize>) -> SegmentLabel {
        build_label(segment, self.find(segment), usize::from(segment.id), max_len)
    }
}

// ── Label construction ───────────────────────────────────────────────

/// `position` is 0-based.
fn build_label(
    segment: &Segment,
    zone: Option<&ZoneDefinition>,
    position: usize,
    max_len: Option<usize>,
) -> SegmentLabel {
    let name = zone
        .map(|z| z.name.clone())
        .or_else(|| segment.name().map(str::to_owned))
        .unwrap_or_else(|| format!("Segment {}", position + 1));

    truncate(name, max_len)
}

/// Truncate to `max_len` characters plus an ellipsis, keeping the original
/// as the tooltip. Counts characters, never splitting a code point.
fn truncate(name: String, max_len: Option<usize>) -> SegmentLabel {
    match max_len {
        Some(max) if name.chars().count() > max => {
            let mut display: String = name.chars().take(max).collect();
            display.push(ELLIPSIS);
            SegmentLabel {
                display,
                tooltip: Some(name),
            }
        }
        _ => SegmentLabel {
            display: name,
            tooltip: None,
        },
    }
}

// ── Tests ────────────────────────────────────────────────────────────
