// ── State merge engine ──
//
// Pure structural merges between full snapshots and partial updates.
// Nothing here mutates its inputs: both functions clone and return a new
// value, so the pending buffer, the optimistic overlay and the canonical
// snapshot can always be inspected independently.

use serde_json::{Map, Value};
use tracing::debug;

use crate::model::{ColorSlot, DeviceState, Segment, SegmentUpdate, StateUpdate};

/// Copy every `Some` field of a partial onto a full value.
macro_rules! patch_fields {
    ($target:expr, $patch:expr; $($field:ident),+ $(,)?) => {
        $(
            if let Some(value) = &$patch.$field {
                $target.$field = value.clone();
            }
        )+
    };
}

/// Let every `Some` field of the newer partial win over the older one.
macro_rules! overlay_fields {
    ($older:expr, $newer:expr; $($field:ident),+ $(,)?) => {
        $(
            if $newer.$field.is_some() {
                $older.$field = $newer.$field.clone();
            }
        )+
    };
}

// ── Full state + partial ─────────────────────────────────────────────

/// Apply a partial update on top of a full state.
///
/// Scalars replace, the nightlight and sync sub-objects merge field by
/// field, and segments merge by `id` (positionally when a partial carries
/// no `id`). Segments the update does not reference are left untouched.
pub fn merge_state(base: &DeviceState, update: &StateUpdate) -> DeviceState {
    let mut out = base.clone();

    patch_fields!(out, update; on, bri, transition, ps, pl, lor, mainseg);

    if let Some(nl) = &update.nl {
        patch_fields!(out.nl, nl; on, dur, mode, tbri);
    }
    if let Some(udpn) = &update.udpn {
        patch_fields!(out.udpn, udpn; send, recv, sgrp, rgrp);
    }
    if let Some(partials) = &update.seg {
        merge_segments(&mut out.seg, partials);
    }

    merge_json(&mut out.extra, &update.extra);
    out
}

fn merge_segments(base: &mut Vec<Segment>, partials: &[SegmentUpdate]) {
    for (index, partial) in partials.iter().enumerate() {
        match partial.id {
            Some(id) => {
                if let Some(segment) = base.iter_mut().find(|s| s.id == id) {
                    apply_segment(segment, partial);
                } else if let Some(segment) = new_segment(id, partial) {
                    let pos = base.partition_point(|s| s.id < id);
                    base.insert(pos, segment);
                } else {
                    debug!(id, "partial segment has no match and no range, ignored");
                }
            }
            None => {
                if let Some(segment) = base.get_mut(index) {
                    apply_segment(segment, partial);
                } else {
                    debug!(index, "positional partial segment beyond base, ignored");
                }
            }
        }
    }
}

/// A segment the device does not have yet. Only partials that carry a
/// valid range describe a segment the device would create.
fn new_segment(id: u8, partial: &SegmentUpdate) -> Option<Segment> {
    match (partial.start, partial.stop) {
        (Some(start), Some(stop)) if start < stop => {
            let mut segment = Segment::new(id, start, stop);
            apply_segment(&mut segment, partial);
            Some(segment)
        }
        _ => None,
    }
}

fn apply_segment(segment: &mut Segment, partial: &SegmentUpdate) {
    let range_changed = partial.start.is_some() || partial.stop.is_some();

    patch_fields!(segment, partial;
        start, stop, len, grp, spc, of, on, frz, bri, cct,
        fx, sx, ix, c1, c2, c3, pal, sel, rev, mi,
    );

    if range_changed && partial.len.is_none() {
        segment.len = segment.stop.saturating_sub(segment.start);
    }
    if let Some(name) = &partial.n {
        segment.n = Some(name.clone());
    }
    if let Some(col) = &partial.col {
        segment.col = merge_color_slots(&segment.col, col);
    }

    merge_json(&mut segment.extra, &partial.extra);
}

// ── Partial + partial ────────────────────────────────────────────────

/// Combine two partial updates; fields set in `newer` win.
///
/// Segment entries with the same `id` fold into one entry (color slots by
/// index); entries for different ids accumulate.
pub fn merge_update(older: &StateUpdate, newer: &StateUpdate) -> StateUpdate {
    let mut out = older.clone();

    overlay_fields!(out, newer; on, bri, transition, ps, pl, lor, mainseg, v);

    out.nl = match (&older.nl, &newer.nl) {
        (Some(a), Some(b)) => {
            let mut nl = a.clone();
            overlay_fields!(nl, b; on, dur, mode, tbri);
            Some(nl)
        }
        (a, b) => b.clone().or_else(|| a.clone()),
    };

    out.udpn = match (&older.udpn, &newer.udpn) {
        (Some(a), Some(b)) => {
            let mut udpn = a.clone();
            overlay_fields!(udpn, b; send, recv, sgrp, rgrp);
            Some(udpn)
        }
        (a, b) => b.clone().or_else(|| a.clone()),
    };

    out.seg = match (&older.seg, &newer.seg) {
        (Some(a), Some(b)) => Some(merge_segment_updates(a, b)),
        (a, b) => b.clone().or_else(|| a.clone()),
    };

    merge_json(&mut out.extra, &newer.extra);
    out
}

fn merge_segment_updates(older: &[SegmentUpdate], newer: &[SegmentUpdate]) -> Vec<SegmentUpdate> {
    let mut out = older.to_vec();

    for (index, partial) in newer.iter().enumerate() {
        match partial.id {
            Some(id) => {
                if let Some(existing) = out.iter_mut().find(|s| s.id == Some(id)) {
                    combine_segment_update(existing, partial);
                } else {
                    out.push(partial.clone());
                }
            }
            // Legacy positional entry: its meaning is its list index.
            None => match out.get_mut(index) {
                Some(existing) if existing.id.is_none() => {
                    combine_segment_update(existing, partial);
                }
                Some(slot) => {
                    // Keyed entries apply wherever they sit, so the keyed one moves.
                    let keyed = std::mem::replace(slot, partial.clone());
                    debug!(index, id = ?keyed.id, "positional entry displaced a keyed entry");
                    out.push(keyed);
                }
                None => {
                    // Empty entries are no-ops on the device, so padding keeps the index.
                    out.resize_with(index, SegmentUpdate::default);
                    out.push(partial.clone());
                }
            },
        }
    }

    out
}

fn combine_segment_update(older: &mut SegmentUpdate, newer: &SegmentUpdate) {
    overlay_fields!(older, newer;
        start, stop, len, grp, spc, of, on, frz, bri, cct,
        fx, sx, ix, c1, c2, c3, pal, sel, rev, mi, n,
    );

    older.col = match (&older.col, &newer.col) {
        (Some(a), Some(b)) => Some(merge_color_slots(a, b)),
        (a, b) => b.clone().or_else(|| a.clone()),
    };

    merge_json(&mut older.extra, &newer.extra);
}

// ── Shared helpers ───────────────────────────────────────────────────

/// Merge color slots by index. An empty slot in `patch` keeps the base slot.
fn merge_color_slots(base: &[ColorSlot], patch: &[ColorSlot]) -> Vec<ColorSlot> {
    let len = base.len().max(patch.len());
    (0..len)
        .map(|i| match patch.get(i) {
            Some(slot) if !slot.is_empty() => slot.clone(),
            _ => base.get(i).cloned().unwrap_or_default(),
        })
        .collect()
}

/// Deep-merge JSON objects: nested objects recurse, anything else replaces.
pub(crate) fn merge_json(base: &mut Map<String, Value>, patch: &Map<String, Value>) {
    for (key, value) in patch {
        if let (Some(Value::Object(existing)), Value::Object(incoming)) = (base.get_mut(key), value)
        {
            merge_json(existing, incoming);
        } else {
            base.insert(key.clone(), value.clone());
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::{NightlightUpdate, UdpSyncUpdate};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn base_state() -> DeviceState {
        let mut s0 = Segment::new(0, 0, 50);
        s0.col = vec![vec![255, 0, 0], vec![0, 255, 0], vec![0, 0, 255]];
        let s1 = Segment::new(1, 50, 100);
        let mut s2 = Segment::new(2, 100, 150);
        s2.n = Some("Window".into());

        DeviceState {
            on: true,
            bri: 128,
            seg: vec![s0, s1, s2],
            ..DeviceState::default()
        }
    }

    fn seg(id: u8) -> SegmentUpdate {
        SegmentUpdate::for_id(id)
    }

    fn with_segs(segs: Vec<SegmentUpdate>) -> StateUpdate {
        StateUpdate {
            seg: Some(segs),
            ..StateUpdate::default()
        }
    }

    // ── merge_state ──────────────────────────────────────────────────

    #[test]
    fn empty_update_is_identity() {
        let base = base_state();
        assert_eq!(merge_state(&base, &StateUpdate::default()), base);
    }

    #[test]
    fn scalars_replace() {
        let base = base_state();
        let update = StateUpdate {
            on: Some(false),
            bri: Some(10),
            ps: Some(3),
            ..StateUpdate::default()
        };

        let merged = merge_state(&base, &update);
        assert!(!merged.on);
        assert_eq!(merged.bri, 10);
        assert_eq!(merged.ps, 3);
        assert_eq!(merged.transition, base.transition);
        assert_eq!(merged.seg, base.seg);
    }

    #[test]
    fn nested_objects_merge_field_by_field() {
        let mut base = base_state();
        base.nl.dur = 60;
        base.nl.tbri = 5;
        base.udpn.recv = true;

        let update = StateUpdate {
            nl: Some(NightlightUpdate {
                on: Some(true),
                ..NightlightUpdate::default()
            }),
            udpn: Some(UdpSyncUpdate {
                send: Some(true),
                ..UdpSyncUpdate::default()
            }),
            ..StateUpdate::default()
        };

        let merged = merge_state(&base, &update);
        assert!(merged.nl.on);
        assert_eq!(merged.nl.dur, 60);
        assert_eq!(merged.nl.tbri, 5);
        assert!(merged.udpn.send);
        assert!(merged.udpn.recv);
    }

    #[test]
    fn segments_merge_by_id() {
        let base = base_state();
        let mut partial = seg(2);
        partial.fx = Some(42);

        let merged = merge_state(&base, &with_segs(vec![partial]));
        assert_eq!(merged.seg[2].fx, 42);
        assert_eq!(merged.seg[2].n.as_deref(), Some("Window"));
        assert_eq!(merged.seg[0], base.seg[0]);
        assert_eq!(merged.seg[1], base.seg[1]);
    }

    #[test]
    fn segments_without_id_merge_positionally() {
        let base = base_state();
        let first = SegmentUpdate::default();
        let second = SegmentUpdate {
            bri: Some(7),
            ..SegmentUpdate::default()
        };

        let merged = merge_state(&base, &with_segs(vec![first, second]));
        assert_eq!(merged.seg[0], base.seg[0]);
        assert_eq!(merged.seg[1].bri, 7);
    }

    #[test]
    fn positional_beyond_base_is_ignored() {
        let base = base_state();
        let partials = vec![
            SegmentUpdate::default(),
            SegmentUpdate::default(),
            SegmentUpdate::default(),
            SegmentUpdate {
                bri: Some(1),
                ..SegmentUpdate::default()
            },
        ];

        assert_eq!(merge_state(&base, &with_segs(partials)), base);
    }

    #[test]
    fn segment_order_independent_for_distinct_ids() {
        let base = base_state();
        let mut a = seg(0);
        a.bri = Some(20);
        let mut b = seg(2);
        b.pal = Some(11);

        let ab = merge_state(&merge_state(&base, &with_segs(vec![a.clone()])), &with_segs(vec![b.clone()]));
        let ba = merge_state(&merge_state(&base, &with_segs(vec![b])), &with_segs(vec![a]));
        assert_eq!(ab, ba);
    }

    #[test]
    fn color_slots_merge_by_index() {
        let base = base_state();
        let mut partial = seg(0);
        partial.col = Some(vec![vec![], vec![9, 9, 9]]);

        let merged = merge_state(&base, &with_segs(vec![partial]));
        assert_eq!(
            merged.seg[0].col,
            vec![vec![255, 0, 0], vec![9, 9, 9], vec![0, 0, 255]]
        );
    }

    #[test]
    fn range_change_recomputes_len() {
        let base = base_state();
        let mut partial = seg(1);
        partial.stop = Some(80);

        let merged = merge_state(&base, &with_segs(vec![partial]));
        assert_eq!(merged.seg[1].stop, 80);
        assert_eq!(merged.seg[1].len, 30);
    }

    #[test]
    fn unknown_id_with_range_is_inserted_in_id_order() {
        let mut base = base_state();
        base.seg.remove(1);

        let mut partial = seg(1);
        partial.start = Some(50);
        partial.stop = Some(60);
        partial.fx = Some(3);

        let merged = merge_state(&base, &with_segs(vec![partial]));
        let ids: Vec<u8> = merged.seg.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
        assert_eq!(merged.seg[1].fx, 3);
        assert_eq!(merged.seg[1].len, 10);
    }

    #[test]
    fn unknown_id_without_range_is_ignored() {
        let base = base_state();
        let mut partial = seg(9);
        partial.bri = Some(1);

        assert_eq!(merge_state(&base, &with_segs(vec![partial])), base);
    }

    #[test]
    fn extra_fields_deep_merge() {
        let mut base = base_state();
        base.extra = json!({ "AudioReactive": { "on": false, "gain": 40 }, "tb": 1 })
            .as_object()
            .unwrap()
            .clone();

        let update = StateUpdate {
            extra: json!({ "AudioReactive": { "on": true } }).as_object().unwrap().clone(),
            ..StateUpdate::default()
        };

        let merged = merge_state(&base, &update);
        assert_eq!(
            Value::Object(merged.extra),
            json!({ "AudioReactive": { "on": true, "gain": 40 }, "tb": 1 })
        );
    }

    #[test]
    fn inputs_are_not_mutated() {
        let base = base_state();
        let before = base.clone();
        let mut partial = seg(0);
        partial.col = Some(vec![vec![1, 2, 3]]);
        let update = with_segs(vec![partial]);
        let update_before = update.clone();

        let _ = merge_state(&base, &update);
        assert_eq!(base, before);
        assert_eq!(update, update_before);
    }

    // ── merge_update ─────────────────────────────────────────────────

    #[test]
    fn newer_scalars_win() {
        let merged = merge_update(&StateUpdate::brightness(110), &StateUpdate::brightness(150));
        assert_eq!(merged.bri, Some(150));

        let merged = merge_update(&StateUpdate::power(true), &StateUpdate::brightness(5));
        assert_eq!(merged.on, Some(true));
        assert_eq!(merged.bri, Some(5));
    }

    #[test]
    fn associative_for_disjoint_fields() {
        let a = StateUpdate::power(true);
        let b = StateUpdate::brightness(99);
        let c = StateUpdate {
            transition: Some(20),
            nl: Some(NightlightUpdate {
                dur: Some(30),
                ..NightlightUpdate::default()
            }),
            ..StateUpdate::default()
        };

        assert_eq!(
            merge_update(&merge_update(&a, &b), &c),
            merge_update(&a, &merge_update(&b, &c))
        );
    }

    #[test]
    fn same_id_entries_combine() {
        let mut a = seg(1);
        a.fx = Some(4);
        a.col = Some(vec![vec![1, 1, 1], vec![2, 2, 2]]);
        let mut b = seg(1);
        b.sx = Some(200);
        b.col = Some(vec![vec![], vec![7, 7, 7], vec![3, 3, 3]]);

        let merged = merge_update(&with_segs(vec![a]), &with_segs(vec![b]));
        let segs = merged.seg.unwrap();
        assert_eq!(segs.len(), 1);
        assert_eq!(segs[0].fx, Some(4));
        assert_eq!(segs[0].sx, Some(200));
        assert_eq!(
            segs[0].col,
            Some(vec![vec![1, 1, 1], vec![7, 7, 7], vec![3, 3, 3]])
        );
    }

    #[test]
    fn different_ids_accumulate() {
        let merged = merge_update(&with_segs(vec![seg(0)]), &with_segs(vec![seg(3)]));
        let ids: Vec<Option<u8>> = merged.seg.unwrap().iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![Some(0), Some(3)]);
    }

    #[test]
    fn positional_entries_keep_their_index() {
        let older = with_segs(vec![SegmentUpdate {
            bri: Some(1),
            ..SegmentUpdate::default()
        }]);
        let newer = with_segs(vec![
            SegmentUpdate {
                fx: Some(2),
                ..SegmentUpdate::default()
            },
            SegmentUpdate::default(),
            SegmentUpdate {
                pal: Some(3),
                ..SegmentUpdate::default()
            },
        ]);

        let segs = merge_update(&older, &newer).seg.unwrap();
        assert_eq!(segs.len(), 3);
        assert_eq!(segs[0].bri, Some(1));
        assert_eq!(segs[0].fx, Some(2));
        assert_eq!(segs[2].pal, Some(3));
    }

    #[test]
    fn merged_update_applies_like_sequential_updates() {
        let base = base_state();
        let mut a = seg(0);
        a.col = Some(vec![vec![10, 10, 10]]);
        let first = StateUpdate {
            bri: Some(1),
            seg: Some(vec![a]),
            ..StateUpdate::default()
        };
        let mut b = seg(0);
        b.col = Some(vec![vec![], vec![20, 20, 20]]);
        let second = StateUpdate {
            bri: Some(2),
            seg: Some(vec![b]),
            ..StateUpdate::default()
        };

        let sequential = merge_state(&merge_state(&base, &first), &second);
        let coalesced = merge_state(&base, &merge_update(&first, &second));
        assert_eq!(sequential, coalesced);
    }

    #[test]
    fn positional_edit_after_keyed_edit_targets_its_index() {
        let base = DeviceState {
            seg: (0..6u8)
                .map(|id| Segment::new(id, u16::from(id) * 10, u16::from(id) * 10 + 10))
                .collect(),
            ..DeviceState::default()
        };
        let mut keyed = seg(5);
        keyed.fx = Some(1);
        let first = with_segs(vec![keyed]);
        let second = with_segs(vec![SegmentUpdate {
            bri: Some(9),
            ..SegmentUpdate::default()
        }]);

        let merged = merge_update(&first, &second);
        let segs = merged.seg.as_ref().unwrap();
        assert_eq!(segs[0].id, None);
        assert_eq!(segs[1].id, Some(5));

        let sequential = merge_state(&merge_state(&base, &first), &second);
        let coalesced = merge_state(&base, &merged);
        assert_eq!(coalesced.seg[0].bri, 9);
        assert_eq!(coalesced.seg[5].fx, 1);
        assert_eq!(sequential, coalesced);
    }
}
