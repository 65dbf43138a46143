//! `state` and `info` handlers.

use std::collections::BTreeMap;

use tabled::Tabled;

use ledsync_core::{DeviceInfo, DeviceState, Segment, SegmentLabel};

use crate::cli::{GlobalOpts, OutputFormat};
use crate::error::CliError;
use crate::output;

use super::util::{self, Target};

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct SegmentRow {
    #[tabled(rename = "ID")]
    id: u8,
    #[tabled(rename = "Range")]
    range: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Power")]
    power: String,
    #[tabled(rename = "Bri")]
    bri: u8,
    #[tabled(rename = "FX")]
    fx: u8,
    #[tabled(rename = "Pal")]
    pal: u8,
    #[tabled(rename = "Color")]
    color: String,
}

impl SegmentRow {
    fn new(seg: &Segment, labels: &BTreeMap<u8, SegmentLabel>, color: bool) -> Self {
        Self {
            id: seg.id,
            range: format!("{}-{}", seg.start, seg.stop),
            name: labels
                .get(&seg.id)
                .map(|l| l.display.clone())
                .unwrap_or_default(),
            power: output::paint_power(seg.on, color),
            bri: seg.bri,
            fx: seg.fx,
            pal: seg.pal,
            color: seg.col.first().map(|c| hex(c)).unwrap_or_default(),
        }
    }
}

fn hex(slot: &[u8]) -> String {
    slot.iter().fold(String::from("#"), |mut acc, channel| {
        acc.push_str(&format!("{channel:02x}"));
        acc
    })
}

// ── Rendering ───────────────────────────────────────────────────────

/// Render a state with segment labels. Shared with `set`.
pub fn render_state(
    format: OutputFormat,
    state: &DeviceState,
    labels: &BTreeMap<u8, SegmentLabel>,
    color: bool,
) -> Result<String, CliError> {
    output::render_single(
        format,
        state,
        |s| {
            let mut out = output::render_detail(&[
                ("Power", output::paint_power(s.on, color)),
                ("Brightness", s.bri.to_string()),
                ("Transition", format!("{} ms", u32::from(s.transition) * 100)),
                ("Preset", preset_name(s.ps)),
                ("Main segment", s.mainseg.to_string()),
            ]);
            if !s.seg.is_empty() {
                let rows: Vec<SegmentRow> = s
                    .seg
                    .iter()
                    .map(|seg| SegmentRow::new(seg, labels, color))
                    .collect();
                out.push_str("\n\n");
                out.push_str(&output::render_table(&rows));
            }
            out
        },
        |s| format!("{}\n{}", if s.on { "on" } else { "off" }, s.bri),
    )
}

fn preset_name(ps: i16) -> String {
    if ps < 0 { "none".into() } else { ps.to_string() }
}

fn render_info(format: OutputFormat, info: &DeviceInfo) -> Result<String, CliError> {
    output::render_single(
        format,
        info,
        |i| {
            output::render_detail(&[
                ("Name", i.name.clone()),
                ("Version", format!("{} ({})", i.ver, i.vid)),
                ("Arch", i.arch.clone()),
                ("LEDs", format!("{}{}", i.leds.count, if i.leds.rgbw { " RGBW" } else { "" })),
                ("Effects", i.fxcount.to_string()),
                ("Palettes", i.palcount.to_string()),
                ("Realtime clients", realtime_clients(i.ws)),
                ("IP", i.ip.clone()),
                ("MAC", i.mac.clone()),
                ("Uptime", uptime(i.uptime)),
            ])
        },
        |i| i.name.clone(),
    )
}

fn realtime_clients(ws: i8) -> String {
    if ws < 0 { "disabled".into() } else { ws.to_string() }
}

fn uptime(secs: u64) -> String {
    let (days, rem) = (secs / 86_400, secs % 86_400);
    let (hours, rem) = (rem / 3600, rem % 3600);
    let minutes = rem / 60;
    if days > 0 {
        format!("{days}d {hours}h {minutes}m")
    } else {
        format!("{hours}h {minutes}m")
    }
}

// ── Handlers ────────────────────────────────────────────────────────

pub async fn handle_state(target: &Target, global: &GlobalOpts) -> Result<(), CliError> {
    let sync = util::open(target)?;
    let snapshot = sync.fetch_snapshot().await?;
    let out = render_state(
        global.output,
        &snapshot.state,
        &sync.labels(None),
        output::should_color(global.color),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

pub async fn handle_info(target: &Target, global: &GlobalOpts) -> Result<(), CliError> {
    let sync = util::open(target)?;
    let snapshot = sync.fetch_snapshot().await?;
    let out = render_info(global.output, &snapshot.info)?;
    output::print_output(&out, global.quiet);
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use ledsync_core::{ZoneDefinition, label_all};

    fn sample() -> DeviceState {
        let mut first = Segment::new(0, 0, 30);
        first.col = vec![vec![255, 160, 0]];
        let mut second = Segment::new(1, 30, 60);
        second.on = false;
        DeviceState {
            on: true,
            bri: 90,
            seg: vec![first, second],
            ..DeviceState::default()
        }
    }

    #[test]
    fn table_lists_segments_with_labels() {
        let state = sample();
        let labels = label_all(&state.seg, &[ZoneDefinition::new(0, 30, "Desk")]);
        let out = render_state(OutputFormat::Table, &state, &labels, false).unwrap();

        assert!(out.contains("Brightness  90"));
        assert!(out.contains("Desk"));
        assert!(out.contains("Segment 2"));
        assert!(out.contains("#ffa000"));
    }

    #[test]
    fn plain_state_is_power_then_brightness() {
        let out =
            render_state(OutputFormat::Plain, &sample(), &BTreeMap::new(), false).unwrap();
        assert_eq!(out, "on\n90");
    }

    #[test]
    fn uptime_formatting() {
        assert_eq!(uptime(59), "0h 0m");
        assert_eq!(uptime(90_061), "1d 1h 1m");
    }

    #[test]
    fn info_plain_is_name() {
        let info = DeviceInfo {
            name: "Desk Strip".into(),
            ..DeviceInfo::default()
        };
        assert_eq!(render_info(OutputFormat::Plain, &info).unwrap(), "Desk Strip");
    }
}
