//! `labels` handler.

use serde::Serialize;
use tabled::Tabled;

use ledsync_core::DeviceSync;

use crate::cli::{GlobalOpts, LabelsArgs};
use crate::error::CliError;
use crate::output;

use super::util::{self, Target};

#[derive(Debug, Serialize)]
struct LabelEntry {
    segment: u8,
    start: u16,
    stop: u16,
    label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    full_name: Option<String>,
}

#[derive(Tabled)]
struct LabelRow {
    #[tabled(rename = "ID")]
    id: u8,
    #[tabled(rename = "Range")]
    range: String,
    #[tabled(rename = "Label")]
    label: String,
    #[tabled(rename = "Full name")]
    full_name: String,
}

impl From<&LabelEntry> for LabelRow {
    fn from(e: &LabelEntry) -> Self {
        Self {
            id: e.segment,
            range: format!("{}-{}", e.start, e.stop),
            label: e.label.clone(),
            full_name: e.full_name.clone().unwrap_or_default(),
        }
    }
}

fn entries(sync: &DeviceSync, max_len: Option<usize>) -> Vec<LabelEntry> {
    let Some(state) = sync.current() else {
        return Vec::new();
    };
    let mut labels = sync.labels(max_len);
    state
        .seg
        .iter()
        .filter_map(|seg| {
            let label = labels.remove(&seg.id)?;
            Some(LabelEntry {
                segment: seg.id,
                start: seg.start,
                stop: seg.stop,
                label: label.display,
                full_name: label.tooltip,
            })
        })
        .collect()
}

pub async fn handle(
    mut target: Target,
    args: LabelsArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    if args.zones.is_some() {
        target.zones = args.zones;
    }
    let sync = util::open(&target)?;
    sync.fetch_snapshot().await?;

    let data = entries(&sync, args.max_len);
    let out = output::render_list(global.output, &data, |e| LabelRow::from(e), |e| e.label.clone())?;
    output::print_output(&out, global.quiet);
    Ok(())
}
