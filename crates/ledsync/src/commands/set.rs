//! `set` handler: one coalesced write, then a settled shutdown.

use tokio::sync::broadcast::error::TryRecvError;
use tracing::warn;

use ledsync_core::{ConnectionEvent, SegmentUpdate, StateUpdate};

use crate::cli::{GlobalOpts, SetArgs};
use crate::error::CliError;
use crate::output;

use super::state;
use super::util::{self, Target};

/// Translate flags into one partial update.
pub fn build_update(args: &SetArgs) -> Result<StateUpdate, CliError> {
    let mut update = StateUpdate {
        on: match (args.on, args.off) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        },
        bri: args.bri,
        transition: args.transition,
        ps: args.preset,
        ..StateUpdate::default()
    };

    if let Some(id) = args.segment {
        let seg = SegmentUpdate {
            bri: args.seg_bri,
            fx: args.fx,
            sx: args.sx,
            ix: args.ix,
            pal: args.pal,
            col: args.color.clone().map(|primary| vec![primary]),
            ..SegmentUpdate::for_id(id)
        };
        if seg == SegmentUpdate::for_id(id) {
            return Err(CliError::Validation {
                field: "segment".into(),
                reason: "no segment option given (--fx, --sx, --ix, --pal, --color, --seg-bri)"
                    .into(),
            });
        }
        update.seg = Some(vec![seg]);
    }

    if update.is_empty() {
        return Err(CliError::Validation {
            field: "set".into(),
            reason: "nothing to change; see `ledsync set --help`".into(),
        });
    }
    Ok(update)
}

pub async fn handle(target: &Target, args: &SetArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let update = build_update(args)?;

    let sync = util::open(target)?;
    // Surfaces an unreachable device as an error instead of a status event
    sync.fetch_snapshot().await?;

    let mut events = sync.events();
    sync.start()?;
    sync.queue_update(&update)?;
    sync.shutdown().await;

    loop {
        match events.try_recv() {
            Ok(ConnectionEvent::Error(message)) => warn!(%message, "transport error during write"),
            Ok(_) | Err(TryRecvError::Lagged(_)) => {}
            Err(TryRecvError::Empty | TryRecvError::Closed) => break,
        }
    }

    if let Some(state) = sync.current() {
        let out = state::render_state(
            global.output,
            &state,
            &sync.labels(None),
            output::should_color(global.color),
        )?;
        output::print_output(&out, global.quiet);
    }
    Ok(())
}
