//! `watch` handler: stream effective state until Ctrl-C or `--count`.

use chrono::Local;
use futures_util::StreamExt;
use tokio::sync::broadcast::error::RecvError;

use ledsync_core::{ConnectionEvent, DeviceState, TransportMode};

use crate::cli::{GlobalOpts, OutputFormat, WatchArgs};
use crate::error::CliError;
use crate::output;

use super::util::{self, Target};

/// One line per state change. JSON formats emit newline-delimited JSON.
fn state_line(format: OutputFormat, state: &DeviceState, color: bool) -> Result<String, CliError> {
    Ok(match format {
        OutputFormat::Json | OutputFormat::JsonCompact => serde_json::to_string(state)?,
        OutputFormat::Plain => format!("{} {}", if state.on { "on" } else { "off" }, state.bri),
        OutputFormat::Table => {
            let segments = state
                .seg
                .iter()
                .map(|s| format!("{}:fx{}/pal{}", s.id, s.fx, s.pal))
                .collect::<Vec<_>>()
                .join(" ");
            format!(
                "{}  {:<3}  bri {:>3}  {}",
                Local::now().format("%H:%M:%S"),
                output::paint_power(state.on, color),
                state.bri,
                segments
            )
        }
    })
}

pub async fn handle(
    mut target: Target,
    args: &WatchArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    if args.poll {
        target.sync.transport = TransportMode::Polling;
    }
    let color = output::should_color(global.color);

    let sync = util::open(&target)?;
    let mut states = sync.subscribe_state().into_stream();
    let mut events = sync.events();
    sync.start()?;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut seen = 0usize;
    let result = loop {
        tokio::select! {
            res = &mut ctrl_c => break res.map_err(CliError::from),

            next = states.next() => {
                let Some(slot) = next else { break Ok(()) };
                let Some(state) = slot else { continue };
                match state_line(global.output, &state, color) {
                    Ok(line) => output::print_output(&line, global.quiet),
                    Err(e) => break Err(e),
                }
                seen += 1;
                if args.count.is_some_and(|n| seen >= n) {
                    break Ok(());
                }
            }

            event = events.recv() => match event {
                Ok(ConnectionEvent::Error(message)) if !global.quiet => {
                    eprintln!("{}: {message}", output::paint_status(sync.status(), color));
                }
                Ok(ConnectionEvent::ReconnectExhausted) if !global.quiet => {
                    eprintln!("realtime channel gave up reconnecting");
                }
                Ok(_) if !global.quiet => {
                    eprintln!("{}", output::paint_status(sync.status(), color));
                }
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break Ok(()),
            },
        }
    };

    sync.shutdown().await;
    result
}
