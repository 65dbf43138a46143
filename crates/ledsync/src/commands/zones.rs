//! `zones` handlers.

use ledsync_core::MatchStatistics;

use crate::cli::{GlobalOpts, OutputFormat, ZonesArgs, ZonesCommand};
use crate::error::CliError;
use crate::output;

use super::util::{self, Target};

fn render_stats(format: OutputFormat, stats: &MatchStatistics) -> Result<String, CliError> {
    output::render_single(
        format,
        stats,
        |s| {
            output::render_detail(&[
                ("Segments", s.total.to_string()),
                ("Matched", s.matched.to_string()),
                ("Unmatched", s.unmatched.to_string()),
                ("Match rate", format!("{:.1}%", s.match_rate)),
            ])
        },
        |s| format!("{:.2}", s.match_rate),
    )
}

pub async fn handle(mut target: Target, args: ZonesArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ZonesCommand::Stats { zones } => {
            if zones.is_some() {
                target.zones = zones;
            }
            if target.zones.is_none() {
                return Err(CliError::Validation {
                    field: "zones".into(),
                    reason: "no zone document; pass --zones or set `zones` in the profile".into(),
                });
            }

            let sync = util::open(&target)?;
            sync.fetch_snapshot().await?;

            let out = render_stats(global.output, &sync.match_statistics())?;
            output::print_output(&out, global.quiet);
            Ok(())
        }
    }
}
