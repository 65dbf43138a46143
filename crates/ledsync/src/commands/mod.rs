//! Command dispatch: bridges CLI args -> DeviceSync -> output formatting.

pub mod config_cmd;
pub mod labels;
pub mod set;
pub mod state;
pub mod util;
pub mod watch;
pub mod zones;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

use util::Target;

/// Dispatch a device-bound command to the appropriate handler.
pub async fn dispatch(cmd: Command, target: Target, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::State => state::handle_state(&target, global).await,
        Command::Info => state::handle_info(&target, global).await,
        Command::Watch(args) => watch::handle(target, &args, global).await,
        Command::Set(args) => set::handle(&target, &args, global).await,
        Command::Labels(args) => labels::handle(target, args, global).await,
        Command::Zones(args) => zones::handle(target, args, global).await,
        // Config and Completions are handled before dispatch
        Command::Config(_) | Command::Completions(_) => unreachable!(),
    }
}
