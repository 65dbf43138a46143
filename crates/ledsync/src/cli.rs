//! Clap derive structures for the `ledsync` CLI.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// ledsync -- control and watch an LED controller from the terminal
#[derive(Debug, Parser)]
#[command(
    name = "ledsync",
    version,
    about = "Control an LED controller with realtime state sync",
    long_about = "Reads, watches and edits the state of an LED controller.\n\n\
        Uses the device's realtime channel when available and falls back\n\
        to HTTP polling when it is not.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Device profile to use
    #[arg(long, short = 'p', env = "LEDSYNC_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Device URL (overrides profile)
    #[arg(long, short = 'u', env = "LEDSYNC_URL", global = true)]
    pub url: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "LEDSYNC_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Accept self-signed TLS certificates
    #[arg(long, short = 'k', env = "LEDSYNC_INSECURE", global = true)]
    pub insecure: bool,

    /// Request timeout in seconds (overrides profile)
    #[arg(long, env = "LEDSYNC_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show the current device state
    #[command(alias = "st")]
    State,

    /// Show static device information
    Info,

    /// Follow state changes until interrupted
    #[command(alias = "w")]
    Watch(WatchArgs),

    /// Change power, brightness, preset or a segment
    Set(SetArgs),

    /// Show the display label of every segment
    Labels(LabelsArgs),

    /// Inspect zone definitions
    #[command(alias = "z")]
    Zones(ZonesArgs),

    /// Manage CLI configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Watch ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Poll over HTTP instead of using the realtime channel
    #[arg(long)]
    pub poll: bool,

    /// Exit after this many state changes
    #[arg(long, short = 'n')]
    pub count: Option<usize>,
}

// ── Set ──────────────────────────────────────────────────────────────

#[derive(Debug, Default, Args)]
pub struct SetArgs {
    /// Turn the strip on
    #[arg(long, conflicts_with = "off")]
    pub on: bool,

    /// Turn the strip off
    #[arg(long)]
    pub off: bool,

    /// Master brightness (0-255)
    #[arg(long)]
    pub bri: Option<u8>,

    /// Transition time in units of 100 ms
    #[arg(long)]
    pub transition: Option<u16>,

    /// Apply a preset by id
    #[arg(long)]
    pub preset: Option<i16>,

    /// Segment id the segment options apply to
    #[arg(long, short = 's')]
    pub segment: Option<u8>,

    /// Effect id
    #[arg(long, requires = "segment")]
    pub fx: Option<u8>,

    /// Effect speed
    #[arg(long, requires = "segment")]
    pub sx: Option<u8>,

    /// Effect intensity
    #[arg(long, requires = "segment")]
    pub ix: Option<u8>,

    /// Palette id
    #[arg(long, requires = "segment")]
    pub pal: Option<u8>,

    /// Primary color as R,G,B or R,G,B,W
    #[arg(long, requires = "segment", value_parser = parse_color)]
    pub color: Option<Vec<u8>>,

    /// Segment brightness (0-255)
    #[arg(long, requires = "segment")]
    pub seg_bri: Option<u8>,
}

/// Parse `R,G,B` or `R,G,B,W` into a color slot.
pub fn parse_color(raw: &str) -> Result<Vec<u8>, String> {
    let channels = raw
        .split(',')
        .map(|part| {
            part.trim()
                .parse::<u8>()
                .map_err(|_| format!("'{part}' is not a value between 0 and 255"))
        })
        .collect::<Result<Vec<_>, _>>()?;

    match channels.len() {
        3 | 4 => Ok(channels),
        n => Err(format!("expected 3 or 4 channels, got {n}")),
    }
}

// ── Labels / Zones ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct LabelsArgs {
    /// Zone document to use instead of the profile's
    #[arg(long, short = 'z')]
    pub zones: Option<PathBuf>,

    /// Truncate labels to this many characters
    #[arg(long)]
    pub max_len: Option<usize>,
}

#[derive(Debug, Args)]
pub struct ZonesArgs {
    #[command(subcommand)]
    pub command: ZonesCommand,
}

#[derive(Debug, Subcommand)]
pub enum ZonesCommand {
    /// How many runtime segments match a zone definition
    Stats {
        /// Zone document to use instead of the profile's
        #[arg(long, short = 'z')]
        zones: Option<PathBuf>,
    },
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Create or extend the config file with a device profile
    Init {
        /// Device URL, e.g. http://192.168.1.50
        #[arg(long)]
        url: String,

        /// Profile name
        #[arg(long, default_value = "default")]
        name: String,

        /// Poll over HTTP instead of the realtime channel
        #[arg(long)]
        polling: bool,

        /// Zone document for this device
        #[arg(long)]
        zones: Option<PathBuf>,

        /// Replace an existing profile of the same name
        #[arg(long)]
        force: bool,
    },

    /// Display the current configuration
    Show,

    /// Print the config file location
    Path,
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
