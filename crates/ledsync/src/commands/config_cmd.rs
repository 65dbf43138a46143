//! Config subcommand handlers.

use std::path::{Path, PathBuf};

use ledsync_config::{Config, ConfigError, DeviceProfile, TransportKind};

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts, OutputFormat};
use crate::error::CliError;
use crate::output;

/// Add `profile` under `name` to the config at `path`, creating the file
/// if needed. The first profile written becomes the default.
pub fn init_profile(
    path: &Path,
    name: &str,
    profile: DeviceProfile,
    force: bool,
) -> Result<(), CliError> {
    let mut cfg = if path.exists() {
        ledsync_config::load_config_from(path)?
    } else {
        Config::default()
    };

    if cfg.profiles.contains_key(name) && !force {
        return Err(CliError::Validation {
            field: "name".into(),
            reason: format!("profile '{name}' already exists; pass --force to replace it"),
        });
    }

    // Reject what would fail at connect time
    ledsync_config::profile_to_sync_config(&profile, &cfg.defaults)?;

    let default_missing = cfg
        .default_profile
        .as_ref()
        .is_none_or(|d| !cfg.profiles.contains_key(d));
    if default_missing {
        cfg.default_profile = Some(name.to_owned());
    }

    cfg.profiles.insert(name.to_owned(), profile);
    ledsync_config::save_config_to(&cfg, path)?;
    Ok(())
}

fn render_config(format: OutputFormat, cfg: &Config) -> Result<String, CliError> {
    Ok(match format {
        OutputFormat::Json => serde_json::to_string_pretty(cfg)?,
        OutputFormat::JsonCompact => serde_json::to_string(cfg)?,
        OutputFormat::Table | OutputFormat::Plain => {
            toml::to_string_pretty(cfg).map_err(ConfigError::from)?
        }
    })
}

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Init {
            url,
            name,
            polling,
            zones,
            force,
        } => {
            let path = ledsync_config::config_path();
            let mut profile = DeviceProfile::new(url);
            if polling {
                profile.transport = TransportKind::Polling;
            }
            profile.zones = zones.map(absolute);

            init_profile(&path, &name, profile, force)?;
            if !global.quiet {
                eprintln!("Profile '{name}' written to {}", path.display());
            }
            Ok(())
        }

        ConfigCommand::Show => {
            let cfg = ledsync_config::load_config()?;
            let out = render_config(global.output, &cfg)?;
            output::print_output(out.trim_end(), global.quiet);
            Ok(())
        }

        ConfigCommand::Path => {
            output::print_output(
                &ledsync_config::config_path().display().to_string(),
                global.quiet,
            );
            Ok(())
        }
    }
}

/// Relative zone paths are stored against the current directory so the
/// profile works from anywhere.
fn absolute(path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        return path;
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(_) => path,
    }
}
