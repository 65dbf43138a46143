//! Shared helpers for command handlers.

use std::path::{Path, PathBuf};

use ledsync_config::{Config, ConfigError, DeviceProfile};
use ledsync_core::{DeviceSync, SyncConfig};

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// Everything a device-bound command needs, resolved from the config
/// file, the selected profile and CLI overrides.
#[derive(Debug, Clone)]
pub struct Target {
    pub sync: SyncConfig,
    pub zones: Option<PathBuf>,
    pub background: bool,
}

pub fn resolve_target(global: &GlobalOpts) -> Result<Target, CliError> {
    let cfg = ledsync_config::load_config_or_default();
    target_from(&cfg, global, &ledsync_config::config_path())
}

/// Resolve against an already-loaded config. `config_path` only feeds
/// the help text.
pub fn target_from(
    cfg: &Config,
    global: &GlobalOpts,
    config_path: &Path,
) -> Result<Target, CliError> {
    let mut profile = select_profile(cfg, global, config_path)?;

    if global.insecure {
        profile.insecure = Some(true);
    }
    if let Some(timeout) = global.timeout {
        profile.timeout = Some(timeout);
    }

    let sync = ledsync_config::profile_to_sync_config(&profile, &cfg.defaults)?;
    Ok(Target {
        sync,
        zones: profile.zones,
        background: profile.background,
    })
}

fn select_profile(
    cfg: &Config,
    global: &GlobalOpts,
    config_path: &Path,
) -> Result<DeviceProfile, CliError> {
    match cfg.profile(global.profile.as_deref()) {
        Ok((_, profile)) => {
            let mut profile = profile.clone();
            if let Some(url) = &global.url {
                profile.url.clone_from(url);
            }
            Ok(profile)
        }
        Err(ConfigError::UnknownProfile { name }) => match &global.url {
            // A bare --url works without any config file
            Some(url) => Ok(DeviceProfile::new(url.clone())),
            None if global.profile.is_some() => Err(CliError::ProfileNotFound {
                name,
                available: available_profiles(cfg),
            }),
            None => Err(CliError::NoConfig {
                path: config_path.display().to_string(),
            }),
        },
        Err(other) => Err(other.into()),
    }
}

fn available_profiles(cfg: &Config) -> String {
    let mut names: Vec<&str> = cfg.profiles.keys().map(String::as_str).collect();
    if names.is_empty() {
        return "(none)".into();
    }
    names.sort_unstable();
    names.join(", ")
}

/// Build a `DeviceSync` for the target with its zones loaded. Not started.
pub fn open(target: &Target) -> Result<DeviceSync, CliError> {
    let sync = DeviceSync::new(target.sync.clone())?;
    sync.set_background(target.background);
    if let Some(path) = &target.zones {
        sync.set_zones(ledsync_config::load_zones(path)?);
    }
    Ok(sync)
}
