// Layered engine configuration: built-in defaults, optional settings file,
// BLEEP_TIMELINE_* environment variables, then command-line flags.

use crate::cli::Cli;
use anyhow::{Context, Result};
use bleep_timeline::TimelineConfig;
use config::{Config, Environment, File};
use std::path::Path;
use tracing::debug;

pub const ENV_PREFIX: &str = "BLEEP_TIMELINE";

pub fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("custom_sequence")
}

/// Merge the settings file and the environment over the defaults.
pub fn build(file: Option<&Path>, environment: Environment) -> Result<TimelineConfig> {
    let mut builder = Config::builder();
    if let Some(path) = file {
        builder = builder.add_source(File::from(path).required(true));
    }
    let settings: TimelineConfig = builder
        .add_source(environment)
        .build()
        .context("Failed to load settings")?
        .try_deserialize()
        .context("Invalid settings")?;
    Ok(settings)
}

/// Resolve the configuration for one run, flags taking precedence.
pub fn load(cli: &Cli) -> Result<TimelineConfig> {
    let mut settings = build(cli.config.as_deref(), environment())?;

    if let Some(policy) = cli.policy {
        settings.policy = policy;
    }
    if cli.averages {
        settings.averages = true;
    }

    settings.validate().context("Invalid timeline configuration")?;
    debug!(?settings, "Resolved timeline configuration");
    Ok(settings)
}
