//! check-config - load and validate a configuration file

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use siphon_config::Config;

/// Arguments for the check-config command
#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "configs/siphon.toml")]
    pub config: PathBuf,
}

/// Load, validate, and summarize the configuration
pub fn run(args: CheckArgs) -> Result<()> {
    let config = Config::from_file(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;

    info!(
        elasticsearch = config.elasticsearch.enabled,
        openschema = config.openschema.enabled,
        "pipelines"
    );
    if config.elasticsearch.enabled {
        info!(
            url = %config.elasticsearch.url,
            stats = config.elasticsearch.stats_enabled,
            checkpoint_secs = config.elasticsearch.checkpoint_interval_secs,
            "elasticsearch"
        );
    }
    if config.openschema.enabled {
        info!(
            endpoint = %config.openschema.notification_endpoint,
            accounts = config.openschema.account_strings().len(),
            capacity = config.openschema.buffer_capacity_bytes,
            compress = config.openschema.compress,
            checkpoint_secs = config.openschema.checkpoint_interval_secs,
            "openschema"
        );
    }

    info!("configuration is valid");
    Ok(())
}
