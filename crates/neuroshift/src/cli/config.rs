//! `neuroshift config`: show the effective configuration

use anyhow::{Context, Result};
use neuroshift_core::NeuroshiftConfig;
use serde::Serialize;
use std::path::Path;
use tracing::debug;

/// Load the config file; a missing file means defaults.
pub fn load(path: &Path) -> Result<NeuroshiftConfig> {
    let config = NeuroshiftConfig::load(path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
    debug!("Using configuration from {}", path.display());
    Ok(config)
}

#[derive(Serialize)]
struct ConfigOutput<'a> {
    path: &'a Path,
    exists: bool,
    neuroshift: &'a NeuroshiftConfig,
}

pub fn run(path: &Path, config: &NeuroshiftConfig, json: bool) -> Result<()> {
    if json {
        let output = ConfigOutput {
            path,
            exists: path.exists(),
            neuroshift: config,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    if path.exists() {
        println!("# {}", path.display());
    } else {
        println!("# {} not found, showing defaults", path.display());
    }
    print!("{}", config.to_toml().context("Failed to render configuration")?);
    Ok(())
}
