//! `ark config <section.key> [value]`

use anyhow::Result;
use ark::config::ArkConfig;
use ark::workspace::Workspace;
use std::path::Path;

/// Only runs inside a workspace.
pub fn cmd_config(dir: &Path, config_path: &Path, key: &str, value: Option<&str>) -> Result<()> {
    Workspace::open(dir)?;
    match value {
        Some(value) => {
            let mut config = ArkConfig::load(config_path)?;
            config.set(key, value)?;
            config.save(config_path)?;
            println!("{key} = {value}");
        }
        None => {
            let config = ArkConfig::load(config_path)?.effective();
            println!("{}", config.get(key)?);
        }
    }
    Ok(())
}
