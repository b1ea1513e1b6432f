//! Shared setup for the subcommands

use anyhow::Result;
use std::path::Path;
use tracing::debug;

use crate::config::AutopilotConfig;
use crate::paths;

/// Load the config file (explicit path or `<base>/autopilot.json`) and apply CLI overrides
pub fn load_config(config: Option<&Path>, workspace: Option<&Path>) -> Result<AutopilotConfig> {
    let path = match config {
        Some(p) => p.to_path_buf(),
        None => paths::config_file(&paths::base_dir()),
    };
    debug!(config = %path.display(), "loading config");
    let mut cfg = AutopilotConfig::load(&path)?;
    if let Some(ws) = workspace {
        cfg.target.workspace = ws.to_path_buf();
    }
    Ok(cfg)
}
