use anyhow::{Context, Result};
use tokio::process::Command;
use tracing::{info, warn};

use super::BoardLink;
use crate::config::RemoteConfig;

/// Board whose relay hangs off another host; boots are dispatched over ssh.
pub struct RemoteBoard {
    config: RemoteConfig,
}

impl RemoteBoard {
    pub fn new(config: RemoteConfig) -> Self {
        Self { config }
    }
}

#[async_trait::async_trait]
impl BoardLink for RemoteBoard {
    async fn boot(&self, recovery: bool) -> Result<()> {
        let mode = if recovery { "recovery" } else { "normal" };
        info!(target: "board", host = %self.config.host, mode, "requesting remote boot");

        let output = Command::new("ssh")
            .arg(&self.config.host)
            .arg(&self.config.script)
            .arg(mode)
            .output()
            .await
            .context("running ssh for remote boot")?;

        // Exit status is informational only.
        if !output.status.success() {
            warn!(
                target: "board",
                status = %output.status,
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "remote boot script returned failure"
            );
        }
        Ok(())
    }
}
