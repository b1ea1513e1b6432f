use anyhow::{Context, Result};
use tokio::process::Command;
use tracing::{debug, info};

use super::BoardLink;
use crate::config::RelayConfig;
use crate::error::HarnessError;

/// Board wired to a local USB relay: one channel holds the recovery strap, one the reset line.
pub struct RelayBoard {
    config: RelayConfig,
}

impl RelayBoard {
    pub fn new(config: RelayConfig) -> Self {
        Self { config }
    }

    async fn set(&self, channel: u8, on: bool) -> Result<()> {
        let arg = format!("{}_{}={}", self.config.board_id, channel, u8::from(on));
        debug!(target: "board", relay = %arg, "switching relay");
        let status = Command::new(&self.config.program)
            .arg(&arg)
            .status()
            .await
            .with_context(|| format!("running {}", self.config.program))?;
        if !status.success() {
            return Err(HarnessError::ToolFailed {
                tool: self.config.program.clone(),
                status,
            }
            .into());
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl BoardLink for RelayBoard {
    async fn boot(&self, recovery: bool) -> Result<()> {
        info!(target: "board", recovery, "power-cycling board via relay");
        self.set(self.config.recovery_channel, recovery).await?;
        tokio::time::sleep(self.config.settle()).await;
        self.set(self.config.reset_channel, true).await?;
        tokio::time::sleep(self.config.reset_pulse()).await;
        self.set(self.config.reset_channel, false).await?;
        tokio::time::sleep(self.config.release()).await;
        self.set(self.config.recovery_channel, false).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn relay(program: &str) -> RelayBoard {
        RelayBoard::new(RelayConfig {
            program: program.to_string(),
            settle_ms: 0,
            reset_pulse_ms: 0,
            release_ms: 0,
            ..RelayConfig::default()
        })
    }

    #[tokio::test]
    async fn test_boot_sequence_succeeds() {
        relay("true").boot(true).await.unwrap();
    }

    #[tokio::test]
    async fn test_relay_failure_is_tool_failed() {
        let err = relay("false").boot(false).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<HarnessError>(),
            Some(HarnessError::ToolFailed { .. })
        ));
    }
}
