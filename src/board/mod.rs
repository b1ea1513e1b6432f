pub mod relay;
pub mod remote;

pub use relay::RelayBoard;
pub use remote::RemoteBoard;

use anyhow::Result;
use std::sync::Arc;

use crate::config::BoardConfig;

/// Power control of the board under test
#[async_trait::async_trait]
pub trait BoardLink: Send + Sync {
    /// Power-cycle the board into normal (`recovery = false`) or recovery mode
    async fn boot(&self, recovery: bool) -> Result<()>;
}

/// Build the configured board link
pub fn from_config(config: &BoardConfig) -> Arc<dyn BoardLink> {
    match config {
        BoardConfig::Local(relay) => Arc::new(RelayBoard::new(relay.clone())),
        BoardConfig::Remote(remote) => Arc::new(RemoteBoard::new(remote.clone())),
    }
}
