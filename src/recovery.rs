//! Post-job recovery: boot the vanilla kernel in the background while the
//! scheduler post-processes logs, then hand the result back through the join.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::config::ReadyConfig;
use crate::harness::HarnessContext;

/// An in-flight recovery boot
pub struct RecoveryHandle {
    log_path: PathBuf,
    task: JoinHandle<Result<()>>,
}

/// Start the ready-wait harness on its own task.
///
/// The task owns the primary console until joined; nothing else may open it meanwhile.
pub fn launch(ctx: HarnessContext, ready: ReadyConfig, log_path: &Path) -> RecoveryHandle {
    info!(target: "recovery", log = %log_path.display(), "starting recovery boot");
    let path = log_path.to_path_buf();
    let task = tokio::spawn(async move { ctx.ready(&ready, &path).await });
    RecoveryHandle {
        log_path: log_path.to_path_buf(),
        task,
    }
}

impl RecoveryHandle {
    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Wait for the recovery boot and return its result
    pub async fn join(self) -> Result<()> {
        let result = self.task.await.context("recovery task panicked")?;
        match &result {
            Ok(()) => info!(target: "recovery", "board recovered"),
            Err(e) => error!(target: "recovery", error = %format!("{:#}", e), "recovery boot failed"),
        }
        result
    }
}
