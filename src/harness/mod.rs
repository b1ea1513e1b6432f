//! Boot harnesses: one navigation routine plus a per-variant post-boot strategy.

pub mod classify;
pub mod deploy;
pub mod navigate;

pub use classify::{classify, Detector, FaultClass, Signal, Step};
pub use deploy::{deploy, DeployPlan};
pub use navigate::{navigate, BootOption};

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::board::BoardLink;
use crate::config::{BootScript, DetectionConfig, ReadyConfig};
use crate::console::{ConsoleSource, OperatorInput};
use crate::error::HarnessError;
use crate::transcript::Transcript;

/// What happens once (or instead of) navigating the bootloader
#[derive(Debug, Clone)]
pub enum Variant {
    /// Board is already up: upload a kernel and reboot it, no navigation
    Update(DeployPlan),
    /// Boot the vanilla kernel and wait for its shell prompt
    ReadyWait(ReadyConfig),
    /// Boot the kernel under test and classify what it does
    FaultClassify(DetectionConfig),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarnessOutcome {
    Deployed,
    Ready,
    Classified(FaultClass),
}

/// Everything a harness needs to drive the board
#[derive(Clone)]
pub struct HarnessContext {
    pub board: Arc<dyn BoardLink>,
    pub consoles: Arc<dyn ConsoleSource>,
    pub boot: BootScript,
    /// Mirror console traffic to the terminal
    pub echo: bool,
}

impl HarnessContext {
    /// Run one harness; the primary console is held only for the duration of the call
    pub async fn run(
        &self,
        variant: &Variant,
        log_path: &Path,
        operator: &mut OperatorInput,
    ) -> Result<HarnessOutcome> {
        match variant {
            Variant::Update(plan) => {
                deploy(plan, log_path).await?;
                Ok(HarnessOutcome::Deployed)
            }
            Variant::ReadyWait(ready) => {
                let mut transcript = self.open(log_path).await?;
                navigate(
                    &mut transcript,
                    self.board.as_ref(),
                    &self.boot,
                    BootOption::Vanilla,
                    true,
                )
                .await?;

                info!(target: "harness", "waiting for shell prompt");
                navigate::wait_for(&mut transcript, &ready.prompt, ready.timeout())
                    .await
                    .map_err(|_| HarnessError::NotReady {
                        waited: ready.timeout(),
                    })?;
                info!(target: "harness", "board is ready");
                Ok(HarnessOutcome::Ready)
            }
            Variant::FaultClassify(detection) => {
                let mut transcript = self.open(log_path).await?;
                navigate(
                    &mut transcript,
                    self.board.as_ref(),
                    &self.boot,
                    BootOption::PanicCapture,
                    detection.power_cycle,
                )
                .await?;
                let class = classify(&mut transcript, detection, operator).await?;
                Ok(HarnessOutcome::Classified(class))
            }
        }
    }

    /// Ready-wait harness
    pub async fn ready(&self, ready: &ReadyConfig, log_path: &Path) -> Result<()> {
        self.run(
            &Variant::ReadyWait(ready.clone()),
            log_path,
            &mut OperatorInput::none(),
        )
        .await
        .map(|_| ())
    }

    async fn open(&self, log_path: &Path) -> Result<Transcript> {
        Transcript::open_primary(self.consoles.as_ref(), log_path, self.echo).await
    }
}
