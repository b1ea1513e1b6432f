//! The service loop: one board, one request at a time.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::capture::{spawn_capture, CaptureHandle};
use crate::config::AutopilotConfig;
use crate::console::{interactive, OperatorInput};
use crate::harness::{DeployPlan, FaultClass, HarnessContext, HarnessOutcome, Variant};
use crate::paths::{self, bundle};
use crate::postprocess;
use crate::queue::{QueueState, RequestId, RequestQueue};
use crate::recovery::{self, RecoveryHandle};
use crate::transcript::{Tee, Transcript};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerStatus {
    Idle,
    Processing(RequestId),
    Interactive,
    /// Recovery failed; no new requests are claimed until an operator session ends
    AwaitingIntervention,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryOutcome {
    NotNeeded,
    Recovered,
    Failed,
}

/// Summary of one processed request, also stored as `result.json` in its bundle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobReport {
    pub request: RequestId,
    pub class: Option<FaultClass>,
    pub outcome: QueueState,
    pub recovery: RecoveryOutcome,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub error: Option<String>,
}

/// Requeues in-flight work; call on shutdown and on startup
#[derive(Debug, Clone)]
pub struct ShutdownHook {
    queue: RequestQueue,
}

impl ShutdownHook {
    pub async fn run(&self) -> Result<Vec<RequestId>> {
        self.queue.requeue_processing().await
    }
}

/// Per-job resources that must be released on every path
struct Job {
    dir: PathBuf,
    capture: Option<CaptureHandle>,
    recovery: Option<RecoveryHandle>,
    class: Option<FaultClass>,
}

pub struct Scheduler {
    base_dir: PathBuf,
    config: AutopilotConfig,
    queue: RequestQueue,
    ctx: HarnessContext,
    operator: OperatorInput,
    status: SchedulerStatus,
}

impl Scheduler {
    pub fn new(
        base_dir: &Path,
        config: AutopilotConfig,
        ctx: HarnessContext,
        operator: OperatorInput,
    ) -> Self {
        Self {
            base_dir: base_dir.to_path_buf(),
            queue: RequestQueue::new(base_dir),
            config,
            ctx,
            operator,
            status: SchedulerStatus::Idle,
        }
    }

    pub fn queue(&self) -> &RequestQueue {
        &self.queue
    }

    pub fn status(&self) -> &SchedulerStatus {
        &self.status
    }

    pub fn shutdown_hook(&self) -> ShutdownHook {
        ShutdownHook {
            queue: self.queue.clone(),
        }
    }

    fn set_status(&mut self, status: SchedulerStatus) {
        if self.status != status {
            info!(target: "status", status = ?status, "scheduler status");
            self.status = status;
        }
    }

    /// Serve the queue until `shutdown` fires, then requeue anything in flight
    pub async fn run(&mut self, shutdown: CancellationToken) -> Result<()> {
        self.queue.init().await?;
        self.queue.requeue_processing().await?;

        if self.config.scheduler.startup_boot {
            self.startup_boot().await;
        }
        info!(target: "scheduler", queue = %self.queue.dir(QueueState::Pending).display(), "waiting for requests");

        while !shutdown.is_cancelled() {
            let next = if self.status == SchedulerStatus::AwaitingIntervention {
                None
            } else {
                match self.queue.oldest_pending().await {
                    Ok(next) => next,
                    Err(e) => {
                        warn!(target: "scheduler", error = %format!("{:#}", e), "failed to list pending requests");
                        None
                    }
                }
            };

            match next {
                Some(id) => {
                    tokio::select! {
                        _ = self.process(&id) => {}
                        _ = shutdown.cancelled() => {
                            warn!(target: "scheduler", request = %id, "shutdown requested during job");
                        }
                    }
                }
                None => self.idle_tick(&shutdown).await,
            }
        }

        let requeued = self.shutdown_hook().run().await?;
        info!(target: "scheduler", requeued = requeued.len(), "scheduler stopped");
        Ok(())
    }

    /// Process the oldest pending request, if any
    pub async fn process_next(&mut self) -> Result<Option<JobReport>> {
        match self.queue.oldest_pending().await? {
            Some(id) => Ok(self.process(&id).await),
            None => Ok(None),
        }
    }

    async fn startup_boot(&mut self) {
        info!(target: "scheduler", "booting board to ready state");
        let log = paths::startup_log(&self.base_dir);
        if let Err(e) = self.ctx.ready(&self.config.ready, &log).await {
            error!(target: "scheduler", error = %format!("{:#}", e), "startup boot failed, manual intervention needed");
            self.set_status(SchedulerStatus::AwaitingIntervention);
        }
    }

    async fn idle_tick(&mut self, shutdown: &CancellationToken) {
        if let Some(input) = self.operator.try_take() {
            let degraded = self.status == SchedulerStatus::AwaitingIntervention;
            self.set_status(SchedulerStatus::Interactive);
            tokio::select! {
                result = self.hand_off(Some(input)) => {
                    if let Err(e) = result {
                        warn!(target: "scheduler", error = %format!("{:#}", e), "interactive session failed");
                    }
                }
                _ = shutdown.cancelled() => return,
            }
            if degraded {
                info!(target: "scheduler", "operator session finished, resuming automatic processing");
            }
            self.set_status(SchedulerStatus::Idle);
        }

        tokio::select! {
            _ = tokio::time::sleep(self.config.scheduler.idle_poll()) => {}
            _ = shutdown.cancelled() => {}
        }
    }

    /// Give the primary console to the operator
    async fn hand_off(&mut self, initial: Option<Vec<u8>>) -> Result<()> {
        let stream = self
            .ctx
            .consoles
            .open_primary()
            .await
            .context("opening primary console for interactive session")?;
        let mut transcript = Transcript::new(stream, Tee::terminal());
        interactive::pass_through(&mut transcript, &mut self.operator, initial).await
    }

    /// Run one request end to end. Returns `None` if the request could not be claimed.
    async fn process(&mut self, id: &RequestId) -> Option<JobReport> {
        let started_at = Utc::now();
        let ticket = match self.queue.claim(id).await {
            Ok(ticket) => ticket,
            Err(e) => {
                warn!(target: "scheduler", request = %id, error = %format!("{:#}", e), "failed to claim request");
                return None;
            }
        };
        self.set_status(SchedulerStatus::Processing(id.clone()));
        info!(target: "scheduler", request = %id, "new request");

        let dir = match self.queue.create_bundle(id).await {
            Ok(dir) => dir,
            Err(e) => {
                let error = format!("{:#}", e);
                error!(target: "scheduler", request = %id, error = %error, "cannot create result bundle");
                if let Err(e) = self.queue.fail(ticket).await {
                    error!(target: "scheduler", request = %id, error = %format!("{:#}", e), "failed to mark request failed");
                }
                self.set_status(SchedulerStatus::Idle);
                return Some(JobReport {
                    request: id.clone(),
                    class: None,
                    outcome: QueueState::Failed,
                    recovery: RecoveryOutcome::NotNeeded,
                    started_at,
                    finished_at: Utc::now(),
                    error: Some(error),
                });
            }
        };

        let mut job = Job {
            dir,
            capture: None,
            recovery: None,
            class: None,
        };
        let result = self.run_pipeline(&mut job).await;

        if let Some(capture) = job.capture.take() {
            if let Err(e) = capture.stop(self.config.scheduler.capture_join()).await {
                warn!(target: "scheduler", request = %id, error = %format!("{:#}", e), "log capture ended with error");
            }
        }

        let (outcome, error) = match result {
            Ok(()) => {
                if let Err(e) = self.queue.complete(ticket).await {
                    error!(target: "scheduler", request = %id, error = %format!("{:#}", e), "failed to mark request completed");
                }
                info!(
                    target: "scheduler",
                    request = %id,
                    class = %job.class.map(FaultClass::as_str).unwrap_or("none"),
                    results = %job.dir.display(),
                    "request completed"
                );
                (QueueState::Completed, None)
            }
            Err(e) => {
                let error = format!("{:#}", e);
                error!(target: "scheduler", request = %id, error = %error, "request failed");
                if let Err(e) = self.queue.fail(ticket).await {
                    error!(target: "scheduler", request = %id, error = %format!("{:#}", e), "failed to mark request failed");
                }
                if job.recovery.is_none() {
                    job.recovery = Some(self.launch_recovery(&job.dir));
                }
                (QueueState::Failed, Some(error))
            }
        };

        let recovery = match job.recovery.take() {
            None => RecoveryOutcome::NotNeeded,
            Some(handle) => {
                info!(target: "scheduler", request = %id, log = %handle.log_path().display(), "waiting for recovery");
                match handle.join().await {
                    Ok(()) => RecoveryOutcome::Recovered,
                    Err(_) => RecoveryOutcome::Failed,
                }
            }
        };

        let report = JobReport {
            request: id.clone(),
            class: job.class,
            outcome,
            recovery,
            started_at,
            finished_at: Utc::now(),
            error,
        };
        if let Err(e) = write_report(&job.dir, &report).await {
            warn!(target: "scheduler", request = %id, error = %format!("{:#}", e), "failed to write job summary");
        }

        if recovery == RecoveryOutcome::Failed {
            self.set_status(SchedulerStatus::AwaitingIntervention);
            return Some(report);
        }

        if job.class == Some(FaultClass::UserInterrupted) {
            self.set_status(SchedulerStatus::Interactive);
            if let Err(e) = self.hand_off(None).await {
                warn!(target: "scheduler", error = %format!("{:#}", e), "interactive session failed");
            }
        }
        self.set_status(SchedulerStatus::Idle);
        Some(report)
    }

    /// update → fault detection → capture stop → recovery launch → post-processing
    async fn run_pipeline(&mut self, job: &mut Job) -> Result<()> {
        let plan = DeployPlan::resolve(&self.config.target).await?;
        info!(target: "scheduler", kernel = %plan.version, "kernel under test");

        // Capture before the update: the reboot it triggers emits the first lines.
        let secondary = self
            .ctx
            .consoles
            .open_secondary()
            .await
            .context("opening secondary console")?;
        job.capture = Some(
            spawn_capture(
                secondary,
                &job.dir.join(bundle::UARTI_LOG),
                self.config.consoles.capture_chunk,
            )
            .await?,
        );

        self.ctx
            .run(
                &Variant::Update(plan),
                &job.dir.join(bundle::KERNEL_UPDATE_LOG),
                &mut self.operator,
            )
            .await?;

        let outcome = self
            .ctx
            .run(
                &Variant::FaultClassify(self.config.detection.clone()),
                &job.dir.join(bundle::UART_RAW_LOG),
                &mut self.operator,
            )
            .await?;
        let HarnessOutcome::Classified(class) = outcome else {
            bail!("fault classification produced {:?}", outcome);
        };
        job.class = Some(class);
        info!(target: "scheduler", class = %class, "test result");

        if let Some(capture) = job.capture.take() {
            capture.stop(self.config.scheduler.capture_join()).await?;
        }

        if class.needs_recovery() {
            job.recovery = Some(self.launch_recovery(&job.dir));
        }

        postprocess::process_bundle(&job.dir, class, &self.config.filters).await
    }

    fn launch_recovery(&self, dir: &Path) -> RecoveryHandle {
        recovery::launch(
            self.ctx.clone(),
            self.config.ready.clone(),
            &dir.join(bundle::RECOVERY_LOG),
        )
    }
}

async fn write_report(dir: &Path, report: &JobReport) -> Result<()> {
    let json = serde_json::to_string_pretty(report).context("serializing job summary")?;
    tokio::fs::write(dir.join(bundle::RESULT_JSON), json)
        .await
        .context("writing job summary")
}
