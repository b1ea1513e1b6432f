use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::board;
use crate::cli::RunArgs;
use crate::console::{OperatorInput, SerialConsoles};
use crate::harness::HarnessContext;
use crate::paths;
use crate::scheduler::Scheduler;

use super::common::load_config;

/// Serve the request queue until SIGINT/SIGTERM
pub async fn cmd_run(
    args: RunArgs,
    config: Option<&Path>,
    workspace: Option<&Path>,
) -> Result<()> {
    let base_dir = paths::base_dir();
    let mut cfg = load_config(config, workspace)?;
    if args.skip_startup_boot {
        cfg.scheduler.startup_boot = false;
    }
    if args.no_echo {
        cfg.consoles.echo = false;
    }

    info!(
        target: "scheduler",
        base_dir = %base_dir.display(),
        primary = %cfg.consoles.primary.display(),
        secondary = %cfg.consoles.secondary.display(),
        kernel = %cfg.target.kernel_dir().display(),
        "autopilot starting"
    );

    let ctx = HarnessContext {
        board: board::from_config(&cfg.board),
        consoles: Arc::new(SerialConsoles::new(
            cfg.consoles.primary.clone(),
            cfg.consoles.secondary.clone(),
            cfg.consoles.baud,
        )),
        boot: cfg.boot.clone(),
        echo: cfg.consoles.echo,
    };

    let shutdown = CancellationToken::new();
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let token = shutdown.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => info!(target: "scheduler", "received SIGTERM, shutting down"),
            _ = sigint.recv() => info!(target: "scheduler", "received SIGINT, shutting down"),
        }
        token.cancel();
    });

    let mut scheduler = Scheduler::new(&base_dir, cfg, ctx, OperatorInput::stdin());
    scheduler.run(shutdown).await
}
