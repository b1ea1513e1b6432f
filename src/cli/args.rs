use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::queue::QueueState;

#[derive(Parser, Debug)]
#[command(
    name = "autopilot",
    version,
    about = "Boot kernels on a lab board and classify how they fail"
)]
pub struct Cli {
    /// Data directory holding the queue, results and config
    #[arg(long, global = true, env = "AUTOPILOT_DIR")]
    pub base_dir: Option<PathBuf>,

    /// Config file (default: <base-dir>/autopilot.json)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Workspace containing the kernel tree
    #[arg(long, global = true, env = "WORKSPACE")]
    pub workspace: Option<PathBuf>,

    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve the request queue
    Run(RunArgs),
    /// Queue a new test request
    Submit,
    /// List requests by queue state
    Ls(LsArgs),
    /// Move interrupted requests back to pending
    Requeue,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Do not boot the board to its ready state before serving
    #[arg(long)]
    pub skip_startup_boot: bool,

    /// Do not mirror console traffic to the terminal
    #[arg(long)]
    pub no_echo: bool,
}

#[derive(Args, Debug)]
pub struct LsArgs {
    /// Only show one queue state
    #[arg(long, value_enum)]
    pub state: Option<QueueStateOpt>,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueStateOpt {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl From<QueueStateOpt> for QueueState {
    fn from(s: QueueStateOpt) -> Self {
        match s {
            QueueStateOpt::Pending => QueueState::Pending,
            QueueStateOpt::Processing => QueueState::Processing,
            QueueStateOpt::Completed => QueueState::Completed,
            QueueStateOpt::Failed => QueueState::Failed,
        }
    }
}
