use anyhow::Result;
use autopilot::cli::Commands;
use autopilot::{cli, commands, paths};
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = cli::Cli::parse();

    // Must happen before any path access
    paths::init_base_dir(cli.base_dir.as_deref());

    // Only use colors when outputting to a TTY (not when piped to file)
    let use_color = atty::is(atty::Stream::Stdout);
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .with_target(true)
        .with_ansi(use_color)
        .init();

    let result = match cli.cmd {
        Commands::Run(args) => {
            commands::cmd_run(args, cli.config.as_deref(), cli.workspace.as_deref()).await
        }
        Commands::Submit => commands::cmd_submit().await,
        Commands::Ls(args) => commands::cmd_ls(args).await,
        Commands::Requeue => commands::cmd_requeue().await,
    };

    if let Err(e) = &result {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }

    result
}
