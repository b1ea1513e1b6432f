// Focused CLI parsing tests (tests command-line parsing only, not business logic)

use autopilot::cli::{Cli, Commands, QueueStateOpt};
use clap::Parser;
use std::path::PathBuf;

#[test]
fn test_all_commands_parse() {
    let test_cases = vec![
        vec!["autopilot", "run"],
        vec!["autopilot", "run", "--skip-startup-boot", "--no-echo"],
        vec!["autopilot", "submit"],
        vec!["autopilot", "ls"],
        vec!["autopilot", "ls", "--state", "failed", "--json"],
        vec!["autopilot", "requeue"],
    ];

    for args in test_cases {
        Cli::try_parse_from(&args).unwrap_or_else(|e| panic!("Failed to parse {:?}: {}", args, e));
    }
}

#[test]
fn test_run_flags() {
    let cli = Cli::try_parse_from([
        "autopilot",
        "--base-dir",
        "/srv/autopilot",
        "--config",
        "/etc/autopilot.json",
        "--workspace",
        "/work",
        "run",
        "--skip-startup-boot",
    ])
    .unwrap();

    assert_eq!(cli.base_dir, Some(PathBuf::from("/srv/autopilot")));
    assert_eq!(cli.config, Some(PathBuf::from("/etc/autopilot.json")));
    assert_eq!(cli.workspace, Some(PathBuf::from("/work")));
    match cli.cmd {
        Commands::Run(args) => {
            assert!(args.skip_startup_boot);
            assert!(!args.no_echo);
        }
        _ => panic!("Expected Run command"),
    }
}

#[test]
fn test_ls_state_filter() {
    let cli = Cli::try_parse_from(["autopilot", "ls", "--state", "processing"]).unwrap();
    match cli.cmd {
        Commands::Ls(args) => {
            assert_eq!(args.state, Some(QueueStateOpt::Processing));
            assert!(!args.json);
        }
        _ => panic!("Expected Ls command"),
    }
}

#[test]
fn test_invalid_inputs_rejected() {
    assert!(Cli::try_parse_from(["autopilot"]).is_err());
    assert!(Cli::try_parse_from(["autopilot", "ls", "--state", "archived"]).is_err());
    assert!(Cli::try_parse_from(["autopilot", "submit", "extra"]).is_err());
}
