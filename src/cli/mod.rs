pub mod args;

pub use args::{Cli, Commands, LsArgs, QueueStateOpt, RunArgs};
