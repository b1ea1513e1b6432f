pub mod board;
pub mod capture;
pub mod cli;
pub mod commands;
pub mod config;
pub mod console;
pub mod error;
pub mod harness;
pub mod paths;
pub mod postprocess;
pub mod queue;
pub mod recovery;
pub mod scheduler;
pub mod transcript;

// Re-export core types for convenience
pub use config::AutopilotConfig;
pub use error::HarnessError;
pub use harness::{FaultClass, HarnessContext};
pub use scheduler::{JobReport, Scheduler};
