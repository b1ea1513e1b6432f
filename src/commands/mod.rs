pub mod common;
pub mod ls;
pub mod requeue;
pub mod run;
pub mod submit;

// Re-export command functions
pub use ls::cmd_ls;
pub use requeue::cmd_requeue;
pub use run::cmd_run;
pub use submit::cmd_submit;
