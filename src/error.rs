use std::process::ExitStatus;
use std::time::Duration;

/// Hard failures of a boot harness.
///
/// These abort the current job. Fault-detection outcomes (`timeout`, `eof`, ...) are
/// never reported through this type; they are classifications, see [`crate::harness::FaultClass`].
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error("no '{stage}' marker within {waited:?}")]
    MarkerTimeout { stage: String, waited: Duration },

    #[error("console closed while waiting for '{stage}'")]
    ConsoleClosed { stage: String },

    #[error("board fell through to network boot on all {attempts} attempts")]
    BootRetriesExhausted { attempts: u32 },

    #[error("board did not reach the ready prompt within {waited:?}")]
    NotReady { waited: Duration },

    #[error("{tool} exited with {status}")]
    ToolFailed { tool: String, status: ExitStatus },
}
