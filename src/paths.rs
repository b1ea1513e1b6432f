use std::path::{Path, PathBuf};
use std::sync::OnceLock;

static BASE_DIR: OnceLock<PathBuf> = OnceLock::new();

/// Initialize the base directory from the CLI (must be done before any path access).
///
/// Falls back to `$HOME/.local/share/autopilot`, then `./autopilot`.
pub fn init_base_dir(dir: Option<&Path>) {
    let dir = match dir {
        Some(d) => d.to_path_buf(),
        None => std::env::var_os("HOME")
            .map(|home| PathBuf::from(home).join(".local/share/autopilot"))
            .unwrap_or_else(|| PathBuf::from("autopilot")),
    };
    let _ = BASE_DIR.set(dir);
}

/// Base directory for all autopilot data
pub fn base_dir() -> PathBuf {
    BASE_DIR
        .get()
        .cloned()
        .unwrap_or_else(|| PathBuf::from("autopilot"))
}

/// Parent of the four queue directories
pub fn requests_dir(base: &Path) -> PathBuf {
    base.join("requests")
}

/// Parent of the per-request result bundles
pub fn results_dir(base: &Path) -> PathBuf {
    base.join("results")
}

/// Default config file location
pub fn config_file(base: &Path) -> PathBuf {
    base.join("autopilot.json")
}

/// Transcript of the readiness boot run at service start
pub fn startup_log(base: &Path) -> PathBuf {
    base.join("startup.log")
}

/// File names inside a result bundle.
pub mod bundle {
    pub const KERNEL_UPDATE_LOG: &str = "kernel-update.log";
    pub const UART_RAW_LOG: &str = "uart-raw.log";
    pub const UART_LOG: &str = "uart.log";
    pub const KERNEL_LOG: &str = "kernel.log";
    pub const PANIC_LOG: &str = "panic.log";
    pub const HYP_LOG: &str = "hyp.log";
    pub const UARTI_LOG: &str = "uarti.log";
    pub const SMMU_FAULTS_LOG: &str = "smmu_faults.log";
    pub const DISASSEMBLY_LOG: &str = "disassembly.log";
    pub const RECOVERY_LOG: &str = "recovery.log";
    pub const RESULT_JSON: &str = "result.json";
}
