//! Service configuration.
//!
//! Every section carries `#[serde(default)]` so a config file only needs the keys it
//! changes. Durations are stored as milliseconds.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AutopilotConfig {
    pub consoles: ConsoleConfig,
    pub board: BoardConfig,
    pub target: TargetConfig,
    pub boot: BootScript,
    pub detection: DetectionConfig,
    pub ready: ReadyConfig,
    pub filters: FilterConfig,
    pub scheduler: SchedulerConfig,
}

impl AutopilotConfig {
    /// Load from a JSON file; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        serde_json::from_str(&json).with_context(|| format!("parsing config {}", path.display()))
    }
}

fn ms(v: u64) -> Duration {
    Duration::from_millis(v)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    /// Board console the state machine talks to
    pub primary: PathBuf,
    /// Hypervisor console drained by the log capture task
    pub secondary: PathBuf,
    pub baud: u32,
    /// Mirror primary console traffic to the terminal
    pub echo: bool,
    /// Read size of the log capture task
    pub capture_chunk: usize,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            primary: PathBuf::from("/dev/ttyACM0"),
            secondary: PathBuf::from("/dev/ttyACM1"),
            baud: 115_200,
            echo: true,
            capture_chunk: 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BoardConfig {
    Local(RelayConfig),
    Remote(RemoteConfig),
}

impl Default for BoardConfig {
    fn default() -> Self {
        BoardConfig::Local(RelayConfig::default())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Relay CLI, invoked as `<program> <board>_<channel>=<0|1>`
    pub program: String,
    pub board_id: String,
    pub recovery_channel: u8,
    pub reset_channel: u8,
    pub settle_ms: u64,
    pub reset_pulse_ms: u64,
    pub release_ms: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            program: "usbrelay".to_string(),
            board_id: "HURTM".to_string(),
            recovery_channel: 1,
            reset_channel: 2,
            settle_ms: 100,
            reset_pulse_ms: 100,
            release_ms: 500,
        }
    }
}

impl RelayConfig {
    pub fn settle(&self) -> Duration {
        ms(self.settle_ms)
    }
    pub fn reset_pulse(&self) -> Duration {
        ms(self.reset_pulse_ms)
    }
    pub fn release(&self) -> Duration {
        ms(self.release_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub host: String,
    pub script: String,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            host: "192.168.101.110".to_string(),
            script: "./boot.sh".to_string(),
        }
    }
}

/// Where the kernel under test comes from and where it goes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    pub workspace: PathBuf,
    /// Kernel source tree, relative to `workspace`
    pub kernel_tree: PathBuf,
    /// Image, relative to the kernel tree
    pub image: PathBuf,
    /// Release string file, relative to the kernel tree
    pub release_file: PathBuf,
    pub user: String,
    pub host: String,
    pub remote_path: String,
    pub copy_command: Vec<String>,
    pub reboot_command: Vec<String>,
}

impl Default for TargetConfig {
    fn default() -> Self {
        let ssh_opts = ["-o", "StrictHostKeyChecking=no"];
        Self {
            workspace: PathBuf::from("."),
            kernel_tree: PathBuf::from("Linux_for_Tegra/source/kernel/linux"),
            image: PathBuf::from("arch/arm64/boot/Image"),
            release_file: PathBuf::from("include/config/kernel.release"),
            user: "root".to_string(),
            host: "192.168.101.112".to_string(),
            remote_path: "/boot/Image-{version}".to_string(),
            copy_command: std::iter::once("scp")
                .chain(ssh_opts)
                .chain(["{image}", "{user}@{host}:{remote_path}"])
                .map(String::from)
                .collect(),
            reboot_command: std::iter::once("ssh")
                .chain(ssh_opts)
                .chain(["{user}@{host}", "reboot"])
                .map(String::from)
                .collect(),
        }
    }
}

impl TargetConfig {
    pub fn kernel_dir(&self) -> PathBuf {
        self.workspace.join(&self.kernel_tree)
    }

    pub fn kernel_image(&self) -> PathBuf {
        self.kernel_dir().join(&self.image)
    }

    pub fn kernel_release_file(&self) -> PathBuf {
        self.kernel_dir().join(&self.release_file)
    }
}

/// One scripted bootloader menu hop: wait for `marker`, press down `down` times, confirm.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MenuStep {
    pub marker: String,
    pub down: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BootScript {
    /// Top-level firmware prompt; `None` skips the firmware gate and its retry loop
    pub firmware_prompt: Option<String>,
    /// Fallthrough-to-network-boot indicator
    pub netboot_marker: String,
    pub max_attempts: u32,
    pub firmware_timeout_ms: u64,
    pub menu_steps: Vec<MenuStep>,
    pub menu_timeout_ms: u64,
    pub extlinux_prompt: String,
    pub extlinux_timeout_ms: u64,
    /// Pause before sending the boot option keystroke
    pub keystroke_delay_ms: u64,
}

impl Default for BootScript {
    fn default() -> Self {
        Self {
            firmware_prompt: Some("Press ESCAPE for boot options".to_string()),
            netboot_marker: "Start PXE over IPv4".to_string(),
            max_attempts: 3,
            firmware_timeout_ms: 60_000,
            menu_steps: Vec::new(),
            menu_timeout_ms: 30_000,
            extlinux_prompt: "Press any other key to boot default".to_string(),
            extlinux_timeout_ms: 60_000,
            keystroke_delay_ms: 1_000,
        }
    }
}

impl BootScript {
    pub fn firmware_timeout(&self) -> Duration {
        ms(self.firmware_timeout_ms)
    }
    pub fn menu_timeout(&self) -> Duration {
        ms(self.menu_timeout_ms)
    }
    pub fn extlinux_timeout(&self) -> Duration {
        ms(self.extlinux_timeout_ms)
    }
    pub fn keystroke_delay(&self) -> Duration {
        ms(self.keystroke_delay_ms)
    }
}

/// Transcript markers the fault classifier listens for (regular expressions).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FaultPatterns {
    pub panic: String,
    pub smmu_global_fault: String,
    pub smmu_suppressed: String,
    pub emergency_shell: String,
    pub acr_failure: String,
    pub shell_prompt: String,
}

impl Default for FaultPatterns {
    fn default() -> Self {
        Self {
            panic: r"Kernel panic".to_string(),
            smmu_global_fault: r"Unexpected global fault".to_string(),
            smmu_suppressed: r"callbacks suppressed".to_string(),
            emergency_shell: r"Press \[ENTER\] to start bash".to_string(),
            acr_failure: r"nvgpu.*HS ucode boot failed".to_string(),
            shell_prompt: r"ubuntu@tegra-ubuntu:~\$".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub patterns: FaultPatterns,
    /// SMMU-class markers needed to call a fault storm
    pub smmu_threshold: u32,
    pub budget_ms: u64,
    pub poll_interval_ms: u64,
    /// Budget consumed by each SMMU-class or emergency-shell match
    pub smmu_charge_ms: u64,
    /// Extra listening after panic / firmware failure
    pub terminal_settle_ms: u64,
    /// Extra listening after a fault storm
    pub storm_settle_ms: u64,
    pub drain_ms: u64,
    /// Power-cycle before navigating; off when the update step already rebooted the board
    pub power_cycle: bool,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            patterns: FaultPatterns::default(),
            smmu_threshold: 5,
            budget_ms: 300_000,
            poll_interval_ms: 5_000,
            smmu_charge_ms: 1_000,
            terminal_settle_ms: 1_000,
            storm_settle_ms: 3_000,
            drain_ms: 3_000,
            power_cycle: false,
        }
    }
}

impl DetectionConfig {
    pub fn budget(&self) -> Duration {
        ms(self.budget_ms)
    }
    pub fn poll_interval(&self) -> Duration {
        ms(self.poll_interval_ms)
    }
    pub fn smmu_charge(&self) -> Duration {
        ms(self.smmu_charge_ms)
    }
    pub fn terminal_settle(&self) -> Duration {
        ms(self.terminal_settle_ms)
    }
    pub fn storm_settle(&self) -> Duration {
        ms(self.storm_settle_ms)
    }
    pub fn drain(&self) -> Duration {
        ms(self.drain_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadyConfig {
    pub prompt: String,
    pub timeout_ms: u64,
}

impl Default for ReadyConfig {
    fn default() -> Self {
        Self {
            prompt: r"ubuntu@tegra-ubuntu:~\$".to_string(),
            timeout_ms: 120_000,
        }
    }
}

impl ReadyConfig {
    pub fn timeout(&self) -> Duration {
        ms(self.timeout_ms)
    }
}

/// argv of each post-processing collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub mb1_start: Vec<String>,
    pub kernel_start: Vec<String>,
    pub panic: Vec<String>,
    pub hyp_output: Vec<String>,
    pub smmu_faults: Vec<String>,
    /// Receives the kernel log path as its last argument
    pub disassembler: Vec<String>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        let tool = |name: &str| vec![format!("tools/{name}")];
        Self {
            mb1_start: tool("filter-mb1-start"),
            kernel_start: tool("filter-kernel-start"),
            panic: tool("filter-panic"),
            hyp_output: tool("filter-hyp-output"),
            smmu_faults: tool("filter-smmu-faults"),
            disassembler: tool("disasm-2nd-frame"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub idle_poll_ms: u64,
    /// Bring the board to the ready state before the first request
    pub startup_boot: bool,
    /// Bound on waiting for the log capture task to exit
    pub capture_join_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            idle_poll_ms: 1_000,
            startup_boot: true,
            capture_join_ms: 1_000,
        }
    }
}

impl SchedulerConfig {
    pub fn idle_poll(&self) -> Duration {
        ms(self.idle_poll_ms)
    }
    pub fn capture_join(&self) -> Duration {
        ms(self.capture_join_ms)
    }
}
