// Common test utilities for autopilot integration tests
#![allow(dead_code)]

use anyhow::Result;
use autopilot::board::BoardLink;
use autopilot::config::{
    AutopilotConfig, BootScript, DetectionConfig, FilterConfig, ReadyConfig, SchedulerConfig,
    TargetConfig,
};
use autopilot::console::{ConsoleSource, ConsoleStream, OperatorInput};
use autopilot::harness::HarnessContext;
use autopilot::scheduler::Scheduler;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

pub const SHELL_PROMPT: &str = "ubuntu@tegra-ubuntu:~$ ";

/// Console output of a board that reaches the extlinux menu
pub const BOOT_MENU: &str = "MB1 start\r\nPress ESCAPE for boot options\r\n\
    L4T boot options\r\nPress any other key to boot default\r\n";

/// Records every power cycle
#[derive(Default)]
pub struct FakeBoard {
    boots: Mutex<Vec<bool>>,
}

impl FakeBoard {
    /// The `recovery` flag of each boot, in order
    pub fn boots(&self) -> Vec<bool> {
        self.boots.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl BoardLink for FakeBoard {
    async fn boot(&self, recovery: bool) -> Result<()> {
        self.boots.lock().unwrap().push(recovery);
        Ok(())
    }
}

/// Hands out one scripted session per console open.
///
/// Each session writes its script, then stays open and silent, swallowing whatever is
/// sent to it. Opens beyond the script get a silent session.
#[derive(Default)]
pub struct ScriptedConsoles {
    primary: Mutex<VecDeque<Vec<u8>>>,
    secondary: Mutex<VecDeque<Vec<u8>>>,
    sent: Arc<Mutex<Vec<u8>>>,
}

impl ScriptedConsoles {
    pub fn primary(self, script: impl Into<Vec<u8>>) -> Self {
        self.primary.lock().unwrap().push_back(script.into());
        self
    }

    pub fn secondary(self, script: impl Into<Vec<u8>>) -> Self {
        self.secondary.lock().unwrap().push_back(script.into());
        self
    }

    /// Everything written to any primary session so far
    pub fn sent(&self) -> Vec<u8> {
        self.sent.lock().unwrap().clone()
    }

    /// Scripts not yet consumed by an open
    pub fn unused_primary(&self) -> usize {
        self.primary.lock().unwrap().len()
    }

    fn session(script: Vec<u8>, sent: Option<Arc<Mutex<Vec<u8>>>>) -> Box<dyn ConsoleStream> {
        let (near, mut far) = tokio::io::duplex(64 * 1024);
        tokio::spawn(async move {
            if far.write_all(&script).await.is_err() {
                return;
            }
            let mut buf = [0u8; 256];
            while let Ok(n) = far.read(&mut buf).await {
                if n == 0 {
                    break;
                }
                if let Some(sent) = &sent {
                    sent.lock().unwrap().extend_from_slice(&buf[..n]);
                }
            }
        });
        Box::new(near)
    }
}

#[async_trait::async_trait]
impl ConsoleSource for ScriptedConsoles {
    async fn open_primary(&self) -> Result<Box<dyn ConsoleStream>> {
        let script = self.primary.lock().unwrap().pop_front().unwrap_or_default();
        Ok(Self::session(script, Some(self.sent.clone())))
    }

    async fn open_secondary(&self) -> Result<Box<dyn ConsoleStream>> {
        let script = self.secondary.lock().unwrap().pop_front().unwrap_or_default();
        Ok(Self::session(script, None))
    }
}

/// Boot script with the default markers and short timeouts
pub fn fast_boot_script() -> BootScript {
    BootScript {
        firmware_timeout_ms: 1000,
        menu_timeout_ms: 1000,
        extlinux_timeout_ms: 1000,
        keystroke_delay_ms: 0,
        ..BootScript::default()
    }
}

pub fn fast_detection() -> DetectionConfig {
    DetectionConfig {
        budget_ms: 1000,
        poll_interval_ms: 100,
        smmu_charge_ms: 10,
        terminal_settle_ms: 10,
        storm_settle_ms: 10,
        drain_ms: 50,
        ..DetectionConfig::default()
    }
}

pub fn fast_ready() -> ReadyConfig {
    ReadyConfig {
        timeout_ms: 1000,
        ..ReadyConfig::default()
    }
}

/// Filters that copy their input, and a disassembler that names its argument
pub fn passthrough_filters() -> FilterConfig {
    let cat = || vec!["cat".to_string()];
    FilterConfig {
        mb1_start: cat(),
        kernel_start: cat(),
        panic: cat(),
        hyp_output: cat(),
        smmu_faults: vec!["grep".to_string(), "global fault".to_string()],
        disassembler: vec![
            "sh".to_string(),
            "-c".to_string(),
            "echo \"disassembled frame from $0\"".to_string(),
        ],
    }
}

/// Kernel tree with an image and release file under `workspace`, deployed by `cp`
pub fn local_target(workspace: &Path, version: &str) -> TargetConfig {
    let target = TargetConfig {
        workspace: workspace.to_path_buf(),
        kernel_tree: PathBuf::from("kernel"),
        remote_path: workspace
            .join("deployed-{version}")
            .to_string_lossy()
            .into_owned(),
        copy_command: vec!["cp".into(), "{image}".into(), "{remote_path}".into()],
        reboot_command: vec!["true".into()],
        ..TargetConfig::default()
    };
    let image = target.kernel_image();
    std::fs::create_dir_all(image.parent().unwrap()).unwrap();
    std::fs::write(&image, b"Image").unwrap();
    let release = target.kernel_release_file();
    std::fs::create_dir_all(release.parent().unwrap()).unwrap();
    std::fs::write(&release, format!("{}\n", version)).unwrap();
    target
}

pub fn test_config(workspace: &Path) -> AutopilotConfig {
    let mut config = AutopilotConfig::default();
    config.consoles.echo = false;
    config.boot = fast_boot_script();
    config.detection = fast_detection();
    config.ready = fast_ready();
    config.filters = passthrough_filters();
    config.target = local_target(workspace, "5.15.0-test");
    config.scheduler = SchedulerConfig {
        idle_poll_ms: 20,
        startup_boot: false,
        capture_join_ms: 500,
    };
    config
}

pub struct Rig {
    pub board: Arc<FakeBoard>,
    pub consoles: Arc<ScriptedConsoles>,
    pub scheduler: Scheduler,
}

pub fn rig(base_dir: &Path, config: AutopilotConfig, consoles: ScriptedConsoles) -> Rig {
    rig_with_operator(base_dir, config, consoles, OperatorInput::none())
}

pub fn rig_with_operator(
    base_dir: &Path,
    config: AutopilotConfig,
    consoles: ScriptedConsoles,
    operator: OperatorInput,
) -> Rig {
    let board = Arc::new(FakeBoard::default());
    let consoles = Arc::new(consoles);
    let ctx = HarnessContext {
        board: board.clone(),
        consoles: consoles.clone(),
        boot: config.boot.clone(),
        echo: false,
    };
    let scheduler = Scheduler::new(base_dir, config, ctx, operator);
    Rig {
        board,
        consoles,
        scheduler,
    }
}
