//! Update variant: copy the kernel under test to a running board and reboot it.

use anyhow::{bail, Context, Result};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use tokio::process::Command;
use tracing::info;

use crate::config::TargetConfig;
use crate::error::HarnessError;

/// A concrete image deployment
#[derive(Debug, Clone)]
pub struct DeployPlan {
    pub image: PathBuf,
    pub version: String,
    pub target: TargetConfig,
}

impl DeployPlan {
    /// Resolve the image and kernel release from the configured kernel tree
    pub async fn resolve(target: &TargetConfig) -> Result<Self> {
        let release_file = target.kernel_release_file();
        let version = tokio::fs::read_to_string(&release_file)
            .await
            .with_context(|| format!("reading kernel release from {}", release_file.display()))?
            .trim()
            .to_string();
        if version.is_empty() {
            bail!("kernel release file {} is empty", release_file.display());
        }
        Ok(Self {
            image: target.kernel_image(),
            version,
            target: target.clone(),
        })
    }

    pub fn remote_path(&self) -> String {
        self.target.remote_path.replace("{version}", &self.version)
    }

    fn render(&self, template: &[String]) -> Result<Vec<String>> {
        if template.is_empty() {
            bail!("empty command template");
        }
        let image = self.image.display().to_string();
        let remote_path = self.remote_path();
        Ok(template
            .iter()
            .map(|arg| {
                arg.replace("{image}", &image)
                    .replace("{remote_path}", &remote_path)
                    .replace("{version}", &self.version)
                    .replace("{user}", &self.target.user)
                    .replace("{host}", &self.target.host)
            })
            .collect())
    }
}

/// Upload the image, then reboot the target into it.
///
/// Output of both commands goes to `log_path`. The reboot command may lose its
/// connection before returning, so its exit status is not checked.
pub async fn deploy(plan: &DeployPlan, log_path: &Path) -> Result<()> {
    let mut log = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .with_context(|| format!("opening {}", log_path.display()))?;

    let copy = plan.render(&plan.target.copy_command)?;
    info!(target: "deploy", version = %plan.version, remote = %plan.remote_path(), "uploading kernel");
    let status = run_logged(&copy, &mut log).await?;
    if !status.success() {
        return Err(HarnessError::ToolFailed {
            tool: copy[0].clone(),
            status,
        }
        .into());
    }

    let reboot = plan.render(&plan.target.reboot_command)?;
    info!(target: "deploy", host = %plan.target.host, "rebooting target");
    let status = run_logged(&reboot, &mut log).await?;
    if !status.success() {
        info!(target: "deploy", status = %status, "reboot command returned non-zero (connection drop expected)");
    }
    Ok(())
}

async fn run_logged(argv: &[String], log: &mut File) -> Result<ExitStatus> {
    writeln!(log, "$ {}", argv.join(" ")).context("writing update log")?;
    let stdout = log.try_clone().context("duplicating update log handle")?;
    let stderr = log.try_clone().context("duplicating update log handle")?;

    Command::new(&argv[0])
        .args(&argv[1..])
        .stdin(Stdio::null())
        .stdout(Stdio::from(stdout))
        .stderr(Stdio::from(stderr))
        .status()
        .await
        .with_context(|| format!("running {}", argv[0]))
}
