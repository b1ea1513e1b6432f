//! Derived logs of a finished run, produced by external line filters.

use anyhow::{bail, Context, Result};
use std::fs::File;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::FilterConfig;
use crate::error::HarnessError;
use crate::harness::FaultClass;
use crate::paths::bundle;

/// Run every filter stage over a result bundle.
///
/// Panic runs get a disassembly of the faulting frame; other runs get a placeholder
/// so `disassembly.log` always exists.
pub async fn process_bundle(dir: &Path, class: FaultClass, filters: &FilterConfig) -> Result<()> {
    info!(target: "postprocess", bundle = %dir.display(), class = %class, "processing logs");

    let stages = [
        (&filters.mb1_start, bundle::UART_RAW_LOG, bundle::UART_LOG),
        (&filters.kernel_start, bundle::UART_LOG, bundle::KERNEL_LOG),
        (&filters.panic, bundle::KERNEL_LOG, bundle::PANIC_LOG),
        (&filters.hyp_output, bundle::UARTI_LOG, bundle::HYP_LOG),
    ];
    for (argv, input, output) in stages {
        filter(argv, &dir.join(input), &dir.join(output)).await?;
    }

    if class == FaultClass::SmmuFault {
        filter(
            &filters.smmu_faults,
            &dir.join(bundle::KERNEL_LOG),
            &dir.join(bundle::SMMU_FAULTS_LOG),
        )
        .await?;
    }

    let disassembly = dir.join(bundle::DISASSEMBLY_LOG);
    if class == FaultClass::Panic {
        let kernel_log = dir.join(bundle::KERNEL_LOG);
        run_tool(&filters.disassembler, Some(&kernel_log), None, &disassembly).await?;
    } else {
        tokio::fs::write(
            &disassembly,
            format!("No disassembly available (fault_type: {})\n", class),
        )
        .await
        .context("writing disassembly placeholder")?;
    }
    Ok(())
}

/// `argv < input > output`
async fn filter(argv: &[String], input: &Path, output: &Path) -> Result<()> {
    run_tool(argv, None, Some(input), output).await
}

async fn run_tool(
    argv: &[String],
    extra_arg: Option<&Path>,
    stdin: Option<&Path>,
    output: &Path,
) -> Result<()> {
    let Some((program, args)) = argv.split_first() else {
        bail!("empty filter command for {}", output.display());
    };
    debug!(target: "postprocess", program = %program, output = %output.display(), "running filter");

    let stdout =
        File::create(output).with_context(|| format!("creating {}", output.display()))?;
    let stdin = match stdin {
        Some(path) => Stdio::from(
            File::open(path).with_context(|| format!("opening {}", path.display()))?,
        ),
        None => Stdio::null(),
    };

    let mut cmd = Command::new(program);
    cmd.args(args);
    if let Some(arg) = extra_arg {
        cmd.arg(arg);
    }
    let status = cmd
        .stdin(stdin)
        .stdout(Stdio::from(stdout))
        .status()
        .await
        .with_context(|| format!("running {}", program))?;

    if !status.success() {
        return Err(HarnessError::ToolFailed {
            tool: program.clone(),
            status,
        }
        .into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn cat_filters() -> FilterConfig {
        let cat = || vec!["cat".to_string()];
        FilterConfig {
            mb1_start: cat(),
            kernel_start: cat(),
            panic: cat(),
            hyp_output: cat(),
            smmu_faults: cat(),
            disassembler: vec!["cat".to_string()],
        }
    }

    fn bundle_with_logs() -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(bundle::UART_RAW_LOG), "raw\n").unwrap();
        std::fs::write(dir.path().join(bundle::UARTI_LOG), "hyp\n").unwrap();
        dir
    }

    #[tokio::test]
    async fn test_panic_disassembles_kernel_log() {
        let dir = bundle_with_logs();
        process_bundle(dir.path(), FaultClass::Panic, &cat_filters())
            .await
            .unwrap();

        // `cat <kernel.log>` reproduces the kernel log
        let disasm = std::fs::read_to_string(dir.path().join(bundle::DISASSEMBLY_LOG)).unwrap();
        assert_eq!(disasm, "raw\n");
        assert_eq!(
            std::fs::read_to_string(dir.path().join(bundle::HYP_LOG)).unwrap(),
            "hyp\n"
        );
        assert!(!dir.path().join(bundle::SMMU_FAULTS_LOG).exists());
    }

    #[tokio::test]
    async fn test_failing_stage_is_tool_failed() {
        let dir = bundle_with_logs();
        let mut filters = cat_filters();
        filters.panic = vec!["false".to_string()];

        let err = process_bundle(dir.path(), FaultClass::Timeout, &filters)
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<HarnessError>(),
            Some(HarnessError::ToolFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_empty_filter_is_rejected() {
        let dir = bundle_with_logs();
        let mut filters = cat_filters();
        filters.hyp_output = Vec::new();

        assert!(process_bundle(dir.path(), FaultClass::Eof, &filters)
            .await
            .is_err());
    }
}
