//! Outcome classification of a panic-capture boot.
//!
//! The listening loop is split in two: [`Detector::advance`] is a pure transition over
//! transcript signals, and [`classify`] feeds it from a live [`Transcript`].

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::{DetectionConfig, FaultPatterns};
use crate::console::OperatorInput;
use crate::transcript::{Expect, PatternSet, Transcript};

const CONFIRM: &[u8] = b"\r";

/// Outcome of exactly one boot attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultClass {
    Success,
    Panic,
    SmmuFault,
    BashPrompt,
    NvgpuAcrFail,
    UserInterrupted,
    Timeout,
    Eof,
}

impl FaultClass {
    pub fn as_str(self) -> &'static str {
        match self {
            FaultClass::Success => "success",
            FaultClass::Panic => "panic",
            FaultClass::SmmuFault => "smmu_fault",
            FaultClass::BashPrompt => "bash_prompt",
            FaultClass::NvgpuAcrFail => "nvgpu_acr_fail",
            FaultClass::UserInterrupted => "user_interrupted",
            FaultClass::Timeout => "timeout",
            FaultClass::Eof => "eof",
        }
    }

    /// Whether the board is left in a state the next job cannot start from
    pub fn needs_recovery(self) -> bool {
        !matches!(self, FaultClass::Success | FaultClass::UserInterrupted)
    }
}

impl fmt::Display for FaultClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What one listening iteration observed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Panic,
    SmmuFault,
    EmergencyShell,
    AcrFailure,
    ShellPrompt,
    OperatorInput,
    Timeout,
    Eof,
}

/// Signal for each entry of [`fault_patterns`], in order
const PATTERN_SIGNALS: [Signal; 6] = [
    Signal::Panic,
    Signal::SmmuFault,
    Signal::SmmuFault,
    Signal::EmergencyShell,
    Signal::AcrFailure,
    Signal::ShellPrompt,
];

fn fault_patterns(patterns: &FaultPatterns) -> Result<PatternSet> {
    PatternSet::new([
        &patterns.panic,
        &patterns.smmu_global_fault,
        &patterns.smmu_suppressed,
        &patterns.emergency_shell,
        &patterns.acr_failure,
        &patterns.shell_prompt,
    ])
}

/// Evidence accumulated while listening
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Detector {
    pub smmu_faults: u32,
    pub bash_prompt_seen: bool,
    pub budget: Duration,
}

/// What the listening loop does next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Listen,
    /// Answer an emergency shell prompt and keep listening
    Confirm,
    /// Stop listening after `settle` more time on the console
    Finish { class: FaultClass, settle: Duration },
}

fn finish(class: FaultClass, settle: Duration) -> Step {
    Step::Finish { class, settle }
}

impl Detector {
    pub fn new(config: &DetectionConfig) -> Self {
        Self {
            smmu_faults: 0,
            bash_prompt_seen: false,
            budget: config.budget(),
        }
    }

    pub fn advance(self, signal: Signal, config: &DetectionConfig) -> (Self, Step) {
        let mut next = self;
        let step = match signal {
            Signal::OperatorInput => finish(FaultClass::UserInterrupted, Duration::ZERO),
            Signal::Panic => finish(FaultClass::Panic, config.terminal_settle()),
            Signal::AcrFailure => finish(FaultClass::NvgpuAcrFail, config.terminal_settle()),
            Signal::ShellPrompt => finish(FaultClass::Success, Duration::ZERO),
            Signal::EmergencyShell => {
                // May belong to another console consumer; keep listening.
                next.bash_prompt_seen = true;
                next.budget = next.budget.saturating_sub(config.smmu_charge());
                if next.budget.is_zero() {
                    next.quiet_verdict()
                } else {
                    Step::Confirm
                }
            }
            Signal::SmmuFault => {
                next.smmu_faults += 1;
                next.budget = next.budget.saturating_sub(config.smmu_charge());
                if next.smmu_faults >= config.smmu_threshold {
                    finish(FaultClass::SmmuFault, config.storm_settle())
                } else if next.budget.is_zero() {
                    next.quiet_verdict()
                } else {
                    Step::Listen
                }
            }
            Signal::Timeout => {
                next.budget = next.budget.saturating_sub(config.poll_interval());
                if next.bash_prompt_seen || next.smmu_faults > 0 || next.budget.is_zero() {
                    next.quiet_verdict()
                } else {
                    Step::Listen
                }
            }
            Signal::Eof => {
                let class = if next.smmu_faults > 0 {
                    FaultClass::SmmuFault
                } else if next.bash_prompt_seen {
                    FaultClass::BashPrompt
                } else {
                    FaultClass::Eof
                };
                finish(class, Duration::ZERO)
            }
        };
        (next, step)
    }

    /// Verdict once the console has gone quiet
    fn quiet_verdict(&self) -> Step {
        let class = if self.bash_prompt_seen {
            FaultClass::BashPrompt
        } else if self.smmu_faults > 0 {
            FaultClass::SmmuFault
        } else {
            FaultClass::Timeout
        };
        finish(class, Duration::ZERO)
    }
}

/// Listen to a booting kernel until it reaches a terminal outcome
pub async fn classify(
    transcript: &mut Transcript,
    config: &DetectionConfig,
    operator: &mut OperatorInput,
) -> Result<FaultClass> {
    let patterns = fault_patterns(&config.patterns)?;
    let mut detector = Detector::new(config);
    info!(target: "classify", budget = ?detector.budget, "waiting for kernel panic, SMMU faults or shell");

    let class = loop {
        let signal = if let Some(input) = operator.try_take() {
            info!(target: "classify", input = ?String::from_utf8_lossy(&input), "operator input detected");
            transcript.send(&input).await?;
            Signal::OperatorInput
        } else {
            match transcript.expect(&patterns, config.poll_interval()).await? {
                Expect::Matched(index) => PATTERN_SIGNALS[index],
                Expect::Timeout => Signal::Timeout,
                Expect::Eof => Signal::Eof,
            }
        };

        let (next, step) = detector.advance(signal, config);
        detector = next;
        match step {
            Step::Listen => {}
            Step::Confirm => {
                info!(target: "classify", "emergency shell prompt, sending ENTER");
                transcript.send(CONFIRM).await?;
            }
            Step::Finish { class, settle } => {
                if !settle.is_zero() {
                    tokio::time::sleep(settle).await;
                }
                break class;
            }
        }
    };

    match class {
        FaultClass::SmmuFault => {
            info!(target: "classify", faults = detector.smmu_faults, "collected SMMU fault instances")
        }
        FaultClass::Success | FaultClass::UserInterrupted => {
            info!(target: "classify", class = %class, "boot finished")
        }
        _ => warn!(target: "classify", class = %class, "boot failed"),
    }

    // Let the kernel finish talking so the log holds the whole story.
    transcript.expect(&PatternSet::never(), config.drain()).await?;
    Ok(class)
}
