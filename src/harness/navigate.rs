//! Power-on and bootloader menu navigation shared by every booting harness.

use anyhow::Result;
use std::time::Duration;
use tracing::{info, warn};

use crate::board::BoardLink;
use crate::config::BootScript;
use crate::error::HarnessError;
use crate::transcript::{Expect, PatternSet, Transcript};

const CURSOR_DOWN: &[u8] = b"\x1b[B";
const CONFIRM: &[u8] = b"\r";

/// Entry picked at the final bootloader prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootOption {
    Default,
    /// Stock kernel used to bring the board back to a reachable state
    Vanilla,
    /// Kernel under test with panic capture enabled
    PanicCapture,
}

impl BootOption {
    pub fn key(self) -> u8 {
        match self {
            BootOption::Default => b'0',
            BootOption::Vanilla => b'1',
            BootOption::PanicCapture => b'2',
        }
    }
}

/// Bring the board from power-on to a running kernel of the chosen entry.
///
/// With `power_on == false` the board is assumed to be rebooting already; a retry
/// after a network-boot fallthrough always power-cycles.
pub async fn navigate(
    transcript: &mut Transcript,
    board: &dyn BoardLink,
    script: &BootScript,
    option: BootOption,
    power_on: bool,
) -> Result<()> {
    reach_firmware(transcript, board, script, power_on).await?;

    for (i, step) in script.menu_steps.iter().enumerate() {
        info!(target: "harness", step = i + 1, marker = %step.marker, down = step.down, "navigating boot menu");
        wait_for(transcript, &step.marker, script.menu_timeout()).await?;
        for _ in 0..step.down {
            transcript.send(CURSOR_DOWN).await?;
        }
        transcript.send(CONFIRM).await?;
    }

    info!(target: "harness", "waiting for extlinux menu");
    wait_for(transcript, &script.extlinux_prompt, script.extlinux_timeout()).await?;
    tokio::time::sleep(script.keystroke_delay()).await;
    info!(target: "harness", option = ?option, "selecting boot entry");
    transcript.send(&[option.key()]).await
}

async fn reach_firmware(
    transcript: &mut Transcript,
    board: &dyn BoardLink,
    script: &BootScript,
    power_on: bool,
) -> Result<()> {
    let Some(prompt) = script.firmware_prompt.as_deref() else {
        if power_on {
            board.boot(false).await?;
        }
        return Ok(());
    };

    let patterns = PatternSet::new([prompt, script.netboot_marker.as_str()])?;
    for attempt in 1..=script.max_attempts {
        if power_on || attempt > 1 {
            info!(target: "harness", attempt, "booting board in normal mode");
            board.boot(false).await?;
        }
        match transcript.expect(&patterns, script.firmware_timeout()).await? {
            Expect::Matched(0) => return Ok(()),
            Expect::Matched(_) => {
                warn!(target: "harness", attempt, "firmware fell through to network boot");
            }
            Expect::Timeout => {
                return Err(HarnessError::MarkerTimeout {
                    stage: prompt.to_string(),
                    waited: script.firmware_timeout(),
                }
                .into())
            }
            Expect::Eof => {
                return Err(HarnessError::ConsoleClosed {
                    stage: prompt.to_string(),
                }
                .into())
            }
        }
    }

    Err(HarnessError::BootRetriesExhausted {
        attempts: script.max_attempts,
    }
    .into())
}

/// Wait for a single marker; anything else is a hard error
pub(crate) async fn wait_for(
    transcript: &mut Transcript,
    marker: &str,
    timeout: Duration,
) -> Result<()> {
    let patterns = PatternSet::new([marker])?;
    match transcript.expect(&patterns, timeout).await? {
        Expect::Matched(_) => Ok(()),
        Expect::Timeout => Err(HarnessError::MarkerTimeout {
            stage: marker.to_string(),
            waited: timeout,
        }
        .into()),
        Expect::Eof => Err(HarnessError::ConsoleClosed {
            stage: marker.to_string(),
        }
        .into()),
    }
}
