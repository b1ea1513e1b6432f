//! Hands the primary console to the operator until they press Ctrl+C.

use anyhow::{Context, Result};
use nix::sys::termios::{self, SetArg, Termios};
use tracing::{info, warn};

use super::OperatorInput;
use crate::transcript::Transcript;

const CTRL_C: u8 = 0x03;

/// Restores the terminal's cooked mode when dropped
struct RawTerminal {
    original: Termios,
}

impl RawTerminal {
    fn enter() -> Result<Self> {
        let stdin = std::io::stdin();
        let original = termios::tcgetattr(&stdin).context("reading terminal attributes")?;
        let mut raw = original.clone();
        termios::cfmakeraw(&mut raw);
        termios::tcsetattr(&stdin, SetArg::TCSANOW, &raw).context("setting raw terminal mode")?;
        Ok(Self { original })
    }
}

impl Drop for RawTerminal {
    fn drop(&mut self) {
        if let Err(e) = termios::tcsetattr(std::io::stdin(), SetArg::TCSANOW, &self.original) {
            warn!(target: "interactive", error = %e, "failed to restore terminal settings");
        }
    }
}

/// Pass-through between the operator and the board.
///
/// `initial` is input that triggered the hand-off and is forwarded first. Returns when
/// the operator presses Ctrl+C, stdin closes, or the console reaches EOF.
pub async fn pass_through(
    transcript: &mut Transcript,
    operator: &mut OperatorInput,
    initial: Option<Vec<u8>>,
) -> Result<()> {
    info!(target: "interactive", "entering interactive mode (Ctrl+C to exit)");

    let _raw = if operator.is_terminal() {
        Some(RawTerminal::enter()?)
    } else {
        None
    };

    if let Some(bytes) = initial {
        transcript.forward(&bytes).await?;
    }

    loop {
        tokio::select! {
            input = operator.recv() => {
                let Some(bytes) = input else {
                    info!(target: "interactive", "operator input closed");
                    break;
                };
                if let Some(pos) = bytes.iter().position(|b| *b == CTRL_C) {
                    if pos > 0 {
                        transcript.forward(&bytes[..pos]).await?;
                    }
                    break;
                }
                transcript.forward(&bytes).await?;
            }
            read = transcript.relay_chunk() => {
                if read? == 0 {
                    warn!(target: "interactive", "console closed during interactive session");
                    break;
                }
            }
        }
    }

    // Anything typed while leaving is not meant for the next job.
    let _ = operator.try_take();
    info!(target: "interactive", "leaving interactive mode");
    Ok(())
}
