//! Background drain of the secondary console into a file.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::console::ConsoleStream;

/// Back-off after a zero-byte read so a hung-up tty doesn't spin the loop
const IDLE_BACKOFF: Duration = Duration::from_millis(100);

/// A running capture; must be stopped before the owning job finishes.
///
/// Dropping the handle without [`CaptureHandle::stop`] still signals the task to exit.
pub struct CaptureHandle {
    path: PathBuf,
    cancel: CancellationToken,
    task: Option<JoinHandle<Result<u64>>>,
}

/// Start copying `stream` verbatim into `path` (appending) until stopped
pub async fn spawn_capture(
    stream: Box<dyn ConsoleStream>,
    path: &Path,
    chunk_size: usize,
) -> Result<CaptureHandle> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .with_context(|| format!("opening capture file {}", path.display()))?;

    let cancel = CancellationToken::new();
    let token = cancel.clone();
    let log_name = path.display().to_string();
    info!(target: "capture", file = %log_name, "starting log capture");

    let task = tokio::spawn(capture_loop(stream, file, token, chunk_size.max(1), log_name));

    Ok(CaptureHandle {
        path: path.to_path_buf(),
        cancel,
        task: Some(task),
    })
}

async fn capture_loop(
    mut stream: Box<dyn ConsoleStream>,
    mut file: tokio::fs::File,
    cancel: CancellationToken,
    chunk_size: usize,
    log_name: String,
) -> Result<u64> {
    let mut buf = vec![0u8; chunk_size];
    let mut total = 0u64;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            read = stream.read(&mut buf) => match read {
                Ok(0) => {
                    // No data yet; not an error.
                    tokio::time::sleep(IDLE_BACKOFF).await;
                }
                Ok(n) => {
                    file.write_all(&buf[..n]).await.context("writing capture file")?;
                    total += n as u64;
                }
                Err(e) => {
                    warn!(target: "capture", file = %log_name, error = %e, "capture read failed");
                    tokio::time::sleep(IDLE_BACKOFF).await;
                }
            }
        }
    }

    file.flush().await.context("flushing capture file")?;
    debug!(target: "capture", file = %log_name, bytes = total, "capture loop finished");
    Ok(total)
}

impl CaptureHandle {
    /// Signal the task and wait up to `join_timeout` for it; returns bytes captured.
    ///
    /// A task that does not exit in time is aborted.
    pub async fn stop(mut self, join_timeout: Duration) -> Result<u64> {
        self.cancel.cancel();
        let Some(mut task) = self.task.take() else {
            return Ok(0);
        };

        match tokio::time::timeout(join_timeout, &mut task).await {
            Ok(joined) => {
                let bytes = joined.context("capture task panicked")??;
                info!(target: "capture", file = %self.path.display(), bytes, "log capture stopped");
                Ok(bytes)
            }
            Err(_) => {
                warn!(target: "capture", file = %self.path.display(), "capture task did not stop in time, aborting");
                task.abort();
                Ok(0)
            }
        }
    }
}

impl Drop for CaptureHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
