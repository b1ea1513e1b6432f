//! Pattern matching over a live console transcript.
//!
//! Everything read from or sent to the console is teed to the operator's terminal and
//! to the session log before any matching happens, so the log never misses bytes the
//! operator saw.

use anyhow::{Context, Result};
use regex::bytes::Regex;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::Instant;
use tracing::warn;

use crate::console::{ConsoleSource, ConsoleStream};

/// Unconsumed bytes kept for matching; older output is only in the log.
const SEARCH_WINDOW: usize = 64 * 1024;

const READ_CHUNK: usize = 4096;

/// Fan-out of console traffic to the terminal and log files
pub struct Tee {
    sinks: Vec<Box<dyn Write + Send>>,
}

impl Tee {
    pub fn new() -> Self {
        Self { sinks: Vec::new() }
    }

    pub fn with(mut self, sink: impl Write + Send + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    /// Terminal only
    pub fn terminal() -> Self {
        Self::new().with(std::io::stdout())
    }

    /// Fresh log file at `log_path`, plus the terminal when `echo` is set
    pub fn open(log_path: &Path, echo: bool) -> Result<Self> {
        let file = File::create(log_path)
            .with_context(|| format!("creating transcript log {}", log_path.display()))?;
        let tee = Self::new().with(file);
        Ok(if echo { tee.with(std::io::stdout()) } else { tee })
    }

    // Blocking writes; console traffic is at serial rates and must hit the log in order.
    fn write(&mut self, data: &[u8]) -> Result<()> {
        for sink in &mut self.sinks {
            sink.write_all(data).context("writing transcript")?;
            sink.flush().context("flushing transcript")?;
        }
        Ok(())
    }
}

impl Default for Tee {
    fn default() -> Self {
        Self::new()
    }
}

/// Ordered alternatives for [`Transcript::expect`]
#[derive(Debug, Clone)]
pub struct PatternSet {
    patterns: Vec<Regex>,
}

impl PatternSet {
    pub fn new<I, S>(patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|p| {
                let p = p.as_ref();
                Regex::new(p).with_context(|| format!("compiling pattern '{}'", p))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    /// Matches nothing; expecting it only drains output until timeout or EOF
    pub fn never() -> Self {
        Self {
            patterns: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Pattern whose match starts earliest; ties go to the lower index.
    /// Returns `(index, match_end)`.
    fn earliest(&self, haystack: &[u8]) -> Option<(usize, usize)> {
        self.patterns
            .iter()
            .enumerate()
            .filter_map(|(index, re)| re.find(haystack).map(|m| (m.start(), index, m.end())))
            .min_by_key(|(start, index, _)| (*start, *index))
            .map(|(_, index, end)| (index, end))
    }
}

/// Result of one [`Transcript::expect`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expect {
    Matched(usize),
    Timeout,
    Eof,
}

/// A console session with an expect/send interface
pub struct Transcript {
    stream: Box<dyn ConsoleStream>,
    tee: Tee,
    buffer: Vec<u8>,
    eof: bool,
}

impl Transcript {
    pub fn new(stream: Box<dyn ConsoleStream>, tee: Tee) -> Self {
        Self {
            stream,
            tee,
            buffer: Vec::new(),
            eof: false,
        }
    }

    /// Open the primary console with its traffic logged to `log_path`
    pub async fn open_primary(
        consoles: &dyn ConsoleSource,
        log_path: &Path,
        echo: bool,
    ) -> Result<Self> {
        let tee = Tee::open(log_path, echo)?;
        let stream = consoles
            .open_primary()
            .await
            .context("opening primary console")?;
        Ok(Self::new(stream, tee))
    }

    /// Wait until one of `patterns` appears, the timeout elapses, or the console closes.
    ///
    /// Text up to the end of the match is consumed; on timeout the unmatched text stays
    /// buffered for the next call.
    pub async fn expect(&mut self, patterns: &PatternSet, timeout: Duration) -> Result<Expect> {
        let deadline = Instant::now() + timeout;
        let mut chunk = [0u8; READ_CHUNK];

        loop {
            if let Some((index, end)) = patterns.earliest(&self.buffer) {
                self.buffer.drain(..end);
                return Ok(Expect::Matched(index));
            }
            if self.eof {
                return Ok(Expect::Eof);
            }

            match tokio::time::timeout_at(deadline, self.stream.read(&mut chunk)).await {
                Err(_elapsed) => return Ok(Expect::Timeout),
                Ok(Ok(0)) => self.eof = true,
                Ok(Ok(n)) => {
                    self.tee.write(&chunk[..n])?;
                    self.absorb(&chunk[..n]);
                }
                Ok(Err(e)) => {
                    // A vanished tty (e.g. USB re-enumeration) ends the session.
                    warn!(target: "harness", error = %e, "console read failed, treating as EOF");
                    self.eof = true;
                }
            }
        }
    }

    /// Send bytes to the console
    pub async fn send(&mut self, bytes: &[u8]) -> Result<()> {
        self.tee.write(bytes)?;
        self.stream
            .write_all(bytes)
            .await
            .context("writing to console")?;
        self.stream.flush().await.context("flushing console")?;
        Ok(())
    }

    /// Send operator keystrokes without teeing them; the board echoes what it accepts
    pub async fn forward(&mut self, bytes: &[u8]) -> Result<()> {
        self.stream
            .write_all(bytes)
            .await
            .context("writing to console")?;
        self.stream.flush().await.context("flushing console")
    }

    /// Read one chunk straight through to the tee without matching; 0 means EOF
    pub async fn relay_chunk(&mut self) -> Result<usize> {
        let mut chunk = [0u8; READ_CHUNK];
        let n = self
            .stream
            .read(&mut chunk)
            .await
            .context("reading console")?;
        if n == 0 {
            self.eof = true;
        } else {
            self.tee.write(&chunk[..n])?;
        }
        Ok(n)
    }

    fn absorb(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
        if self.buffer.len() > SEARCH_WINDOW {
            let excess = self.buffer.len() - SEARCH_WINDOW;
            self.buffer.drain(..excess);
        }
    }
}
