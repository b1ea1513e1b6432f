//! Byte-stream access to the board's consoles and to the operator's terminal.

pub mod interactive;
pub mod operator;
pub mod serial;

pub use operator::OperatorInput;
pub use serial::SerialPort;

use anyhow::Result;
use std::path::PathBuf;
use tokio::io::{AsyncRead, AsyncWrite};

/// A duplex console byte stream
pub trait ConsoleStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> ConsoleStream for T {}

/// Opens fresh sessions on the board's consoles.
///
/// The primary console carries the boot transcript and accepts keystrokes; the
/// secondary console is read-only from our side and belongs to the log capture task.
#[async_trait::async_trait]
pub trait ConsoleSource: Send + Sync {
    async fn open_primary(&self) -> Result<Box<dyn ConsoleStream>>;
    async fn open_secondary(&self) -> Result<Box<dyn ConsoleStream>>;
}

/// Consoles exposed as local serial devices
pub struct SerialConsoles {
    primary: PathBuf,
    secondary: PathBuf,
    baud: u32,
}

impl SerialConsoles {
    pub fn new(primary: PathBuf, secondary: PathBuf, baud: u32) -> Self {
        Self {
            primary,
            secondary,
            baud,
        }
    }
}

#[async_trait::async_trait]
impl ConsoleSource for SerialConsoles {
    async fn open_primary(&self) -> Result<Box<dyn ConsoleStream>> {
        Ok(Box::new(SerialPort::open(&self.primary, self.baud)?))
    }

    async fn open_secondary(&self) -> Result<Box<dyn ConsoleStream>> {
        Ok(Box::new(SerialPort::open(&self.secondary, self.baud)?))
    }
}
