use std::io::Read;
use tokio::sync::mpsc;
use tracing::debug;

/// Keystrokes typed by a human at the service's terminal.
///
/// A detached thread owns stdin and forwards every chunk it reads, so the control
/// loop can check for input without blocking and the interactive mode can await it.
pub struct OperatorInput {
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
    terminal: bool,
    _keepalive: Option<mpsc::UnboundedSender<Vec<u8>>>,
}

impl OperatorInput {
    /// Attach to the process's stdin
    pub fn stdin() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        std::thread::spawn(move || {
            let mut stdin = std::io::stdin();
            let mut buf = [0u8; 1024];
            loop {
                match stdin.read(&mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if tx.send(buf[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                }
            }
            debug!(target: "interactive", "stdin reader exiting");
        });
        Self {
            rx,
            terminal: atty::is(atty::Stream::Stdin),
            _keepalive: None,
        }
    }

    /// Input fed programmatically through the returned sender
    pub fn channel() -> (mpsc::UnboundedSender<Vec<u8>>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        let input = Self {
            rx,
            terminal: false,
            _keepalive: None,
        };
        (tx, input)
    }

    /// Input that never arrives
    pub fn none() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            rx,
            terminal: false,
            _keepalive: Some(tx),
        }
    }

    /// Take everything typed so far without waiting
    pub fn try_take(&mut self) -> Option<Vec<u8>> {
        let mut pending: Option<Vec<u8>> = None;
        while let Ok(chunk) = self.rx.try_recv() {
            pending.get_or_insert_with(Vec::new).extend_from_slice(&chunk);
        }
        pending.filter(|bytes| !bytes.is_empty())
    }

    /// Wait for the next chunk; `None` once stdin is closed
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        self.rx.recv().await
    }

    /// Whether input comes from a real terminal that can be put in raw mode
    pub fn is_terminal(&self) -> bool {
        self.terminal
    }
}
