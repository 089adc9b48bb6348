//! Terminal display surface and the process runtime traits the bridge drives.

use std::io::{self, Write as _};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;

use crate::errors::ShellError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminalSize {
    pub cols: u16,
    pub rows: u16,
}

impl Default for TerminalSize {
    fn default() -> Self {
        Self { cols: 80, rows: 15 }
    }
}

/// A display that receives every byte of shell output.
pub trait Terminal: Send + Sync {
    fn write(&self, data: &str);
    fn cols(&self) -> u16;
    fn rows(&self) -> u16;

    /// Human keystrokes, if this terminal accepts input. Can be taken once.
    fn take_input(&self) -> Option<mpsc::UnboundedReceiver<String>> {
        None
    }

    fn size(&self) -> TerminalSize {
        TerminalSize {
            cols: self.cols(),
            rows: self.rows(),
        }
    }
}

/// The input side of a spawned interactive shell.
#[async_trait]
pub trait ShellProcess: Send {
    async fn write(&mut self, data: &str) -> io::Result<()>;

    /// Ask the foreground command to stop. Defaults to Ctrl-C on the input.
    async fn interrupt(&mut self) -> io::Result<()> {
        self.write("\u{3}").await
    }

    async fn kill(&mut self) -> io::Result<()>;
}

/// A freshly spawned shell: its input handle and its merged output.
pub struct SpawnedShell {
    pub process: Box<dyn ShellProcess>,
    pub output: Box<dyn AsyncRead + Send + Unpin>,
}

/// Spawns interactive shells sized to a terminal.
#[async_trait]
pub trait ProcessRuntime: Send + Sync {
    async fn spawn_shell(&self, size: TerminalSize) -> Result<SpawnedShell, ShellError>;
}

/// Writes shell output to stdout with sentinels removed.
#[derive(Debug, Clone, Copy)]
pub struct StdoutTerminal {
    size: TerminalSize,
}

impl StdoutTerminal {
    pub fn new(size: TerminalSize) -> Self {
        Self { size }
    }
}

impl Terminal for StdoutTerminal {
    fn write(&self, data: &str) {
        let visible = super::osc::strip_osc(data);
        let mut out = io::stdout().lock();
        let _ = out.write_all(visible.as_bytes());
        let _ = out.flush();
    }

    fn cols(&self) -> u16 {
        self.size.cols
    }

    fn rows(&self) -> u16 {
        self.size.rows
    }
}

/// Records everything written to it. Keystrokes can be injected through
/// [`BufferTerminal::input_sender`].
#[derive(Clone)]
pub struct BufferTerminal {
    size: TerminalSize,
    buffer: Arc<Mutex<String>>,
    input_tx: mpsc::UnboundedSender<String>,
    input_rx: Arc<Mutex<Option<mpsc::UnboundedReceiver<String>>>>,
}

impl Default for BufferTerminal {
    fn default() -> Self {
        Self::new(TerminalSize::default())
    }
}

impl BufferTerminal {
    pub fn new(size: TerminalSize) -> Self {
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        Self {
            size,
            buffer: Arc::new(Mutex::new(String::new())),
            input_tx,
            input_rx: Arc::new(Mutex::new(Some(input_rx))),
        }
    }

    pub fn contents(&self) -> String {
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn input_sender(&self) -> mpsc::UnboundedSender<String> {
        self.input_tx.clone()
    }
}

impl Terminal for BufferTerminal {
    fn write(&self, data: &str) {
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_str(data);
    }

    fn cols(&self) -> u16 {
        self.size.cols
    }

    fn rows(&self) -> u16 {
        self.size.rows
    }

    fn take_input(&self) -> Option<mpsc::UnboundedReceiver<String>> {
        self.input_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}
