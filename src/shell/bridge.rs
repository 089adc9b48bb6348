//! Serialized command execution against one long-lived interactive shell.
//!
//! State machine: uninitialized → ready (after the `interactive` sentinel)
//! ⇄ executing. At most one command is in flight: a new command interrupts
//! the active one and waits for it to settle before writing its own input.
//! A command that outlived its soft timeout is settled the same way before
//! the next command is written.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::osc::{EXIT_EVENT, OscScanner, READY_EVENT, sentinel_end};
use super::terminal::{ProcessRuntime, ShellProcess, SpawnedShell, Terminal};
use crate::errors::ShellError;
use crate::util::{Utf8Decoder, truncate_str};

const READ_BUFFER_SIZE: usize = 4096;

#[derive(Debug, Clone, Copy)]
pub struct BridgeOptions {
    /// Hard limit for the `interactive` sentinel at startup
    pub ready_timeout: Duration,
    /// Soft limit per command: on expiry the partial output is returned
    pub command_timeout: Duration,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            ready_timeout: Duration::from_secs(30),
            command_timeout: Duration::from_secs(30),
        }
    }
}

/// Published on every command start and finish.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExecutionState {
    pub session_id: String,
    pub command: String,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionResult {
    /// Raw bytes received since submission, up to and including the
    /// completion sentinel
    pub output: String,
    /// The same output with sentinel sequences removed
    pub visible: String,
    /// Status carried by the `exit` sentinel; 0 when the wait timed out
    pub exit_code: i32,
    /// The sentinel never arrived; the command may still be running
    pub timed_out: bool,
}

impl ExecutionResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0 && !self.timed_out
    }
}

type SharedProcess = Arc<Mutex<Box<dyn ShellProcess>>>;

/// The bridge's own copy of shell output.
struct OutputReader {
    rx: mpsc::UnboundedReceiver<String>,
    scanner: OscScanner,
    raw: String,
    /// A command's wait timed out before its `exit` sentinel arrived
    unsettled: bool,
}

impl OutputReader {
    fn new(rx: mpsc::UnboundedReceiver<String>) -> Self {
        Self {
            rx,
            scanner: OscScanner::new(),
            raw: String::new(),
            unsettled: false,
        }
    }

    /// Discard output that arrived between commands.
    fn drain(&mut self) -> usize {
        let mut discarded = self.scanner.take_output().len();
        while let Ok(chunk) = self.rx.try_recv() {
            discarded += chunk.len();
        }
        self.scanner = OscScanner::new();
        self.raw.clear();
        discarded
    }

    /// Scan already-queued output for the `exit` sentinel of a command left
    /// running by a timed-out wait. Returns true once it has been seen.
    fn settle_queued(&mut self) -> bool {
        while let Ok(chunk) = self.rx.try_recv() {
            let (events, _) = self.scanner.push(&chunk);
            if events.iter().any(|e| e.name == EXIT_EVENT) {
                self.unsettled = false;
                return true;
            }
        }
        false
    }

    /// Accumulate output until the sentinel named `code` or the timeout.
    async fn wait_for(
        &mut self,
        code: &str,
        timeout: Duration,
        on_output: &mut (dyn FnMut(&str) + Send),
    ) -> Result<ExecutionResult, ShellError> {
        let deadline = Instant::now() + timeout;
        loop {
            match tokio::time::timeout_at(deadline, self.rx.recv()).await {
                Ok(Some(chunk)) => {
                    self.raw.push_str(&chunk);
                    let (events, text) = self.scanner.push(&chunk);
                    if !text.is_empty() {
                        on_output(&text);
                    }
                    if events.iter().any(|e| e.name == EXIT_EVENT) {
                        self.unsettled = false;
                    }
                    if let Some(event) = events.into_iter().find(|e| e.name == code) {
                        let end = sentinel_end(&self.raw, code).unwrap_or(self.raw.len());
                        let rest = self.raw.split_off(end);
                        return Ok(ExecutionResult {
                            output: std::mem::replace(&mut self.raw, rest),
                            visible: self.scanner.take_output(),
                            exit_code: event.code.unwrap_or(0),
                            timed_out: false,
                        });
                    }
                }
                Ok(None) => return Err(ShellError::OutputClosed),
                Err(_) => {
                    warn!(code, ?timeout, "timed out waiting for shell sentinel");
                    if code == EXIT_EVENT {
                        self.unsettled = true;
                    }
                    self.scanner.flush();
                    return Ok(ExecutionResult {
                        output: std::mem::take(&mut self.raw),
                        visible: self.scanner.take_output(),
                        exit_code: 0,
                        timed_out: true,
                    });
                }
            }
        }
    }
}

struct Session {
    process: SharedProcess,
    /// Held for the whole duration of one command
    reader: Mutex<OutputReader>,
    tasks: Vec<JoinHandle<()>>,
}

impl Drop for Session {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

pub struct ShellBridge {
    options: BridgeOptions,
    session: OnceLock<Session>,
    state: watch::Sender<ExecutionState>,
}

impl Default for ShellBridge {
    fn default() -> Self {
        Self::new(BridgeOptions::default())
    }
}

impl ShellBridge {
    pub fn new(options: BridgeOptions) -> Self {
        let (state, _) = watch::channel(ExecutionState::default());
        Self {
            options,
            session: OnceLock::new(),
            state,
        }
    }

    pub fn options(&self) -> &BridgeOptions {
        &self.options
    }

    pub fn is_ready(&self) -> bool {
        self.session.get().is_some()
    }

    /// Observe execution state changes.
    pub fn subscribe(&self) -> watch::Receiver<ExecutionState> {
        self.state.subscribe()
    }

    pub fn execution_state(&self) -> ExecutionState {
        self.state.borrow().clone()
    }

    /// Spawn the shell, wire its output to `terminal`, and wait until it
    /// reports readiness.
    pub async fn init(
        &self,
        runtime: &dyn ProcessRuntime,
        terminal: Arc<dyn Terminal>,
    ) -> Result<(), ShellError> {
        if self.session.get().is_some() {
            return Err(ShellError::AlreadyInitialized);
        }

        let SpawnedShell { process, output } = runtime.spawn_shell(terminal.size()).await?;
        let process: SharedProcess = Arc::new(Mutex::new(process));

        let (output_tx, output_rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = watch::channel(false);

        let mut tasks = vec![tokio::spawn(tee_output(output, terminal.clone(), output_tx))];
        if let Some(input) = terminal.take_input() {
            tasks.push(tokio::spawn(forward_input(input, process.clone(), ready_rx)));
        }

        let mut reader = OutputReader::new(output_rx);
        let waited = reader
            .wait_for(READY_EVENT, self.options.ready_timeout, &mut |_: &str| {})
            .await;
        let failure = match waited {
            Ok(result) if !result.timed_out => None,
            Ok(_) => Some(ShellError::ReadyTimeout(self.options.ready_timeout)),
            Err(e) => Some(e),
        };
        if let Some(err) = failure {
            for task in &tasks {
                task.abort();
            }
            if let Err(e) = process.lock().await.kill().await {
                debug!(error = %e, "failed to kill shell after startup failure");
            }
            return Err(err);
        }

        ready_tx.send_replace(true);
        info!(
            cols = terminal.cols(),
            rows = terminal.rows(),
            "shell ready"
        );

        self.session
            .set(Session {
                process,
                reader: Mutex::new(reader),
                tasks,
            })
            .map_err(|_| ShellError::AlreadyInitialized)
    }

    /// Run one command and wait for its exit sentinel.
    pub async fn execute_command(
        &self,
        session_id: &str,
        command: &str,
    ) -> Result<ExecutionResult, ShellError> {
        self.execute_command_with(session_id, command, |_| {}).await
    }

    /// Like [`execute_command`](Self::execute_command), passing output to
    /// `on_output` as it arrives.
    pub async fn execute_command_with<F>(
        &self,
        session_id: &str,
        command: &str,
        mut on_output: F,
    ) -> Result<ExecutionResult, ShellError>
    where
        F: FnMut(&str) + Send,
    {
        let session = self.session.get().ok_or(ShellError::NotInitialized)?;
        let command = command.trim();

        let busy = self.state.borrow().active;
        if busy {
            debug!("interrupting in-flight command");
            session
                .process
                .lock()
                .await
                .interrupt()
                .await
                .map_err(ShellError::Write)?;
        }

        let mut reader = session.reader.lock().await;
        if reader.unsettled && !reader.settle_queued() {
            debug!("interrupting command left running by a timed-out wait");
            session
                .process
                .lock()
                .await
                .interrupt()
                .await
                .map_err(ShellError::Write)?;
            let settled = reader
                .wait_for(EXIT_EVENT, self.options.command_timeout, &mut |_: &str| {})
                .await?;
            if settled.timed_out {
                warn!("previous command did not stop after interrupt");
            }
        }
        let stale = reader.drain();
        if stale > 0 {
            debug!(bytes = stale, "discarded output between commands");
        }

        session
            .process
            .lock()
            .await
            .write(&format!("{}\n", command))
            .await
            .map_err(ShellError::Write)?;
        self.publish(session_id, command, true);
        debug!(session_id, command = %truncate_str(command, 80), "command submitted");

        let result = reader
            .wait_for(EXIT_EVENT, self.options.command_timeout, &mut on_output)
            .await;
        self.publish(session_id, command, false);

        if let Ok(result) = &result {
            debug!(
                exit_code = result.exit_code,
                timed_out = result.timed_out,
                "command finished"
            );
        }
        result
    }

    /// Wait for an arbitrary sentinel on the command channel.
    pub async fn wait_till_osc_code(
        &self,
        code: &str,
        timeout: Duration,
    ) -> Result<ExecutionResult, ShellError> {
        let session = self.session.get().ok_or(ShellError::NotInitialized)?;
        let mut reader = session.reader.lock().await;
        reader.wait_for(code, timeout, &mut |_: &str| {}).await
    }

    /// Kill the shell process.
    pub async fn shutdown(&self) -> Result<(), ShellError> {
        let session = self.session.get().ok_or(ShellError::NotInitialized)?;
        session
            .process
            .lock()
            .await
            .kill()
            .await
            .map_err(ShellError::Write)
    }

    fn publish(&self, session_id: &str, command: &str, active: bool) {
        self.state.send_replace(ExecutionState {
            session_id: session_id.to_string(),
            command: command.to_string(),
            active,
        });
    }
}

/// Copy every chunk of shell output to the display and to the bridge, in order.
async fn tee_output(
    mut output: Box<dyn AsyncRead + Send + Unpin>,
    terminal: Arc<dyn Terminal>,
    tx: mpsc::UnboundedSender<String>,
) {
    let mut decoder = Utf8Decoder::new();
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    loop {
        let n = match output.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, "shell output read failed");
                break;
            }
        };
        let text = decoder.decode(&buf[..n]);
        if text.is_empty() {
            continue;
        }
        terminal.write(&text);
        if tx.send(text).is_err() {
            break;
        }
    }

    let rest = decoder.finish();
    if !rest.is_empty() {
        terminal.write(&rest);
        let _ = tx.send(rest);
    }
    debug!("shell output closed");
}

/// Forward human keystrokes once the shell is ready; earlier ones are dropped.
async fn forward_input(
    mut input: mpsc::UnboundedReceiver<String>,
    process: SharedProcess,
    ready: watch::Receiver<bool>,
) {
    while let Some(keys) = input.recv().await {
        if !*ready.borrow() {
            debug!(bytes = keys.len(), "dropping keystrokes before shell is ready");
            continue;
        }
        if let Err(e) = process.lock().await.write(&keys).await {
            warn!(error = %e, "failed to forward terminal input");
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell::terminal::BufferTerminal;
    use crate::shell::testing::FakeRuntime;

    async fn ready_bridge(options: BridgeOptions) -> (Arc<ShellBridge>, BufferTerminal) {
        let bridge = Arc::new(ShellBridge::new(options));
        let terminal = BufferTerminal::default();
        bridge
            .init(&FakeRuntime::new(), Arc::new(terminal.clone()))
            .await
            .unwrap();
        (bridge, terminal)
    }

    #[tokio::test]
    async fn test_execute_before_init_fails() {
        let bridge = ShellBridge::default();
        let err = bridge.execute_command("s", "ls").await.unwrap_err();
        assert!(matches!(err, ShellError::NotInitialized));
    }

    #[tokio::test]
    async fn test_init_twice_fails() {
        let (bridge, _) = ready_bridge(BridgeOptions::default()).await;
        let err = bridge
            .init(&FakeRuntime::new(), Arc::new(BufferTerminal::default()))
            .await
            .unwrap_err();
        assert!(matches!(err, ShellError::AlreadyInitialized));
    }

    #[tokio::test]
    async fn test_ready_timeout_is_fatal() {
        let bridge = ShellBridge::new(BridgeOptions {
            ready_timeout: Duration::from_millis(50),
            ..BridgeOptions::default()
        });
        let err = bridge
            .init(&FakeRuntime::silent(), Arc::new(BufferTerminal::default()))
            .await
            .unwrap_err();
        assert!(matches!(err, ShellError::ReadyTimeout(_)));
        assert!(!bridge.is_ready());
    }

    #[tokio::test]
    async fn test_command_output_and_exit_code() {
        let (bridge, terminal) = ready_bridge(BridgeOptions::default()).await;

        let result = bridge.execute_command("s1", "  echo hello  ").await.unwrap();
        assert_eq!(result.output, "hello\n\x1b]654;exit=7:0\x07");
        assert_eq!(result.visible, "hello\n");
        assert_eq!(result.exit_code, 0);
        assert!(result.success());

        let result = bridge.execute_command("s1", "status 3").await.unwrap();
        assert_eq!(result.exit_code, 3);
        assert!(result.output.ends_with("\x1b]654;exit=7:3\x07"));
        assert!(!result.success());

        // The display copy sees everything, sentinels included
        let shown = terminal.contents();
        assert!(shown.starts_with("motd\n"));
        assert!(shown.contains("hello\n"));
        assert!(shown.contains("\x1b]654;exit=7:3\x07"));
    }

    #[tokio::test]
    async fn test_split_sentinel_and_multibyte_output() {
        let (bridge, _) = ready_bridge(BridgeOptions::default()).await;
        let result = bridge.execute_command("s1", "split").await.unwrap();
        assert_eq!(result.output, "h\u{e9}llo\x1b]654;exit=7:0\x07");
        assert_eq!(result.visible, "h\u{e9}llo");
        assert!(!result.timed_out);
    }

    #[tokio::test]
    async fn test_soft_timeout_returns_partial_output() {
        let (bridge, _) = ready_bridge(BridgeOptions {
            command_timeout: Duration::from_millis(50),
            ..BridgeOptions::default()
        })
        .await;

        let result = bridge.execute_command("s1", "hang").await.unwrap();
        assert!(result.timed_out);
        assert_eq!(result.exit_code, 0);
        assert!(!bridge.execution_state().active);
    }

    #[tokio::test]
    async fn test_scripted_output_keeps_exit_sequence() {
        let bridge = Arc::new(ShellBridge::default());
        let runtime = FakeRuntime::new().script("report", "body", 42);
        bridge
            .init(&runtime, Arc::new(BufferTerminal::default()))
            .await
            .unwrap();

        let result = bridge.execute_command("s1", "report").await.unwrap();
        assert_eq!(result.exit_code, 42);
        assert!(result.output.contains("\x1b]654;exit=7:42\x07"));
        assert_eq!(result.visible, "body");
    }

    #[tokio::test]
    async fn test_command_after_soft_timeout_interrupts_leftover() {
        let (bridge, _) = ready_bridge(BridgeOptions {
            command_timeout: Duration::from_millis(50),
            ..BridgeOptions::default()
        })
        .await;

        let first = bridge.execute_command("s1", "hang").await.unwrap();
        assert!(first.timed_out);

        let second = bridge.execute_command("s1", "echo next").await.unwrap();
        assert!(!second.timed_out);
        assert_eq!(second.visible, "next\n");
        assert_eq!(second.exit_code, 0);
    }

    #[tokio::test]
    async fn test_late_exit_does_not_complete_next_command() {
        let (bridge, _) = ready_bridge(BridgeOptions {
            command_timeout: Duration::from_millis(30),
            ..BridgeOptions::default()
        })
        .await;

        let first = bridge.execute_command("s1", "late").await.unwrap();
        assert!(first.timed_out);

        // The leftover finishes on its own before the next command
        tokio::time::sleep(Duration::from_millis(150)).await;

        let second = bridge.execute_command("s1", "status 3").await.unwrap();
        assert!(!second.timed_out);
        assert_eq!(second.exit_code, 3);
        assert!(!second.output.contains("late"));
    }

    #[tokio::test]
    async fn test_new_command_interrupts_active_one() {
        let (bridge, _) = ready_bridge(BridgeOptions::default()).await;
        let mut state = bridge.subscribe();

        let first = {
            let bridge = bridge.clone();
            tokio::spawn(async move { bridge.execute_command("s1", "hang").await })
        };
        state.wait_for(|s| s.active).await.unwrap();

        let second = bridge.execute_command("s1", "echo next").await.unwrap();
        let first = first.await.unwrap().unwrap();

        assert_eq!(first.exit_code, 130);
        assert_eq!(second.visible, "next\n");
        assert_eq!(second.exit_code, 0);
    }

    #[tokio::test]
    async fn test_execution_state_published() {
        let (bridge, _) = ready_bridge(BridgeOptions::default()).await;
        bridge.execute_command("session-9", "echo x").await.unwrap();
        let state = bridge.execution_state();
        assert_eq!(state.session_id, "session-9");
        assert_eq!(state.command, "echo x");
        assert!(!state.active);
    }

    #[tokio::test]
    async fn test_keystrokes_before_ready_are_dropped() {
        let bridge = ShellBridge::default();
        let terminal = BufferTerminal::default();
        let keys = terminal.input_sender();
        keys.send("echo early\n".to_string()).unwrap();

        bridge
            .init(&FakeRuntime::new(), Arc::new(terminal.clone()))
            .await
            .unwrap();
        keys.send("echo late\n".to_string()).unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while !terminal.contents().contains("late") && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let shown = terminal.contents();
        assert!(shown.contains("late\n"));
        assert!(!shown.contains("early"));
    }

    #[tokio::test]
    async fn test_shell_exit_surfaces_output_closed() {
        let (bridge, _) = ready_bridge(BridgeOptions::default()).await;
        bridge.shutdown().await.unwrap();
        let err = bridge.execute_command("s1", "echo x").await.unwrap_err();
        assert!(matches!(err, ShellError::OutputClosed | ShellError::Write(_)));
    }
}
