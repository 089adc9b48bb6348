//! Scripted in-memory shell for tests.

use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

use super::terminal::{ProcessRuntime, ShellProcess, SpawnedShell, TerminalSize};
use crate::errors::ShellError;

/// Stand-in for an interactive shell speaking the sentinel protocol.
///
/// Built-in commands: `echo X` prints X, `status N` exits with N, `hang`
/// never finishes until Ctrl-C, `late` prints `late` and exits 5 after
/// 100ms, `split` emits its sentinel in two pieces.
/// Scripted commands reply with fixed output and status. Anything else
/// exits 127.
#[derive(Clone, Default)]
pub struct FakeRuntime {
    silent: bool,
    scripts: HashMap<String, (String, i32)>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Never report readiness.
    pub fn silent() -> Self {
        Self {
            silent: true,
            ..Self::default()
        }
    }

    pub fn script(mut self, command: &str, output: &str, status: i32) -> Self {
        self.scripts
            .insert(command.to_string(), (output.to_string(), status));
        self
    }
}

#[async_trait]
impl ProcessRuntime for FakeRuntime {
    async fn spawn_shell(&self, _size: TerminalSize) -> Result<SpawnedShell, ShellError> {
        let (process_in, shell_in) = tokio::io::duplex(4096);
        let (shell_out, process_out) = tokio::io::duplex(4096);
        tokio::spawn(fake_shell(
            shell_in,
            shell_out,
            !self.silent,
            Arc::new(self.scripts.clone()),
        ));
        Ok(SpawnedShell {
            process: Box::new(FakeProcess { input: process_in }),
            output: Box::new(process_out),
        })
    }
}

struct FakeProcess {
    input: DuplexStream,
}

#[async_trait]
impl ShellProcess for FakeProcess {
    async fn write(&mut self, data: &str) -> io::Result<()> {
        self.input.write_all(data.as_bytes()).await
    }

    async fn kill(&mut self) -> io::Result<()> {
        self.input.shutdown().await
    }
}

fn exit(status: i32) -> String {
    format!("\x1b]654;exit=7:{}\x07", status)
}

async fn fake_shell(
    mut input: DuplexStream,
    mut output: DuplexStream,
    announce: bool,
    scripts: Arc<HashMap<String, (String, i32)>>,
) {
    if announce {
        let _ = output.write_all(b"motd\n\x1b]654;interactive\x07").await;
    }
    let mut line = Vec::new();
    let mut buf = [0u8; 256];
    loop {
        let n = match input.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };
        for &b in &buf[..n] {
            match b {
                0x03 => {
                    let reply = format!("^C\n{}", exit(130));
                    let _ = output.write_all(reply.as_bytes()).await;
                }
                b'\n' => {
                    let cmd = String::from_utf8_lossy(&line).to_string();
                    line.clear();
                    respond(&cmd, &scripts, &mut output).await;
                }
                _ => line.push(b),
            }
        }
    }
}

async fn respond(
    cmd: &str,
    scripts: &HashMap<String, (String, i32)>,
    output: &mut DuplexStream,
) {
    if let Some((text, status)) = scripts.get(cmd) {
        let reply = format!("{}{}", text, exit(*status));
        let _ = output.write_all(reply.as_bytes()).await;
        return;
    }

    let (name, arg) = cmd.split_once(' ').unwrap_or((cmd, ""));
    let reply = match name {
        "echo" => format!("{}\n{}", arg, exit(0)),
        "status" => exit(arg.parse().unwrap_or(1)),
        "hang" => return,
        "late" => {
            tokio::time::sleep(Duration::from_millis(100)).await;
            format!("late\n{}", exit(5))
        }
        "split" => {
            let _ = output.write_all("h\u{e9}".as_bytes()).await;
            let _ = output.write_all(b"llo\x1b]654;ex").await;
            tokio::time::sleep(Duration::from_millis(20)).await;
            "it=7:0\x07".to_string()
        }
        _ => format!("{}: command not found\n{}", name, exit(127)),
    };
    let _ = output.write_all(reply.as_bytes()).await;
}
