//! Local interactive bash driven over pipes.

use std::io;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, Command};
use tracing::debug;

use super::terminal::{ProcessRuntime, ShellProcess, SpawnedShell, TerminalSize};
use crate::errors::ShellError;

/// Installs the prompt hook that reports readiness once, then the exit
/// status of every command. Stderr is folded into stdout.
const BOOTSTRAP: &str = concat!(
    "exec 2>&1\n",
    "unset HISTFILE\n",
    "PS1=''\n",
    "PS2=''\n",
    "__scaffold_ready=0\n",
    "__osc_prompt() { local status=$?; ",
    "if [ \"$__scaffold_ready\" = 0 ]; then __scaffold_ready=1; printf '\\033]654;interactive\\007'; ",
    "else printf '\\033]654;exit=%s:%s\\007' \"$$\" \"$status\"; fi; }\n",
    "PROMPT_COMMAND=__osc_prompt\n",
);

#[derive(Debug, Clone)]
pub struct LocalShellRuntime {
    program: String,
    cwd: Option<PathBuf>,
}

impl LocalShellRuntime {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            cwd: None,
        }
    }

    /// Start the shell in `dir` instead of the current directory.
    pub fn with_cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }
}

#[async_trait]
impl ProcessRuntime for LocalShellRuntime {
    async fn spawn_shell(&self, size: TerminalSize) -> Result<SpawnedShell, ShellError> {
        let spawn_failed = |source: io::Error| ShellError::SpawnFailed {
            program: self.program.clone(),
            source,
        };

        let mut cmd = Command::new(&self.program);
        cmd.args(["--noprofile", "--norc", "-i"])
            .env("COLUMNS", size.cols.to_string())
            .env("LINES", size.rows.to_string())
            .env("TERM", "dumb")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        if let Some(dir) = &self.cwd {
            cmd.current_dir(dir);
        }
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(spawn_failed)?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| spawn_failed(io::Error::other("stdin not piped")))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| spawn_failed(io::Error::other("stdout not piped")))?;
        debug!(program = %self.program, pid = ?child.id(), "shell spawned");

        let mut process = LocalShell { child, stdin };
        process
            .write(BOOTSTRAP)
            .await
            .map_err(ShellError::Write)?;

        Ok(SpawnedShell {
            process: Box::new(process),
            output: Box::new(stdout),
        })
    }
}

struct LocalShell {
    child: Child,
    stdin: ChildStdin,
}

#[async_trait]
impl ShellProcess for LocalShell {
    async fn write(&mut self, data: &str) -> io::Result<()> {
        self.stdin.write_all(data.as_bytes()).await?;
        self.stdin.flush().await
    }

    /// Pipes carry no line discipline, so Ctrl-C is delivered as SIGINT to
    /// the shell's process group.
    #[cfg(unix)]
    async fn interrupt(&mut self) -> io::Result<()> {
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;

        let Some(pid) = self.child.id() else {
            return Err(io::Error::other("shell has exited"));
        };
        let pid = i32::try_from(pid).map_err(io::Error::other)?;
        killpg(Pid::from_raw(pid), Signal::SIGINT).map_err(io::Error::from)
    }

    async fn kill(&mut self) -> io::Result<()> {
        self.child.kill().await
    }
}
