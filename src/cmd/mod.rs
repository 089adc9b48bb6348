//! CLI command implementations.
//!
//! Each submodule owns one `Commands` variant:
//!
//! | Module     | Commands handled |
//! |------------|------------------|
//! | `run`      | `Run`            |
//! | `parse`    | `Parse`          |
//! | `exec`     | `Exec`           |
//! | `validate` | `Validate`       |
//! | `config`   | `Config`         |

pub mod config;
pub mod exec;
pub mod parse;
pub mod run;
pub mod validate;

pub use config::cmd_config;
pub use exec::cmd_exec;
pub use parse::cmd_parse;
pub use run::cmd_run;
pub use validate::cmd_validate;

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;

use scaffold::config::ScaffoldConfig;
use scaffold::logging::{self, LogOptions};
use scaffold::shell::{LocalShellRuntime, ShellBridge, StdoutTerminal};
use tracing_appender::non_blocking::WorkerGuard;

/// Load configuration and install logging for a command that does work.
pub(crate) fn setup(
    project_dir: PathBuf,
    verbose: bool,
) -> Result<(ScaffoldConfig, Option<WorkerGuard>)> {
    let config = ScaffoldConfig::with_cli_args(project_dir, verbose)?;
    let guard = logging::init(&LogOptions {
        filter: config.log_filter(),
        json: config.toml.logging.json,
        file: config.log_file(),
    })?;
    for warning in config.validate() {
        tracing::warn!("config: {}", warning);
    }
    Ok((config, guard))
}

/// Start a local shell in the workspace directory, bridged to stdout.
pub(crate) async fn start_shell(config: &ScaffoldConfig) -> Result<Arc<ShellBridge>> {
    let workspace = config.workspace_dir();
    std::fs::create_dir_all(&workspace).with_context(|| {
        format!("Failed to create workspace directory: {}", workspace.display())
    })?;

    let bridge = Arc::new(ShellBridge::new(config.bridge_options()));
    let runtime = LocalShellRuntime::new(config.toml.shell.program.clone()).with_cwd(workspace);
    let terminal = Arc::new(StdoutTerminal::new(config.terminal_size()));
    bridge.init(&runtime, terminal).await?;
    Ok(bridge)
}
