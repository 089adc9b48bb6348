//! Direct command execution through the bridge — `scaffold exec`.

use anyhow::Result;
use std::path::PathBuf;

use super::super::Cli;

pub async fn cmd_exec(cli: &Cli, project_dir: PathBuf, commands: &[String]) -> Result<()> {
    let (config, _guard) = super::setup(project_dir, cli.verbose)?;
    let bridge = super::start_shell(&config).await?;
    let session_id = uuid::Uuid::new_v4().to_string();

    let mut last_code = 0;
    for command in commands {
        println!("{} {}", console::style("$").dim(), command);
        let result = bridge.execute_command(&session_id, command).await?;
        let status = if result.timed_out {
            console::style("timed out".to_string()).yellow()
        } else if result.success() {
            console::style(format!("exit {}", result.exit_code)).green()
        } else {
            console::style(format!("exit {}", result.exit_code)).red()
        };
        println!("{}", status);
        last_code = result.exit_code;
    }

    bridge.shutdown().await?;

    if last_code != 0 {
        anyhow::bail!("Last command exited with code {}", last_code);
    }
    Ok(())
}
