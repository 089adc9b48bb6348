use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cmd;

#[derive(Parser)]
#[command(name = "scaffold")]
#[command(version, about = "Stream model output into a workbench and run its actions")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Send a prompt to the chat endpoint and execute the returned actions
    Run {
        /// Prompt text sent as the user message
        #[arg(short, long)]
        prompt: String,

        /// Parse and record actions without executing them
        #[arg(long)]
        dry_run: bool,
    },
    /// Feed a saved model response through the parser and print its events
    Parse {
        /// File containing the raw response text
        file: PathBuf,

        /// Bytes per fed chunk (0 feeds the whole file at once)
        #[arg(long, default_value = "0")]
        chunk_size: usize,

        /// Print events as JSON lines
        #[arg(long)]
        json: bool,
    },
    /// Run shell commands through the bridge
    Exec {
        /// Commands, executed in order in one shell
        #[arg(required = true)]
        commands: Vec<String>,
    },
    /// Install and build the workspace with the detected package manager
    Validate {
        /// Framework name recorded in the workflow context
        #[arg(long, default_value = "unknown")]
        framework: String,
        /// TypeScript files (relative to the workspace) to type check and lint
        #[arg(long = "typecheck", value_name = "FILE")]
        typecheck: Vec<PathBuf>,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Initialize a default scaffold.toml file
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    match &cli.command {
        Commands::Run { prompt, dry_run } => {
            cmd::cmd_run(&cli, project_dir, prompt, *dry_run).await?;
        }
        Commands::Parse {
            file,
            chunk_size,
            json,
        } => cmd::cmd_parse(file, *chunk_size, *json)?,
        Commands::Exec { commands } => cmd::cmd_exec(&cli, project_dir, commands).await?,
        Commands::Validate {
            framework,
            typecheck,
        } => {
            cmd::cmd_validate(&cli, project_dir, framework, typecheck).await?;
        }
        Commands::Config { command } => cmd::cmd_config(&project_dir, command.clone())?,
    }

    Ok(())
}
