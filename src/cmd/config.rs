//! Configuration view and validation commands — `scaffold config`.

use anyhow::Result;

use super::super::ConfigCommands;

pub fn cmd_config(project_dir: &std::path::Path, command: Option<ConfigCommands>) -> Result<()> {
    use scaffold::config::{CONFIG_DIR, CONFIG_FILE, ScaffoldConfig, ScaffoldToml};

    let scaffold_dir = project_dir.join(CONFIG_DIR);
    let config_path = scaffold_dir.join(CONFIG_FILE);

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Scaffold Configuration");
            println!("======================");
            println!();

            if config_path.exists() {
                println!("Config file: {}", config_path.display());
            } else {
                println!("No scaffold.toml found at {}", config_path.display());
                println!("Using defaults (run 'scaffold config init' to create one).");
            }
            println!();

            // Effective values include .env and SCAFFOLD_* overrides
            let config = ScaffoldConfig::new(project_dir.to_path_buf())?;
            let toml = &config.toml;

            println!("[project]");
            if let Some(name) = &toml.project.name {
                println!("  name = \"{}\"", name);
            }
            println!("  workspace = \"{}\"", toml.project.workspace);
            println!();

            println!("[shell]");
            println!("  program = \"{}\"", toml.shell.program);
            println!("  cols = {}", toml.shell.cols);
            println!("  rows = {}", toml.shell.rows);
            println!("  ready_timeout_secs = {}", toml.shell.ready_timeout_secs);
            println!("  command_timeout_secs = {}", toml.shell.command_timeout_secs);
            println!();

            println!("[chat]");
            println!("  endpoint = \"{}\"", toml.chat.endpoint);
            println!("  provider = \"{}\"", toml.chat.provider);
            println!("  model = \"{}\"", toml.chat.model);
            println!(
                "  api_key = {}",
                if toml.chat.api_key.is_some() {
                    "(set)"
                } else {
                    "(unset)"
                }
            );
            println!();

            println!("[logging]");
            println!("  level = \"{}\"", toml.logging.level);
            println!("  json = {}", toml.logging.json);
            if let Some(file) = &toml.logging.file {
                println!("  file = \"{}\"", file);
            }
            println!();
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            if !config_path.exists() {
                println!("No scaffold.toml found. Using defaults (valid).");
                return Ok(());
            }

            let toml = ScaffoldToml::load(&config_path)?;
            let warnings = toml.validate();

            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!("scaffold.toml already exists at {}", config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }

            std::fs::create_dir_all(&scaffold_dir)?;
            ScaffoldToml::default().save(&config_path)?;

            println!("Created scaffold.toml at {}", config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [project] name, workspace");
            println!("  - [shell] program, terminal size, timeouts");
            println!("  - [chat] endpoint, provider, model");
            println!();
        }
    }

    Ok(())
}
