//! Layered configuration for scaffold.
//!
//! Settings are read from `.scaffold/scaffold.toml` in the project directory
//! (falling back to the user-level `scaffold/scaffold.toml` under the
//! platform config dir), then overridden by environment variables, then by
//! CLI arguments.
//!
//! # Configuration File Format
//!
//! ```toml
//! [project]
//! name = "demo"
//! workspace = "workspace"
//!
//! [shell]
//! program = "/bin/bash"
//! cols = 80
//! rows = 15
//! ready_timeout_secs = 30
//! command_timeout_secs = 30
//!
//! [chat]
//! endpoint = "http://localhost:5173/api/chat"
//! provider = "anthropic"
//! model = "claude-3-5-sonnet-latest"
//!
//! [logging]
//! level = "info"
//! json = false
//! file = "logs/scaffold.log"
//! ```
//!
//! # Environment
//!
//! | Variable                 | Overrides          |
//! |--------------------------|--------------------|
//! | `SCAFFOLD_SHELL`         | `shell.program`    |
//! | `SCAFFOLD_CHAT_ENDPOINT` | `chat.endpoint`    |
//! | `SCAFFOLD_PROVIDER`      | `chat.provider`    |
//! | `SCAFFOLD_MODEL`         | `chat.model`       |
//! | `SCAFFOLD_API_KEY`       | `chat.api_key`     |
//! | `SCAFFOLD_LOG`           | `logging.level`    |

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::shell::{BridgeOptions, TerminalSize};

pub const CONFIG_DIR: &str = ".scaffold";
pub const CONFIG_FILE: &str = "scaffold.toml";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProjectSection {
    #[serde(default)]
    pub name: Option<String>,
    /// Root for file actions, relative to the project directory
    #[serde(default = "default_workspace")]
    pub workspace: String,
}

fn default_workspace() -> String {
    "workspace".to_string()
}

impl Default for ProjectSection {
    fn default() -> Self {
        Self {
            name: None,
            workspace: default_workspace(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShellSection {
    #[serde(default = "default_shell_program")]
    pub program: String,
    #[serde(default = "default_cols")]
    pub cols: u16,
    #[serde(default = "default_rows")]
    pub rows: u16,
    #[serde(default = "default_timeout_secs")]
    pub ready_timeout_secs: u64,
    #[serde(default = "default_timeout_secs")]
    pub command_timeout_secs: u64,
}

fn default_shell_program() -> String {
    "/bin/bash".to_string()
}

fn default_cols() -> u16 {
    80
}

fn default_rows() -> u16 {
    15
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for ShellSection {
    fn default() -> Self {
        Self {
            program: default_shell_program(),
            cols: default_cols(),
            rows: default_rows(),
            ready_timeout_secs: default_timeout_secs(),
            command_timeout_secs: default_timeout_secs(),
        }
    }
}

impl ShellSection {
    pub fn bridge_options(&self) -> BridgeOptions {
        BridgeOptions {
            ready_timeout: Duration::from_secs(self.ready_timeout_secs),
            command_timeout: Duration::from_secs(self.command_timeout_secs),
        }
    }

    pub fn terminal_size(&self) -> TerminalSize {
        TerminalSize {
            cols: self.cols,
            rows: self.rows,
        }
    }
}

/// Chat endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Only ever read from the environment
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
}

fn default_endpoint() -> String {
    "http://localhost:5173/api/chat".to_string()
}

fn default_provider() -> String {
    "anthropic".to_string()
}

fn default_model() -> String {
    "claude-3-5-sonnet-latest".to_string()
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            provider: default_provider(),
            model: default_model(),
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoggingSection {
    /// `EnvFilter` directive, e.g. `info` or `scaffold=debug`
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
    /// Log file, relative to `.scaffold`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            file: None,
        }
    }
}

/// The complete scaffold.toml structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ScaffoldToml {
    #[serde(default)]
    pub project: ProjectSection,
    #[serde(default)]
    pub shell: ShellSection,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub logging: LoggingSection,
}

impl ScaffoldToml {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse scaffold.toml")
    }

    /// Load `.scaffold/scaffold.toml`, else the user-level file, else defaults.
    pub fn load_or_default(scaffold_dir: &Path) -> Result<Self> {
        let project_path = scaffold_dir.join(CONFIG_FILE);
        if project_path.exists() {
            return Self::load(&project_path);
        }
        match global_config_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize scaffold.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Apply environment overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    /// Apply environment overrides from `lookup`. Empty values are ignored.
    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("SCAFFOLD_SHELL") {
            self.shell.program = v;
        }
        if let Some(v) = get("SCAFFOLD_CHAT_ENDPOINT") {
            self.chat.endpoint = v;
        }
        if let Some(v) = get("SCAFFOLD_PROVIDER") {
            self.chat.provider = v;
        }
        if let Some(v) = get("SCAFFOLD_MODEL") {
            self.chat.model = v;
        }
        if let Some(v) = get("SCAFFOLD_API_KEY") {
            self.chat.api_key = Some(v);
        }
        if let Some(v) = get("SCAFFOLD_LOG") {
            self.logging.level = v;
        }
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.shell.program.trim().is_empty() {
            warnings.push("shell.program is empty".to_string());
        }
        if self.shell.cols == 0 || self.shell.rows == 0 {
            warnings.push(format!(
                "Invalid terminal size {}x{}: cols and rows must be positive",
                self.shell.cols, self.shell.rows
            ));
        }
        if self.shell.ready_timeout_secs == 0 {
            warnings.push("shell.ready_timeout_secs is 0: the shell can never become ready".to_string());
        }
        if self.shell.command_timeout_secs == 0 {
            warnings.push("shell.command_timeout_secs is 0: every command will time out".to_string());
        }
        if self.chat.endpoint.trim().is_empty() {
            warnings.push("chat.endpoint is empty".to_string());
        } else if !self.chat.endpoint.starts_with("http://")
            && !self.chat.endpoint.starts_with("https://")
        {
            warnings.push(format!(
                "chat.endpoint '{}' is not an http(s) URL",
                self.chat.endpoint
            ));
        }
        if Path::new(&self.project.workspace).is_absolute() {
            warnings.push(format!(
                "project.workspace '{}' is absolute; expected a path relative to the project",
                self.project.workspace
            ));
        }

        warnings
    }
}

/// User-level config file under the platform config dir.
pub fn global_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("scaffold").join(CONFIG_FILE))
}

/// Resolved configuration: file, then environment, then CLI.
#[derive(Debug, Clone)]
pub struct ScaffoldConfig {
    pub project_dir: PathBuf,
    pub scaffold_dir: PathBuf,
    pub toml: ScaffoldToml,
    /// CLI override: debug logging
    pub verbose: bool,
}

impl ScaffoldConfig {
    /// Load configuration for `project_dir`, including its `.env` file.
    pub fn new(project_dir: PathBuf) -> Result<Self> {
        let project_dir = project_dir
            .canonicalize()
            .context("Failed to resolve project directory")?;
        // A missing .env is normal
        let _ = dotenvy::from_path(project_dir.join(".env"));

        let scaffold_dir = project_dir.join(CONFIG_DIR);
        let mut toml = ScaffoldToml::load_or_default(&scaffold_dir)?;
        toml.apply_env();

        Ok(Self {
            project_dir,
            scaffold_dir,
            toml,
            verbose: false,
        })
    }

    pub fn with_cli_args(project_dir: PathBuf, verbose: bool) -> Result<Self> {
        let mut config = Self::new(project_dir)?;
        config.verbose = verbose;
        Ok(config)
    }

    pub fn config_path(&self) -> PathBuf {
        self.scaffold_dir.join(CONFIG_FILE)
    }

    /// Root directory for file actions.
    pub fn workspace_dir(&self) -> PathBuf {
        self.project_dir.join(&self.toml.project.workspace)
    }

    pub fn log_file(&self) -> Option<PathBuf> {
        self.toml
            .logging
            .file
            .as_ref()
            .map(|file| self.scaffold_dir.join(file))
    }

    /// Filter directive for the log subscriber (CLI → env → file).
    pub fn log_filter(&self) -> String {
        if self.verbose {
            "debug".to_string()
        } else {
            self.toml.logging.level.clone()
        }
    }

    pub fn bridge_options(&self) -> BridgeOptions {
        self.toml.shell.bridge_options()
    }

    pub fn terminal_size(&self) -> TerminalSize {
        self.toml.shell.terminal_size()
    }

    pub fn validate(&self) -> Vec<String> {
        self.toml.validate()
    }
}
