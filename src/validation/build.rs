//! Install-and-build validation with package manager detection.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{ValidationIssue, ValidationResult};
use crate::errors::ShellError;
use crate::shell::{ExecutionResult, ShellBridge};
use crate::workflow::{NodeHandler, WorkflowContext};

const VALIDATION_SESSION: &str = "build-validation";

/// Something that runs one shell command to completion.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn run(&self, command: &str) -> Result<ExecutionResult, ShellError>;
}

#[async_trait]
impl CommandExecutor for ShellBridge {
    async fn run(&self, command: &str) -> Result<ExecutionResult, ShellError> {
        self.execute_command(VALIDATION_SESSION, command).await
    }
}

#[async_trait]
impl<T: CommandExecutor + ?Sized> CommandExecutor for Arc<T> {
    async fn run(&self, command: &str) -> Result<ExecutionResult, ShellError> {
        (**self).run(command).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageManager {
    Pnpm,
    Yarn,
    Npm,
    Bun,
}

impl PackageManager {
    /// Detection order.
    pub const ALL: [PackageManager; 4] = [
        PackageManager::Pnpm,
        PackageManager::Yarn,
        PackageManager::Npm,
        PackageManager::Bun,
    ];

    pub fn name(self) -> &'static str {
        match self {
            PackageManager::Pnpm => "pnpm",
            PackageManager::Yarn => "yarn",
            PackageManager::Npm => "npm",
            PackageManager::Bun => "bun",
        }
    }

    pub fn detect_command(self) -> String {
        format!("{} -v", self.name())
    }

    pub fn install_command(self) -> &'static str {
        match self {
            PackageManager::Pnpm => "pnpm install",
            PackageManager::Yarn => "yarn install",
            PackageManager::Npm => "npm install",
            PackageManager::Bun => "bun install",
        }
    }

    pub fn build_command(self) -> &'static str {
        match self {
            PackageManager::Pnpm => "pnpm run build",
            PackageManager::Yarn => "yarn build",
            PackageManager::Npm => "npm run build",
            PackageManager::Bun => "bun run build",
        }
    }
}

impl std::fmt::Display for PackageManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

pub struct BuildValidator<E: CommandExecutor> {
    executor: E,
    current: Option<PackageManager>,
}

impl<E: CommandExecutor> BuildValidator<E> {
    pub fn new(executor: E) -> Self {
        Self {
            executor,
            current: None,
        }
    }

    pub fn package_manager(&self) -> Option<PackageManager> {
        self.current
    }

    /// First manager whose `-v` succeeds, npm when none does.
    pub async fn detect_package_manager(&mut self) -> PackageManager {
        for manager in PackageManager::ALL {
            match self.executor.run(&manager.detect_command()).await {
                Ok(result) if result.success() => {
                    debug!(manager = %manager, version = result.visible.trim(), "package manager detected");
                    self.current = Some(manager);
                    return manager;
                }
                Ok(_) => {}
                Err(e) => debug!(manager = %manager, error = %e, "detection command failed"),
            }
        }

        info!("no package manager detected, defaulting to npm");
        self.current = Some(PackageManager::Npm);
        PackageManager::Npm
    }

    /// Run install, then build. The first failing step is reported as a
    /// `build` issue carrying its output.
    pub async fn validate_build(&mut self) -> ValidationResult {
        let manager = match self.current {
            Some(manager) => manager,
            None => self.detect_package_manager().await,
        };

        let steps = [
            (manager.install_command(), "Installation failed"),
            (manager.build_command(), "Build failed"),
        ];
        for (command, label) in steps {
            match self.executor.run(command).await {
                Ok(result) if result.success() => {}
                Ok(result) if result.timed_out => {
                    warn!(command, "validation step timed out");
                    return ValidationResult::failed(ValidationIssue::build(format!(
                        "{}: timed out: {}",
                        label, result.visible
                    )));
                }
                Ok(result) => {
                    return ValidationResult::failed(ValidationIssue::build(format!(
                        "{}: {}",
                        label, result.visible
                    )));
                }
                Err(e) => return ValidationResult::failed(ValidationIssue::build(e.to_string())),
            }
        }

        ValidationResult::ok()
    }
}

/// Workflow node that runs build validation and records the result.
pub struct BuildValidationNode<E: CommandExecutor> {
    validator: Mutex<BuildValidator<E>>,
}

impl<E: CommandExecutor> BuildValidationNode<E> {
    pub fn new(validator: BuildValidator<E>) -> Self {
        Self {
            validator: Mutex::new(validator),
        }
    }
}

#[async_trait]
impl<E: CommandExecutor> NodeHandler for BuildValidationNode<E> {
    async fn execute(&self, context: &mut WorkflowContext) -> anyhow::Result<()> {
        info!(framework = %context.framework, "validating build");
        let result = self.validator.lock().await.validate_build().await;
        context.validation_results.push(result);
        Ok(())
    }
}
