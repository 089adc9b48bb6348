//! Type checking with `tsc` plus source lint rules.

use std::path::PathBuf;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, info};

use super::{CommandExecutor, IssueType, ValidationIssue, ValidationResult};
use crate::workflow::{NodeHandler, WorkflowContext};

/// `file(line,col): error TSxxxx: message`
static TSC_ERROR_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^(.+)\((\d+),(\d+)\):\s+error\s+(TS\d+):\s+(.+?)\r?$")
        .expect("valid tsc error regex")
});

static ANY_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:: |\bas )any\b").expect("valid any regex"));

static DECLARATION_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:let|const|var)\s+\w+\s*[=:]").expect("valid declaration regex")
});

/// A source rule run over file contents after `tsc` passes.
pub struct LintRule {
    pub id: &'static str,
    pub description: &'static str,
    check: fn(&str) -> Vec<ValidationIssue>,
}

impl LintRule {
    pub fn check(&self, source: &str) -> Vec<ValidationIssue> {
        (self.check)(source)
    }
}

pub const RULES: [LintRule; 2] = [
    LintRule {
        id: "no-any",
        description: "Prevents usage of the any type",
        check: check_no_any,
    },
    LintRule {
        id: "explicit-types",
        description: "Requires explicit type annotations",
        check: check_explicit_types,
    },
];

fn check_no_any(source: &str) -> Vec<ValidationIssue> {
    ANY_REGEX
        .find_iter(source)
        .map(|m| lint_issue(source, m.start(), m.as_str(), "Usage of any type is not allowed"))
        .collect()
}

fn check_explicit_types(source: &str) -> Vec<ValidationIssue> {
    DECLARATION_REGEX
        .find_iter(source)
        .filter(|m| !m.as_str().contains(':'))
        .map(|m| lint_issue(source, m.start(), m.as_str(), "Missing explicit type annotation"))
        .collect()
}

fn lint_issue(source: &str, offset: usize, matched: &str, message: &str) -> ValidationIssue {
    let before = &source[..offset];
    let line = before.matches('\n').count() + 1;
    let line_start = before.rfind('\n').map(|i| i + 1).unwrap_or(0);
    let column = before[line_start..].chars().count() + 1;
    ValidationIssue {
        issue_type: IssueType::Lint,
        message: message.to_string(),
        file: None,
        line: u32::try_from(line).ok(),
        column: u32::try_from(column).ok(),
        code: Some(matched.to_string()),
    }
}

/// Extract every compiler diagnostic from `tsc` output.
pub fn parse_tsc_output(output: &str) -> Vec<ValidationIssue> {
    TSC_ERROR_REGEX
        .captures_iter(output)
        .map(|caps| ValidationIssue {
            issue_type: IssueType::Typescript,
            message: caps[5].to_string(),
            file: Some(caps[1].trim().to_string()),
            line: caps[2].parse().ok(),
            column: caps[3].parse().ok(),
            code: Some(caps[4].to_string()),
        })
        .collect()
}

fn typescript_issue(message: impl Into<String>) -> ValidationIssue {
    ValidationIssue {
        issue_type: IssueType::Typescript,
        ..ValidationIssue::build(message)
    }
}

fn quote(path: &str) -> String {
    format!("'{}'", path.replace('\'', r"'\''"))
}

pub struct TypeScriptValidator<E: CommandExecutor> {
    executor: E,
}

impl<E: CommandExecutor> TypeScriptValidator<E> {
    pub fn new(executor: E) -> Self {
        Self { executor }
    }

    /// Type check one file, then run the lint rules over its source.
    /// Compiler errors short-circuit the lint pass.
    pub async fn validate(&self, file: &str) -> ValidationResult {
        let tsc = match self.executor.run(&format!("tsc --noEmit {}", quote(file))).await {
            Ok(result) => result,
            Err(e) => return ValidationResult::failed(typescript_issue(e.to_string())),
        };
        if !tsc.success() {
            let mut issues = parse_tsc_output(&tsc.visible);
            if issues.is_empty() {
                issues.push(typescript_issue(format!(
                    "tsc failed with exit code {}: {}",
                    tsc.exit_code,
                    tsc.visible.trim()
                )));
            }
            debug!(file, count = issues.len(), "type check failed");
            return ValidationResult {
                valid: false,
                issues,
            };
        }

        let source = match self.executor.run(&format!("cat {}", quote(file))).await {
            Ok(result) if result.success() => result.visible,
            Ok(_) => {
                return ValidationResult::failed(typescript_issue(format!(
                    "Failed to read file: {file}"
                )));
            }
            Err(e) => return ValidationResult::failed(typescript_issue(e.to_string())),
        };

        let mut issues = Vec::new();
        for rule in &RULES {
            let found = rule.check(&source);
            if !found.is_empty() {
                debug!(file, rule = rule.id, count = found.len(), "{}", rule.description);
            }
            issues.extend(found.into_iter().map(|issue| ValidationIssue {
                file: Some(file.to_string()),
                ..issue
            }));
        }
        ValidationResult {
            valid: issues.is_empty(),
            issues,
        }
    }
}

/// Workflow node that type checks a fixed set of files, one result per file.
pub struct TypeScriptValidationNode<E: CommandExecutor> {
    validator: TypeScriptValidator<E>,
    files: Vec<PathBuf>,
}

impl<E: CommandExecutor> TypeScriptValidationNode<E> {
    pub fn new(validator: TypeScriptValidator<E>, files: Vec<PathBuf>) -> Self {
        Self { validator, files }
    }
}

#[async_trait]
impl<E: CommandExecutor> NodeHandler for TypeScriptValidationNode<E> {
    async fn execute(&self, context: &mut WorkflowContext) -> anyhow::Result<()> {
        for file in &self.files {
            info!(file = %file.display(), "type checking");
            let result = self.validator.validate(&file.to_string_lossy()).await;
            context.validation_results.push(result);
        }
        Ok(())
    }
}
