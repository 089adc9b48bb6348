//! Project validation run through the shell bridge.

mod build;
mod typescript;

pub use build::{BuildValidationNode, BuildValidator, CommandExecutor, PackageManager};
pub use typescript::{
    LintRule, RULES, TypeScriptValidationNode, TypeScriptValidator, parse_tsc_output,
};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueType {
    Typescript,
    Build,
    Lint,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    #[serde(rename = "type")]
    pub issue_type: IssueType,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ValidationIssue {
    pub fn build(message: impl Into<String>) -> Self {
        Self {
            issue_type: IssueType::Build,
            message: message.into(),
            file: None,
            line: None,
            column: None,
            code: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub issues: Vec<ValidationIssue>,
}

impl ValidationResult {
    pub fn ok() -> Self {
        Self {
            valid: true,
            issues: Vec::new(),
        }
    }

    pub fn failed(issue: ValidationIssue) -> Self {
        Self {
            valid: false,
            issues: vec![issue],
        }
    }
}
