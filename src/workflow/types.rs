use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::WorkflowError;
use crate::validation::ValidationResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Thought,
    Action,
    Observation,
    Reflection,
    Validation,
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeType::Thought => "thought",
            NodeType::Action => "action",
            NodeType::Observation => "observation",
            NodeType::Reflection => "reflection",
            NodeType::Validation => "validation",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// State shared by every node of one workflow run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowContext {
    pub framework: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub framework_version: Option<String>,
    pub project_path: PathBuf,
    #[serde(default)]
    pub requirements: Vec<String>,
    #[serde(default)]
    pub search_results: Vec<SearchResult>,
    #[serde(default)]
    pub validation_results: Vec<ValidationResult>,
    #[serde(default)]
    pub current_step: usize,
}

impl WorkflowContext {
    pub fn new(framework: impl Into<String>, project_path: impl Into<PathBuf>) -> Self {
        Self {
            framework: framework.into(),
            project_path: project_path.into(),
            ..Self::default()
        }
    }

    /// True when no recorded validation failed.
    pub fn is_valid(&self) -> bool {
        self.validation_results.iter().all(|r| r.valid)
    }
}

#[async_trait]
pub trait NodeHandler: Send + Sync {
    async fn execute(&self, context: &mut WorkflowContext) -> anyhow::Result<()>;
}

/// Handler that only logs the step it stands for.
pub struct LogStep {
    message: &'static str,
}

impl LogStep {
    pub fn new(message: &'static str) -> Self {
        Self { message }
    }
}

#[async_trait]
impl NodeHandler for LogStep {
    async fn execute(&self, context: &mut WorkflowContext) -> anyhow::Result<()> {
        info!(step = context.current_step, framework = %context.framework, "{}", self.message);
        Ok(())
    }
}

#[derive(Clone)]
pub struct WorkflowNode {
    pub id: String,
    pub node_type: NodeType,
    pub next: Vec<String>,
    pub(crate) handler: Arc<dyn NodeHandler>,
}

impl WorkflowNode {
    pub fn new(
        id: impl Into<String>,
        node_type: NodeType,
        handler: impl NodeHandler + 'static,
    ) -> Self {
        Self {
            id: id.into(),
            node_type,
            next: Vec::new(),
            handler: Arc::new(handler),
        }
    }

    pub fn with_next(mut self, next: &[&str]) -> Self {
        self.next = next.iter().map(|s| s.to_string()).collect();
        self
    }
}

impl fmt::Debug for WorkflowNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowNode")
            .field("id", &self.id)
            .field("node_type", &self.node_type)
            .field("next", &self.next)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub struct WorkflowResult {
    pub success: bool,
    pub context: WorkflowContext,
    pub error: Option<WorkflowError>,
}
