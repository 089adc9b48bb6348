//! Node-graph workflow over a shared [`WorkflowContext`].

mod engine;
mod types;

pub use engine::WorkflowEngine;
pub use types::{LogStep, NodeHandler, NodeType, WorkflowContext, WorkflowNode, WorkflowResult};
