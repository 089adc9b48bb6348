//! Workflow engine: a node graph walked depth-first from its thought nodes.
//!
//! Each node runs at most once per `execute`, so diamond joins are visited a
//! single time. Cycles and dangling `next` references are rejected by
//! [`WorkflowEngine::validate`] before any handler runs.

use std::collections::HashSet;

use indexmap::IndexMap;
use tracing::{debug, info, warn};

use super::types::{LogStep, NodeHandler, NodeType, WorkflowContext, WorkflowNode, WorkflowResult};
use crate::errors::WorkflowError;

#[derive(Debug, Default)]
pub struct WorkflowEngine {
    nodes: IndexMap<String, WorkflowNode>,
    start_nodes: Vec<String>,
    visited: HashSet<String>,
}

impl WorkflowEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, node: WorkflowNode) -> Result<(), WorkflowError> {
        if self.nodes.contains_key(&node.id) {
            return Err(WorkflowError::DuplicateNode(node.id));
        }
        if node.node_type == NodeType::Thought {
            self.start_nodes.push(node.id.clone());
        }
        self.nodes.insert(node.id.clone(), node);
        Ok(())
    }

    pub fn get_node(&self, id: &str) -> Option<&WorkflowNode> {
        self.nodes.get(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn start_nodes(&self) -> &[String] {
        &self.start_nodes
    }

    /// Chain `ids` so each node's only successor is the one after it.
    /// Unknown ids are skipped.
    pub fn set_node_sequence(&mut self, ids: &[&str]) {
        for pair in ids.windows(2) {
            if let Some(node) = self.nodes.get_mut(pair[0]) {
                node.next = vec![pair[1].to_string()];
            }
        }
    }

    /// Replace `parent`'s successors with `children`.
    pub fn add_parallel_nodes(&mut self, parent: &str, children: &[&str]) {
        match self.nodes.get_mut(parent) {
            Some(node) => node.next = children.iter().map(|c| c.to_string()).collect(),
            None => warn!(parent, "parallel nodes added to unknown parent"),
        }
    }

    pub fn reset(&mut self) {
        self.nodes.clear();
        self.start_nodes.clear();
        self.visited.clear();
    }

    /// Check every edge target exists and the graph has no cycle.
    pub fn validate(&self) -> Result<(), WorkflowError> {
        for node in self.nodes.values() {
            if let Some(missing) = node.next.iter().find(|n| !self.nodes.contains_key(*n)) {
                return Err(WorkflowError::UnknownNode(missing.clone()));
            }
        }

        let mut in_degree = vec![0usize; self.nodes.len()];
        for node in self.nodes.values() {
            for next in &node.next {
                if let Some(idx) = self.nodes.get_index_of(next) {
                    in_degree[idx] += 1;
                }
            }
        }

        let mut queue: Vec<usize> = in_degree
            .iter()
            .enumerate()
            .filter(|&(_, deg)| *deg == 0)
            .map(|(i, _)| i)
            .collect();

        let mut processed = 0;
        while let Some(idx) = queue.pop() {
            processed += 1;
            let Some((_, node)) = self.nodes.get_index(idx) else {
                continue;
            };
            for next in &node.next {
                if let Some(dep) = self.nodes.get_index_of(next) {
                    in_degree[dep] -= 1;
                    if in_degree[dep] == 0 {
                        queue.push(dep);
                    }
                }
            }
        }

        if processed != self.nodes.len() {
            let involved = in_degree
                .iter()
                .enumerate()
                .filter(|&(_, deg)| *deg > 0)
                .filter_map(|(i, _)| self.nodes.get_index(i).map(|(id, _)| id.clone()))
                .collect();
            return Err(WorkflowError::Cycle(involved));
        }

        Ok(())
    }

    /// Run the graph from every start node in insertion order.
    ///
    /// On failure the result carries the untouched `initial` context.
    pub async fn execute(&mut self, initial: WorkflowContext) -> WorkflowResult {
        self.visited.clear();

        if let Err(e) = self.validate() {
            return WorkflowResult {
                success: false,
                context: initial,
                error: Some(e),
            };
        }

        let mut context = initial.clone();
        context.current_step = 0;

        let starts = self.start_nodes.clone();
        for start in &starts {
            if let Err(e) = self.run_from(start, &mut context).await {
                warn!(error = %e, "workflow failed");
                return WorkflowResult {
                    success: false,
                    context: initial,
                    error: Some(e),
                };
            }
        }

        info!(steps = context.current_step, "workflow complete");
        WorkflowResult {
            success: true,
            context,
            error: None,
        }
    }

    /// Depth-first over `next`, children in declaration order.
    async fn run_from(
        &mut self,
        start: &str,
        context: &mut WorkflowContext,
    ) -> Result<(), WorkflowError> {
        let mut stack = vec![start.to_string()];

        while let Some(id) = stack.pop() {
            if self.visited.contains(&id) {
                continue;
            }
            let node = self
                .nodes
                .get(&id)
                .ok_or_else(|| WorkflowError::UnknownNode(id.clone()))?;
            let handler = node.handler.clone();
            let next = node.next.clone();
            let node_type = node.node_type;

            self.visited.insert(id.clone());
            context.current_step += 1;
            debug!(node = %id, %node_type, step = context.current_step, "executing node");

            handler
                .execute(context)
                .await
                .map_err(|source| WorkflowError::NodeFailed {
                    node: id.clone(),
                    source,
                })?;

            stack.extend(next.into_iter().rev());
        }

        Ok(())
    }

    /// Reset and install thought → action → observation → reflection →
    /// validation, with `validation` as the last node's handler.
    pub fn default_react_pipeline(
        &mut self,
        validation: impl NodeHandler + 'static,
    ) -> Result<(), WorkflowError> {
        self.reset();

        let steps: [(&str, NodeType, &'static str); 4] = [
            ("initial-thought", NodeType::Thought, "analyzing requirements"),
            ("framework-action", NodeType::Action, "setting up framework"),
            ("result-observation", NodeType::Observation, "observing results"),
            ("code-reflection", NodeType::Reflection, "reflecting on generated code"),
        ];
        for (id, node_type, message) in steps {
            self.add_node(WorkflowNode::new(id, node_type, LogStep::new(message)))?;
        }
        self.add_node(WorkflowNode::new(
            "build-validation",
            NodeType::Validation,
            validation,
        ))?;

        self.set_node_sequence(&[
            "initial-thought",
            "framework-action",
            "result-observation",
            "code-reflection",
            "build-validation",
        ]);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    /// Appends its id to a shared trace; fails when told to.
    struct Trace {
        id: &'static str,
        log: Arc<Mutex<Vec<String>>>,
        fail: bool,
    }

    #[async_trait]
    impl NodeHandler for Trace {
        async fn execute(&self, context: &mut WorkflowContext) -> anyhow::Result<()> {
            self.log
                .lock()
                .unwrap()
                .push(format!("{}@{}", self.id, context.current_step));
            context.requirements.push(self.id.to_string());
            if self.fail {
                anyhow::bail!("{} exploded", self.id);
            }
            Ok(())
        }
    }

    fn node(
        id: &'static str,
        node_type: NodeType,
        log: &Arc<Mutex<Vec<String>>>,
    ) -> WorkflowNode {
        WorkflowNode::new(
            id,
            node_type,
            Trace {
                id,
                log: log.clone(),
                fail: false,
            },
        )
    }

    fn trace() -> Arc<Mutex<Vec<String>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    #[tokio::test]
    async fn test_sequence_runs_in_order_with_step_counter() {
        let log = trace();
        let mut engine = WorkflowEngine::new();
        engine.add_node(node("a", NodeType::Thought, &log)).unwrap();
        engine.add_node(node("b", NodeType::Action, &log)).unwrap();
        engine.add_node(node("c", NodeType::Observation, &log)).unwrap();
        engine.set_node_sequence(&["a", "b", "c"]);

        let result = engine.execute(WorkflowContext::new("react", "/tmp/app")).await;
        assert!(result.success);
        assert!(result.error.is_none());
        assert_eq!(result.context.current_step, 3);
        assert_eq!(*log.lock().unwrap(), vec!["a@1", "b@2", "c@3"]);
    }

    #[tokio::test]
    async fn test_diamond_join_runs_once() {
        let log = trace();
        let mut engine = WorkflowEngine::new();
        engine.add_node(node("root", NodeType::Thought, &log)).unwrap();
        engine.add_node(node("left", NodeType::Action, &log)).unwrap();
        engine.add_node(node("right", NodeType::Action, &log)).unwrap();
        engine.add_node(node("join", NodeType::Reflection, &log)).unwrap();
        engine.add_parallel_nodes("root", &["left", "right"]);
        engine.set_node_sequence(&["left", "join"]);
        engine.set_node_sequence(&["right", "join"]);

        let result = engine.execute(WorkflowContext::default()).await;
        assert!(result.success);
        assert_eq!(
            *log.lock().unwrap(),
            vec!["root@1", "left@2", "join@3", "right@4"]
        );
    }

    #[tokio::test]
    async fn test_only_thought_nodes_start() {
        let log = trace();
        let mut engine = WorkflowEngine::new();
        engine.add_node(node("orphan", NodeType::Action, &log)).unwrap();
        engine.add_node(node("t1", NodeType::Thought, &log)).unwrap();
        engine.add_node(node("t2", NodeType::Thought, &log)).unwrap();
        assert_eq!(engine.start_nodes(), ["t1", "t2"]);

        engine.execute(WorkflowContext::default()).await;
        assert_eq!(*log.lock().unwrap(), vec!["t1@1", "t2@2"]);
    }

    #[tokio::test]
    async fn test_failure_returns_initial_context() {
        let log = trace();
        let mut engine = WorkflowEngine::new();
        engine.add_node(node("a", NodeType::Thought, &log)).unwrap();
        engine
            .add_node(WorkflowNode::new(
                "boom",
                NodeType::Action,
                Trace {
                    id: "boom",
                    log: log.clone(),
                    fail: true,
                },
            ))
            .unwrap();
        engine.add_node(node("never", NodeType::Observation, &log)).unwrap();
        engine.set_node_sequence(&["a", "boom", "never"]);

        let initial = WorkflowContext::new("vue", "/srv/site");
        let result = engine.execute(initial.clone()).await;

        assert!(!result.success);
        assert_eq!(result.context, initial);
        match result.error {
            Some(WorkflowError::NodeFailed { node, source }) => {
                assert_eq!(node, "boom");
                assert_eq!(source.to_string(), "boom exploded");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(*log.lock().unwrap(), vec!["a@1", "boom@2"]);
    }

    #[tokio::test]
    async fn test_second_run_starts_fresh() {
        let log = trace();
        let mut engine = WorkflowEngine::new();
        engine.add_node(node("a", NodeType::Thought, &log)).unwrap();

        engine.execute(WorkflowContext::default()).await;
        let result = engine.execute(WorkflowContext::default()).await;
        assert_eq!(result.context.current_step, 1);
        assert_eq!(log.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_duplicate_node_rejected() {
        let log = trace();
        let mut engine = WorkflowEngine::new();
        engine.add_node(node("a", NodeType::Thought, &log)).unwrap();
        let err = engine.add_node(node("a", NodeType::Action, &log)).unwrap_err();
        assert!(matches!(err, WorkflowError::DuplicateNode(id) if id == "a"));
        assert_eq!(engine.start_nodes().len(), 1);
    }

    #[test]
    fn test_validate_unknown_target() {
        let log = trace();
        let mut engine = WorkflowEngine::new();
        engine
            .add_node(node("a", NodeType::Thought, &log).with_next(&["ghost"]))
            .unwrap();
        let err = engine.validate().unwrap_err();
        assert_eq!(err.to_string(), "Node ghost not found in workflow");
    }

    #[tokio::test]
    async fn test_cycle_rejected_before_any_handler_runs() {
        let log = trace();
        let mut engine = WorkflowEngine::new();
        engine.add_node(node("a", NodeType::Thought, &log)).unwrap();
        engine.add_node(node("b", NodeType::Action, &log)).unwrap();
        engine.add_node(node("c", NodeType::Reflection, &log)).unwrap();
        engine.set_node_sequence(&["a", "b", "c", "b"]);

        let result = engine.execute(WorkflowContext::default()).await;
        assert!(!result.success);
        match result.error {
            Some(WorkflowError::Cycle(nodes)) => {
                assert!(nodes.contains(&"b".to_string()));
                assert!(nodes.contains(&"c".to_string()));
                assert!(!nodes.contains(&"a".to_string()));
            }
            other => panic!("expected cycle, got {other:?}"),
        }
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_reset_clears_graph() {
        let log = trace();
        let mut engine = WorkflowEngine::new();
        engine.add_node(node("a", NodeType::Thought, &log)).unwrap();
        engine.reset();
        assert!(engine.is_empty());
        assert!(engine.start_nodes().is_empty());
        assert!(engine.get_node("a").is_none());
    }

    #[tokio::test]
    async fn test_default_pipeline_shape() {
        let log = trace();
        let mut engine = WorkflowEngine::new();
        engine
            .default_react_pipeline(Trace {
                id: "validate",
                log: log.clone(),
                fail: false,
            })
            .unwrap();

        assert_eq!(engine.len(), 5);
        assert_eq!(engine.start_nodes(), ["initial-thought"]);
        assert_eq!(
            engine.get_node("code-reflection").unwrap().next,
            vec!["build-validation"]
        );
        assert_eq!(
            engine.get_node("build-validation").unwrap().node_type,
            NodeType::Validation
        );

        let result = engine.execute(WorkflowContext::new("react", ".")).await;
        assert!(result.success);
        assert_eq!(result.context.current_step, 5);
        assert_eq!(*log.lock().unwrap(), vec!["validate@5"]);
    }
}
