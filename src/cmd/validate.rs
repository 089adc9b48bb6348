//! Build and type-check validation workflow — `scaffold validate`.

use anyhow::Result;
use std::path::PathBuf;

use scaffold::validation::ValidationIssue;

use super::super::Cli;

pub async fn cmd_validate(
    cli: &Cli,
    project_dir: PathBuf,
    framework: &str,
    typecheck: &[PathBuf],
) -> Result<()> {
    use scaffold::validation::{
        BuildValidationNode, BuildValidator, TypeScriptValidationNode, TypeScriptValidator,
    };
    use scaffold::workflow::{NodeType, WorkflowContext, WorkflowEngine, WorkflowNode};

    let (config, _guard) = super::setup(project_dir, cli.verbose)?;
    let bridge = super::start_shell(&config).await?;

    let mut engine = WorkflowEngine::new();
    engine.default_react_pipeline(BuildValidationNode::new(BuildValidator::new(bridge.clone())))?;
    if !typecheck.is_empty() {
        engine.add_node(WorkflowNode::new(
            "typescript-validation",
            NodeType::Validation,
            TypeScriptValidationNode::new(
                TypeScriptValidator::new(bridge.clone()),
                typecheck.to_vec(),
            ),
        ))?;
        engine.add_parallel_nodes("code-reflection", &["build-validation", "typescript-validation"]);
    }

    let context = WorkflowContext::new(framework, config.workspace_dir());
    let result = engine.execute(context).await;

    if let Err(e) = bridge.shutdown().await {
        tracing::debug!(error = %e, "shell shutdown failed");
    }

    if let Some(error) = result.error {
        println!("{} {}", console::style("Workflow failed:").red().bold(), error);
        return Err(error.into());
    }

    println!();
    let mut failed = false;
    for validation in &result.context.validation_results {
        if validation.valid {
            println!("{}", console::style("✓ Valid").green().bold());
            continue;
        }
        failed = true;
        println!("{}", console::style("✗ Invalid").red().bold());
        for issue in &validation.issues {
            println!("  {}", describe(issue));
        }
    }

    if failed {
        anyhow::bail!("Validation failed");
    }
    Ok(())
}

fn describe(issue: &ValidationIssue) -> String {
    let message = issue.message.trim_end();
    match (&issue.file, issue.line, issue.column) {
        (Some(file), Some(line), Some(column)) => format!("{file}:{line}:{column} {message}"),
        (Some(file), Some(line), None) => format!("{file}:{line} {message}"),
        (Some(file), None, _) => format!("{file} {message}"),
        _ => message.to_string(),
    }
}
