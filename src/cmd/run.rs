//! Prompt → stream → workbench → actions — `scaffold run`.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;

use scaffold::workbench::{ActionStatus, WorkbenchEvent, WorkbenchStore};
use tokio::sync::broadcast::{
    self,
    error::{RecvError, TryRecvError},
};
use tokio::sync::oneshot;

use super::super::Cli;

pub async fn cmd_run(cli: &Cli, project_dir: PathBuf, prompt: &str, dry_run: bool) -> Result<()> {
    use scaffold::runtime::{ActionExecutor, ExecutionSummary};
    use scaffold::stream::{ChatClient, ChatMessage, MessageStreamConsumer};
    use scaffold::workbench::WorkbenchBinding;
    use tokio::sync::mpsc;

    let (config, _guard) = super::setup(project_dir, cli.verbose)?;
    let store = Arc::new(WorkbenchStore::new());
    let (stop_printer, printer_stopped) = oneshot::channel();
    let printer = {
        let store = store.clone();
        let events = store.subscribe();
        tokio::spawn(forward_events(events, printer_stopped, move |event| {
            print_event(&store, event)
        }))
    };

    let (binding, executor) = if dry_run {
        (WorkbenchBinding::new(store.clone()), None)
    } else {
        let bridge = super::start_shell(&config).await?;
        let (tx, rx) = mpsc::unbounded_channel();
        let executor = ActionExecutor::new(store.clone(), bridge.clone(), config.workspace_dir());
        tracing::info!(session = executor.session_id(), "executor ready");
        (
            WorkbenchBinding::new(store.clone()).with_queue(tx),
            Some((tokio::spawn(executor.run(rx)), bridge)),
        )
    };

    let client = ChatClient::new(&config.toml.chat);
    println!(
        "{} {}",
        console::style("Requesting").bold().cyan(),
        client.endpoint()
    );

    let mut consumer = MessageStreamConsumer::new(binding);
    let outcome = match client.send(&[ChatMessage::user(prompt)]).await {
        Ok(response) => consumer.consume(response.bytes_stream()).await.map(|_| ()),
        Err(e) => Err(e),
    };
    // Dropping the binding closes the action queue
    let binding = consumer.into_callbacks();
    let commentary = binding.commentary().to_string();
    drop(binding);

    let summary = match executor {
        Some((handle, bridge)) => {
            let summary = handle.await.context("Executor task panicked")?;
            if let Err(e) = bridge.shutdown().await {
                tracing::debug!(error = %e, "shell shutdown failed");
            }
            summary
        }
        None => ExecutionSummary::default(),
    };
    let _ = stop_printer.send(());
    if let Err(e) = printer.await {
        tracing::debug!(error = %e, "event printer failed");
    }

    outcome.context("Response stream failed")?;

    if !commentary.is_empty() {
        println!();
        println!("{}", commentary);
    }

    let state = store.snapshot();
    println!();
    println!(
        "{} {} artifact(s), {} action(s)",
        console::style("Workbench:").bold(),
        state.artifacts.len(),
        state.actions.len()
    );
    if dry_run {
        for action in state.actions.values() {
            println!("  [{}] {} {}", action.status, action.action_type, action.id);
        }
    } else {
        println!(
            "  {} complete, {} failed, {} skipped",
            console::style(summary.complete).green(),
            console::style(summary.failed).red(),
            console::style(summary.skipped).dim()
        );
        if summary.failed > 0 {
            anyhow::bail!("{} action(s) failed", summary.failed);
        }
    }

    Ok(())
}

/// Hand every store event to `on_event` until `stop` fires, then flush what
/// is already queued.
async fn forward_events(
    mut events: broadcast::Receiver<WorkbenchEvent>,
    mut stop: oneshot::Receiver<()>,
    mut on_event: impl FnMut(WorkbenchEvent),
) {
    loop {
        tokio::select! {
            biased;
            received = events.recv() => match received {
                Ok(event) => on_event(event),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "event printer lagged");
                }
                Err(RecvError::Closed) => return,
            },
            _ = &mut stop => break,
        }
    }

    loop {
        match events.try_recv() {
            Ok(event) => on_event(event),
            Err(TryRecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "event printer lagged");
            }
            Err(_) => return,
        }
    }
}

fn print_event(store: &WorkbenchStore, event: WorkbenchEvent) {
    match event {
        WorkbenchEvent::ArtifactAdded { id } => {
            if let Some(artifact) = store.artifact(&id) {
                println!(
                    "{} {}",
                    console::style("▸ artifact").bold().cyan(),
                    artifact.title.as_deref().unwrap_or(&artifact.artifact_type)
                );
            }
        }
        WorkbenchEvent::ActionUpdated { id, status } if status.is_terminal() => {
            let Some(action) = store.action(&id) else {
                return;
            };
            let label = match status {
                ActionStatus::Complete => console::style("✓").green(),
                ActionStatus::Skipped => console::style("-").dim(),
                _ => console::style("✗").red(),
            };
            let detail = action
                .attribute("filePath")
                .map(str::to_string)
                .unwrap_or_else(|| first_line(&action.content));
            println!("  {} {} {}", label, action.action_type, detail);
            if let Some(error) = &action.error {
                println!("    {}", console::style(error).red());
            }
        }
        _ => {}
    }
}

fn first_line(text: &str) -> String {
    text.lines().next().unwrap_or_default().to_string()
}
