//! Typed error hierarchy for scaffold.
//!
//! One enum per subsystem that can fail in a way the caller must act on:
//! - `ShellError` — process spawn, readiness and I/O failures of the shell bridge
//! - `StreamError` — transport failures while consuming a model response
//! - `ExecutorError` — failures while applying a single action to the workspace
//! - `WorkflowError` — graph construction and node execution failures
//!
//! The tag parser and the workbench store never fail: malformed input is
//! treated as prose and store misses are no-ops.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors from the shell/process bridge.
#[derive(Debug, Error)]
pub enum ShellError {
    #[error("Failed to spawn shell process '{program}': {source}")]
    SpawnFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Shell did not report interactive readiness within {0:?}")]
    ReadyTimeout(Duration),

    #[error("Shell output closed unexpectedly")]
    OutputClosed,

    #[error("Shell bridge is not initialized")]
    NotInitialized,

    #[error("Shell bridge is already initialized")]
    AlreadyInitialized,

    #[error("Failed to write to shell input: {0}")]
    Write(#[source] std::io::Error),
}

/// Errors from the message stream consumer and chat client.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("Chat endpoint returned HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("Transport error while reading response stream: {0}")]
    Transport(String),

    #[error(transparent)]
    Request(#[from] reqwest::Error),
}

/// Errors from applying one action to the workspace.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("File action {action_id} has no filePath attribute")]
    MissingFilePath { action_id: String },

    #[error("Path {path} escapes the workspace root")]
    PathEscapesWorkspace { path: PathBuf },

    #[error("Failed to write {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Shell(#[from] ShellError),
}

/// Errors from the workflow engine.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Node {0} not found in workflow")]
    UnknownNode(String),

    #[error("Duplicate node id: {0}")]
    DuplicateNode(String),

    #[error("Cycle detected in workflow edges. Involved nodes: {0:?}")]
    Cycle(Vec<String>),

    #[error("Node {node} failed: {source}")]
    NodeFailed {
        node: String,
        #[source]
        source: anyhow::Error,
    },
}
