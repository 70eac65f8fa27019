//! Typed error hierarchy for the chorus orchestrator.
//!
//! Three top-level enums cover the three subsystems:
//! - `OrchestratorError`: pipeline and panel failures that end a run
//! - `CheckpointError`: durable checkpoint log failures
//! - `ValidationError`: prompt, response and output path validation
//!
//! There is no provider error type: a provider never returns an
//! error, it returns a [`crate::provider::ProviderResponse`] with `error` set.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that terminate a workflow or panel run.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("No available providers for role '{role}'")]
    NoAvailableProviders { role: String },

    #[error("{stage} failed ({role}): {message}")]
    StageFailed {
        stage: String,
        role: String,
        attempted: Vec<String>,
        message: String,
    },

    #[error("Workflow timed out after {elapsed_secs:.1}s (limit: {limit_secs}s)")]
    WorkflowTimeout { limit_secs: u64, elapsed_secs: f64 },

    #[error("Provider '{name}' is not configured")]
    ProviderNotFound { name: String },

    #[error("No workers available for panel (curator: {curator})")]
    NoPanelWorkers { curator: String },

    #[error("No valid drafts received from {workers} worker(s); curation aborted")]
    NoValidDrafts { workers: usize },

    #[error("Curator {curator} failed: {message}")]
    CuratorFailed { curator: String, message: String },
}

/// Errors from the checkpoint store.
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("Failed to create checkpoint directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read checkpoint file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse checkpoint file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to write checkpoint file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize checkpoints: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("Failed to remove checkpoint file {path}: {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No checkpoint recorded for step '{step_id}'")]
    UnknownStep { step_id: String },
}

/// Errors from the input/output validation collaborator.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Prompt must be a non-empty string")]
    EmptyPrompt,

    #[error("Prompt too short (minimum {min} characters)")]
    PromptTooShort { min: usize },

    #[error("Prompt too long (maximum {max} characters, got {len})")]
    PromptTooLong { max: usize, len: usize },

    #[error("Prompt contains null bytes")]
    NullByte,

    #[error("Content exceeds maximum length ({len} > {max})")]
    ContentTooLong { max: usize, len: usize },

    #[error("Path '{path}' escapes project boundary '{root}'")]
    PathEscapesRoot { path: PathBuf, root: PathBuf },

    #[error("Symlink detected in path: {path}")]
    Symlink { path: PathBuf },

    #[error("Path validation failed for {path}: {message}")]
    Io { path: PathBuf, message: String },
}
