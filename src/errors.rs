//! Typed error hierarchy for the foundry pipeline.
//!
//! - `WorkerError` — a single worker's failure, absorbed by its fallback when the phase is recoverable
//! - `StoreError` / `PackagingError` — the artifact store and archive builder
//! - `PipelineError` — unrecoverable conditions that terminate a run
//! - `ControllerError` — lookups against the run registry

use std::path::PathBuf;

use thiserror::Error;

/// Errors produced by a worker invocation.
///
/// Neither variant ever reaches a run's terminal status on its own: the
/// executor substitutes the worker's fallback, unless the phase is marked
/// non-recoverable and the failure is `Failed`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WorkerError {
    #[error("worker failed: {reason}")]
    Failed { reason: String },

    #[error("invalid worker output: {reason}")]
    Invalid { reason: String },
}

impl WorkerError {
    pub fn failed(reason: impl Into<String>) -> Self {
        WorkerError::Failed {
            reason: reason.into(),
        }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        WorkerError::Invalid {
            reason: reason.into(),
        }
    }
}

/// Errors from an [`ArtifactStore`](crate::artifact::ArtifactStore).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid artifact path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("artifact '{path}' not found")]
    NotFound { path: String },

    #[error("artifact store unreachable: {0}")]
    Unreachable(String),

    #[error("artifact store I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors from a [`Packager`](crate::artifact::Packager).
#[derive(Debug, Error)]
pub enum PackagingError {
    #[error("run {run_id} has no artifacts to package")]
    EmptyRun { run_id: String },

    #[error("could not read artifacts: {0}")]
    Store(#[from] StoreError),

    #[error("failed to write archive {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("packaging task aborted: {0}")]
    Aborted(String),
}

/// Conditions that terminate a run as `failed`.
///
/// Every variant names the stage it happened in so the run message is
/// self-explanatory.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("phase {phase} failed: {reason}")]
    PhaseFailed { phase: String, reason: String },

    #[error("phase {phase} is missing its input: {what}")]
    MissingInput { phase: String, what: String },

    #[error("persisting phase {phase} output failed: {source}")]
    Persistence {
        phase: String,
        #[source]
        source: StoreError,
    },

    #[error("packaging failed: {0}")]
    Packaging(#[from] PackagingError),
}

/// Errors surfaced by the [`RunController`](crate::controller::RunController).
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("run {id} not found")]
    RunNotFound { id: String },

    /// The run exists but has no archive: still running, or failed.
    #[error("no archive for run {id} (status: {status})")]
    ArchiveNotFound { id: String, status: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}
