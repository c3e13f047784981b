use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::Phase;
use crate::models::RunId;

/// Observable progress of a run, emitted in order by the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    RunStarted {
        run_id: RunId,
    },
    PhaseStarted {
        run_id: RunId,
        phase: Phase,
        ordinal: usize,
    },
    /// A worker's result was replaced by its fallback.
    WorkerFellBack {
        run_id: RunId,
        phase: Phase,
        worker: String,
        cause: String,
    },
    PhaseCompleted {
        run_id: RunId,
        phase: Phase,
        files: usize,
        fallbacks: usize,
        duration_ms: u64,
    },
    RunSucceeded {
        run_id: RunId,
        archive: PathBuf,
    },
    RunFailed {
        run_id: RunId,
        message: String,
    },
}

impl PipelineEvent {
    pub fn run_id(&self) -> RunId {
        match self {
            Self::RunStarted { run_id }
            | Self::PhaseStarted { run_id, .. }
            | Self::WorkerFellBack { run_id, .. }
            | Self::PhaseCompleted { run_id, .. }
            | Self::RunSucceeded { run_id, .. }
            | Self::RunFailed { run_id, .. } => *run_id,
        }
    }
}
