//! The timeout/fallback protocol shared by every phase.
//!
//! A step is a set of work units (one for sequential phases, several for
//! fan-out phases) raced against a single deadline. Each unit ends in exactly
//! one [`WorkerResult`]; deltas are merged in arrival order, so when two
//! units write the same path the later arrival wins.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tokio::task::JoinSet;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, warn};

use super::{Phase, PhaseSettings, PipelineConfig};
use crate::artifact::ArtifactSet;
use crate::errors::{PipelineError, WorkerError};
use crate::worker::{Worker, WorkerInput, WorkerKind};

/// Why a worker's own output was replaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackCause {
    Timeout,
    Failed(String),
    Invalid(String),
    Panicked(String),
}

impl fmt::Display for FallbackCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => f.write_str("timed out"),
            Self::Failed(reason) => write!(f, "failed: {}", reason),
            Self::Invalid(reason) => write!(f, "invalid output: {}", reason),
            Self::Panicked(reason) => write!(f, "panicked: {}", reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WorkerResult {
    Ok(ArtifactSet),
    Fallback {
        delta: ArtifactSet,
        cause: FallbackCause,
    },
    Fatal(WorkerError),
}

impl WorkerResult {
    pub fn delta(&self) -> Option<&ArtifactSet> {
        match self {
            Self::Ok(delta) | Self::Fallback { delta, .. } => Some(delta),
            Self::Fatal(_) => None,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback { .. })
    }
}

#[derive(Debug, Clone)]
pub struct WorkerOutcome {
    pub worker: WorkerKind,
    pub result: WorkerResult,
}

/// Merged result of one step. `outcomes` is in arrival order.
#[derive(Debug, Clone, Default)]
pub struct StepOutcome {
    pub delta: ArtifactSet,
    pub outcomes: Vec<WorkerOutcome>,
}

impl StepOutcome {
    pub fn fallbacks(&self) -> impl Iterator<Item = &WorkerOutcome> {
        self.outcomes.iter().filter(|o| o.result.is_fallback())
    }

    fn record(&mut self, worker: WorkerKind, result: WorkerResult) {
        if let Some(delta) = result.delta() {
            let overwritten = self.delta.merge(delta.clone());
            if !overwritten.is_empty() {
                debug!(worker = %worker, paths = ?overwritten, "later arrival overwrote files");
            }
        }
        self.outcomes.push(WorkerOutcome { worker, result });
    }
}

/// A worker paired with the input it runs on.
#[derive(Debug, Clone)]
pub struct WorkUnit {
    pub worker: Worker,
    pub input: WorkerInput,
}

impl WorkUnit {
    pub fn new(worker: Worker, input: WorkerInput) -> Self {
        Self { worker, input }
    }

    fn fall_back(&self, cause: FallbackCause) -> WorkerResult {
        WorkerResult::Fallback {
            delta: self.worker.fallback(&self.input),
            cause,
        }
    }
}

fn classify(
    unit: &WorkUnit,
    settings: PhaseSettings,
    joined: Result<Result<ArtifactSet, WorkerError>, String>,
) -> WorkerResult {
    match joined {
        Ok(Ok(delta)) => WorkerResult::Ok(delta),
        Ok(Err(WorkerError::Invalid { reason })) => unit.fall_back(FallbackCause::Invalid(reason)),
        Ok(Err(err @ WorkerError::Failed { .. })) if !settings.recoverable => WorkerResult::Fatal(err),
        Ok(Err(WorkerError::Failed { reason })) => unit.fall_back(FallbackCause::Failed(reason)),
        Err(panic) if !settings.recoverable => WorkerResult::Fatal(WorkerError::failed(panic)),
        Err(panic) => unit.fall_back(FallbackCause::Panicked(panic)),
    }
}

/// Keep the merged output storable as a file tree. A result whose paths
/// clash file-versus-directory with a sibling's already merged output falls
/// back; fallback files that still clash with the run or the step are dropped.
fn settle(unit: &WorkUnit, merged: &ArtifactSet, result: WorkerResult) -> WorkerResult {
    let result = match result {
        WorkerResult::Ok(delta) => match merged.find_clash(&delta) {
            Some((path, existing)) => unit.fall_back(FallbackCause::Invalid(format!(
                "{} clashes with {}",
                path, existing
            ))),
            None => WorkerResult::Ok(delta),
        },
        other => other,
    };
    match result {
        WorkerResult::Fallback { mut delta, cause } => {
            let mut dropped = delta.drop_clashes(&unit.input.artifacts);
            dropped.extend(delta.drop_clashes(merged));
            if !dropped.is_empty() {
                warn!(worker = %unit.worker.kind(), paths = ?dropped, "dropped clashing fallback files");
            }
            WorkerResult::Fallback { delta, cause }
        }
        other => other,
    }
}

/// Run every unit concurrently against one deadline and merge the results.
///
/// Units still running at the deadline are aborted and replaced by their
/// fallback; results that already arrived are kept. Returns an error only
/// when a unit fails in a non-recoverable phase, in which case the remaining
/// units are aborted.
pub async fn run_step(
    phase: Phase,
    settings: PhaseSettings,
    units: Vec<WorkUnit>,
) -> Result<StepOutcome, PipelineError> {
    // A deadline past what `Instant` can represent never fires.
    let deadline = Instant::now()
        .checked_add(settings.timeout)
        .unwrap_or_else(|| Instant::now() + PipelineConfig::MAX_TIMEOUT);
    let units: Vec<Arc<WorkUnit>> = units.into_iter().map(Arc::new).collect();

    let mut set = JoinSet::new();
    let mut index_of = HashMap::new();
    for (idx, unit) in units.iter().enumerate() {
        let unit = Arc::clone(unit);
        let handle = set.spawn(async move { unit.worker.invoke(&unit.input).await });
        index_of.insert(handle.id(), idx);
    }

    let mut finished = vec![false; units.len()];
    let mut outcome = StepOutcome::default();
    let timer = sleep_until(deadline);
    tokio::pin!(timer);

    loop {
        tokio::select! {
            biased;
            joined = set.join_next_with_id() => {
                let Some(joined) = joined else { break };
                let (id, raw) = match joined {
                    Ok((id, result)) => (id, Ok(result)),
                    Err(err) => (err.id(), Err(err.to_string())),
                };
                let Some(&idx) = index_of.get(&id) else { continue };
                finished[idx] = true;

                let unit = &units[idx];
                let kind = unit.worker.kind();
                let result = settle(unit, &outcome.delta, classify(unit, settings, raw));
                match &result {
                    WorkerResult::Fatal(err) => {
                        set.shutdown().await;
                        return Err(PipelineError::PhaseFailed {
                            phase: phase.to_string(),
                            reason: format!("{}: {}", kind, err),
                        });
                    }
                    WorkerResult::Fallback { cause, .. } => {
                        warn!(phase = %phase, worker = %kind, cause = %cause, "worker fell back");
                    }
                    WorkerResult::Ok(delta) => {
                        debug!(phase = %phase, worker = %kind, files = delta.len(), "worker finished");
                    }
                }
                outcome.record(kind, result);
            }
            _ = &mut timer => {
                set.shutdown().await;
                for (unit, _) in units.iter().zip(&finished).filter(|(_, done)| !**done) {
                    let kind = unit.worker.kind();
                    warn!(phase = %phase, worker = %kind, timeout_ms = settings.timeout.as_millis() as u64, "worker timed out");
                    let result = settle(unit, &outcome.delta, unit.fall_back(FallbackCause::Timeout));
                    outcome.record(kind, result);
                }
                break;
            }
        }
    }

    Ok(outcome)
}
