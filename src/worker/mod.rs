//! Workers: the closed set of roles that produce artifacts.
//!
//! Each [`WorkerKind`] knows how to prompt the generator, how to validate
//! what comes back, and what to produce instead when that fails
//! ([`Worker::fallback`]). Workers never touch the run's artifact set; they
//! return deltas for the orchestrator to merge.

pub mod documents;
mod fallback;
mod parse;
mod prompts;
mod render;

pub use fallback::{default_acceptance, default_plan};

use std::fmt;
use std::sync::Arc;

use crate::artifact::ArtifactSet;
use crate::errors::WorkerError;
use crate::llm::{GenerationRequest, Generator};
use crate::models::{ProjectRequest, RunId};
use documents::{AcceptanceReport, Plan, PlanTask, Strategy};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerKind {
    Strategist,
    Planner,
    Architect,
    Implementer { index: usize },
    Integrator { index: usize },
    IntegrationVerifier,
    AcceptanceVerifier,
    ReleasePreparer,
}

impl WorkerKind {
    /// Role name used for model assignment.
    pub fn role(&self) -> &'static str {
        match self {
            Self::Strategist => "strategist",
            Self::Planner => "planner",
            Self::Architect => "architect",
            Self::Implementer { .. } => "implementer",
            Self::Integrator { .. } => "integrator",
            Self::IntegrationVerifier => "integration_verifier",
            Self::AcceptanceVerifier => "acceptance_verifier",
            Self::ReleasePreparer => "release_preparer",
        }
    }

    /// Deterministic default output for `input`.
    pub fn fallback(&self, input: &WorkerInput) -> ArtifactSet {
        match self {
            Self::Strategist => fallback::strategy(input),
            Self::Planner => fallback::plan(input),
            Self::Architect => fallback::core(input),
            Self::Implementer { .. } => fallback::modules(input),
            Self::Integrator { .. } => fallback::integration(input),
            Self::IntegrationVerifier => fallback::integration_tests(input),
            Self::AcceptanceVerifier => fallback::acceptance(input),
            Self::ReleasePreparer => fallback::release(input),
        }
    }
}

impl fmt::Display for WorkerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Implementer { index } | Self::Integrator { index } => {
                write!(f, "{}-{}", self.role(), index)
            }
            _ => f.write_str(self.role()),
        }
    }
}

/// Everything a worker may look at. Built fresh for every invocation from
/// the request and the artifacts accumulated so far.
#[derive(Debug, Clone)]
pub struct WorkerInput {
    pub run_id: RunId,
    pub request: ProjectRequest,
    pub strategy: Option<Strategy>,
    pub plan: Option<Plan>,
    /// Implementer slice of the plan; empty for every other role.
    pub tasks: Vec<PlanTask>,
    /// Snapshot of the run's artifacts at the start of the step.
    pub artifacts: Arc<ArtifactSet>,
    pub acceptance: Option<AcceptanceReport>,
}

impl WorkerInput {
    pub fn new(run_id: RunId, request: ProjectRequest) -> Self {
        Self {
            run_id,
            request,
            strategy: None,
            plan: None,
            tasks: Vec::new(),
            artifacts: Arc::new(ArtifactSet::new()),
            acceptance: None,
        }
    }
}

/// A worker kind bound to a generator and model.
#[derive(Clone)]
pub struct Worker {
    kind: WorkerKind,
    generator: Arc<dyn Generator>,
    model: String,
}

impl Worker {
    pub fn new(kind: WorkerKind, generator: Arc<dyn Generator>, model: impl Into<String>) -> Self {
        Self {
            kind,
            generator,
            model: model.into(),
        }
    }

    pub fn kind(&self) -> WorkerKind {
        self.kind
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Do the real work. Fails with `Failed` when the generator does, and
    /// `Invalid` when its output does not have the expected shape or would
    /// put a file where the run already has a directory (or the reverse).
    pub async fn invoke(&self, input: &WorkerInput) -> Result<ArtifactSet, WorkerError> {
        let delta = self.produce(input).await?;
        if let Some((path, existing)) = input.artifacts.find_clash(&delta) {
            return Err(WorkerError::invalid(format!(
                "{} clashes with existing {}",
                path, existing
            )));
        }
        Ok(delta)
    }

    async fn produce(&self, input: &WorkerInput) -> Result<ArtifactSet, WorkerError> {
        match self.kind {
            WorkerKind::Implementer { .. } => self.implement(input).await,
            WorkerKind::Strategist => parse::strategy(&self.ask(prompts::strategist(input)).await?),
            WorkerKind::Planner => parse::plan(&self.ask(prompts::planner(input)).await?),
            WorkerKind::Architect => {
                parse::file_map(&self.ask(prompts::architect(input)).await?, "core build")
            }
            WorkerKind::Integrator { .. } => {
                parse::file_map(&self.ask(prompts::integrator(input)).await?, "integration")
            }
            WorkerKind::IntegrationVerifier => {
                parse::integration_tests(&self.ask(prompts::integration_verifier(input)).await?)
            }
            WorkerKind::AcceptanceVerifier => {
                parse::acceptance(&self.ask(prompts::acceptance_verifier(input)).await?)
            }
            WorkerKind::ReleasePreparer => {
                parse::release(&self.ask(prompts::release_preparer(input)).await?, input)
            }
        }
    }

    pub fn fallback(&self, input: &WorkerInput) -> ArtifactSet {
        self.kind.fallback(input)
    }

    async fn ask(&self, prompt: String) -> Result<String, WorkerError> {
        self.generator
            .generate(GenerationRequest {
                role: self.kind.role().to_string(),
                model: self.model.clone(),
                prompt,
            })
            .await
    }

    /// One generation per assigned task. Any failure fails the whole slice.
    async fn implement(&self, input: &WorkerInput) -> Result<ArtifactSet, WorkerError> {
        let mut delta = ArtifactSet::new();
        for task in &input.tasks {
            let text = self.ask(prompts::implementer(input, task)).await?;
            delta.insert(task.target_path(), parse::module_source(&text, task)?);
        }
        Ok(delta)
    }
}

impl fmt::Debug for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker")
            .field("kind", &self.kind)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}
