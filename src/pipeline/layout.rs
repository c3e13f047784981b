//! Which workers run in each phase and what input each one gets.
//!
//! The layout is fixed when the orchestrator is built; only the inputs are
//! computed per run, as pure functions of the request and the artifacts
//! accumulated so far.

use std::sync::Arc;

use super::executor::WorkUnit;
use super::{Phase, PhaseSettings, PipelineConfig};
use crate::artifact::ArtifactSet;
use crate::errors::PipelineError;
use crate::llm::Generator;
use crate::models::{ProjectRequest, RunId};
use crate::worker::documents::{
    ACCEPTANCE_REPORT_PATH, PLAN_PATH, PlanTask, STRATEGY_PATH, read_document,
};
use crate::worker::{Worker, WorkerInput, WorkerKind};

/// How a step's input is spread over its workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fanout {
    /// One worker.
    Single,
    /// Plan tasks dealt round-robin, one slice per worker.
    Partitioned,
    /// Every worker sees the same input.
    Replicated,
}

/// One deadline-bounded unit of a phase. Most phases have exactly one step;
/// verify has two that run back to back.
#[derive(Debug, Clone)]
pub struct Step {
    pub name: &'static str,
    pub workers: Vec<Worker>,
    pub fanout: Fanout,
}

#[derive(Debug, Clone)]
pub struct PhaseLayout {
    pub phase: Phase,
    pub settings: PhaseSettings,
    pub steps: Vec<Step>,
}

/// The seven-phase pipeline with pool sizes from `config`.
pub fn standard_layout(
    config: &PipelineConfig,
    generator: Arc<dyn Generator>,
    model_for: impl Fn(&str) -> String,
) -> Vec<PhaseLayout> {
    let worker = |kind: WorkerKind| Worker::new(kind, generator.clone(), model_for(kind.role()));
    let single = |name: &'static str, kind: WorkerKind| Step {
        name,
        workers: vec![worker(kind)],
        fanout: Fanout::Single,
    };

    Phase::ALL
        .into_iter()
        .map(|phase| {
            let steps = match phase {
                Phase::Strategize => vec![single("strategize", WorkerKind::Strategist)],
                Phase::Plan => vec![single("plan", WorkerKind::Planner)],
                Phase::CoreBuild => vec![single("core_build", WorkerKind::Architect)],
                Phase::ModuleBuild => vec![Step {
                    name: "module_build",
                    workers: (0..config.implementers)
                        .map(|index| worker(WorkerKind::Implementer { index }))
                        .collect(),
                    fanout: Fanout::Partitioned,
                }],
                Phase::Integrate => vec![Step {
                    name: "integrate",
                    workers: (0..config.integrators)
                        .map(|index| worker(WorkerKind::Integrator { index }))
                        .collect(),
                    fanout: Fanout::Replicated,
                }],
                Phase::Verify => vec![
                    single("integration_verify", WorkerKind::IntegrationVerifier),
                    single("acceptance_verify", WorkerKind::AcceptanceVerifier),
                ],
                Phase::Release => vec![single("release", WorkerKind::ReleasePreparer)],
            };
            PhaseLayout {
                phase,
                settings: config.settings(phase),
                steps,
            }
        })
        .collect()
}

/// Deal tasks to `workers` slices by task index modulo pool size.
pub fn partition_round_robin(tasks: &[PlanTask], workers: usize) -> Vec<Vec<PlanTask>> {
    let workers = workers.max(1);
    let mut slices = vec![Vec::new(); workers];
    for (i, task) in tasks.iter().enumerate() {
        slices[i % workers].push(task.clone());
    }
    slices
}

fn missing(phase: Phase, what: &str, path: &str) -> PipelineError {
    PipelineError::MissingInput {
        phase: phase.to_string(),
        what: format!("{} ({})", what, path),
    }
}

/// Shared input for every worker of `phase`, read back from the artifacts.
///
/// The strategy and plan documents are hard requirements for the phases that
/// build on them; their absence cannot be papered over by a fallback.
pub fn phase_input(
    phase: Phase,
    run_id: RunId,
    request: &ProjectRequest,
    artifacts: Arc<ArtifactSet>,
) -> Result<WorkerInput, PipelineError> {
    let mut input = WorkerInput::new(run_id, request.clone());
    input.strategy = read_document(&artifacts, STRATEGY_PATH);
    input.plan = read_document(&artifacts, PLAN_PATH);
    input.acceptance = read_document(&artifacts, ACCEPTANCE_REPORT_PATH);
    input.artifacts = artifacts;

    let needs_strategy = matches!(phase, Phase::Plan | Phase::CoreBuild);
    let needs_plan = matches!(phase, Phase::CoreBuild | Phase::ModuleBuild);
    if needs_strategy && input.strategy.is_none() {
        return Err(missing(phase, "strategy descriptor", STRATEGY_PATH));
    }
    if needs_plan && input.plan.is_none() {
        return Err(missing(phase, "plan", PLAN_PATH));
    }
    Ok(input)
}

/// Pair every worker of `step` with its input.
pub fn work_units(step: &Step, input: WorkerInput) -> Vec<WorkUnit> {
    match step.fanout {
        Fanout::Single | Fanout::Replicated => step
            .workers
            .iter()
            .map(|worker| WorkUnit::new(worker.clone(), input.clone()))
            .collect(),
        Fanout::Partitioned => {
            let tasks = input.plan.as_ref().map(|p| p.tasks.as_slice()).unwrap_or_default();
            let slices = partition_round_robin(tasks, step.workers.len());
            step.workers
                .iter()
                .zip(slices)
                .map(|(worker, tasks)| {
                    let mut input = input.clone();
                    input.tasks = tasks;
                    WorkUnit::new(worker.clone(), input)
                })
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::OfflineGenerator;
    use crate::models::ProjectCategory;
    use crate::worker::documents::{Plan, write_document};
    use crate::worker::default_plan;

    fn tasks(n: usize) -> Vec<PlanTask> {
        (1..=n)
            .map(|i| PlanTask {
                id: format!("T{i}"),
                title: format!("Task {i}"),
                description: "work".into(),
                assigned_to: "dev".into(),
                dependencies: vec![],
                estimated_hours: 1.0,
                file: None,
            })
            .collect()
    }

    fn request() -> ProjectRequest {
        ProjectRequest::new("T", "D", ProjectCategory::WebApp)
    }

    fn layout(config: &PipelineConfig) -> Vec<PhaseLayout> {
        standard_layout(config, Arc::new(OfflineGenerator), |role| format!("model-for-{role}"))
    }

    #[test]
    fn round_robin_by_index_modulo_pool() {
        let slices = partition_round_robin(&tasks(12), 5);
        assert_eq!(slices.len(), 5);
        for (worker, slice) in slices.iter().enumerate() {
            let expected: Vec<String> = (0..12)
                .filter(|i| i % 5 == worker)
                .map(|i| format!("T{}", i + 1))
                .collect();
            let got: Vec<String> = slice.iter().map(|t| t.id.clone()).collect();
            assert_eq!(got, expected, "worker {worker}");
        }
    }

    #[test]
    fn fewer_tasks_than_workers_leaves_empty_slices() {
        let slices = partition_round_robin(&tasks(2), 5);
        assert_eq!(slices.iter().filter(|s| s.is_empty()).count(), 3);
        assert_eq!(partition_round_robin(&tasks(3), 0).len(), 1);
    }

    #[test]
    fn standard_layout_shape() {
        let config = PipelineConfig::default().with_pool_sizes(4, 3);
        let layout = layout(&config);

        let phases: Vec<Phase> = layout.iter().map(|p| p.phase).collect();
        assert_eq!(phases, Phase::ALL.to_vec());

        let module_build = &layout[3].steps[0];
        assert_eq!(module_build.workers.len(), 4);
        assert_eq!(module_build.fanout, Fanout::Partitioned);
        assert_eq!(module_build.workers[0].model(), "model-for-implementer");

        assert_eq!(layout[4].steps[0].workers.len(), 3);
        assert_eq!(layout[4].steps[0].fanout, Fanout::Replicated);

        let verify: Vec<&str> = layout[5].steps.iter().map(|s| s.name).collect();
        assert_eq!(verify, vec!["integration_verify", "acceptance_verify"]);
    }

    #[test]
    fn plan_phase_requires_strategy() {
        let err = phase_input(Phase::Plan, RunId::new(), &request(), Arc::new(ArtifactSet::new()))
            .unwrap_err();
        assert!(matches!(err, PipelineError::MissingInput { ref phase, .. } if phase == "plan"));
        assert!(err.to_string().contains(STRATEGY_PATH));

        // Strategize and the late phases do not hard-require anything.
        for phase in [Phase::Strategize, Phase::Integrate, Phase::Verify, Phase::Release] {
            assert!(phase_input(phase, RunId::new(), &request(), Arc::new(ArtifactSet::new())).is_ok());
        }
    }

    #[test]
    fn module_build_requires_plan_and_partitions_it() {
        let config = PipelineConfig::default();
        let layout = layout(&config);
        let step = &layout[3].steps[0];

        let err = phase_input(Phase::ModuleBuild, RunId::new(), &request(), Arc::new(ArtifactSet::new()))
            .unwrap_err();
        assert!(err.to_string().contains(PLAN_PATH));

        let mut artifacts = ArtifactSet::new();
        artifacts.insert(PLAN_PATH, write_document(&Plan { tasks: tasks(7) }));
        let input = phase_input(Phase::ModuleBuild, RunId::new(), &request(), Arc::new(artifacts))
            .unwrap();
        let units = work_units(step, input);

        assert_eq!(units.len(), 5);
        let ids: Vec<Vec<&str>> = units
            .iter()
            .map(|u| u.input.tasks.iter().map(|t| t.id.as_str()).collect())
            .collect();
        assert_eq!(ids[0], vec!["T1", "T6"]);
        assert_eq!(ids[1], vec!["T2", "T7"]);
        assert_eq!(ids[4], vec!["T5"]);
    }

    #[test]
    fn replicated_units_share_the_full_artifact_set() {
        let config = PipelineConfig::default();
        let layout = layout(&config);
        let mut artifacts = ArtifactSet::new();
        artifacts.insert(PLAN_PATH, write_document(&default_plan()));
        artifacts.insert("main.py", "print('hi')");

        let input = phase_input(Phase::Integrate, RunId::new(), &request(), Arc::new(artifacts))
            .unwrap();
        let units = work_units(&layout[4].steps[0], input);

        assert_eq!(units.len(), PipelineConfig::DEFAULT_INTEGRATORS);
        for unit in &units {
            assert_eq!(unit.input.artifacts.get("main.py"), Some("print('hi')"));
            assert!(unit.input.tasks.is_empty());
        }
    }
}
