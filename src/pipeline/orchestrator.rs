use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tracing::{Instrument, error, info};

use super::events::PipelineEvent;
use super::executor::{WorkerResult, run_step};
use super::layout::{PhaseLayout, phase_input, standard_layout, work_units};
use super::PipelineConfig;
use crate::artifact::{ArtifactSet, ArtifactStore, Packager, StoreHandle};
use crate::errors::{PackagingError, PipelineError};
use crate::llm::Generator;
use crate::logging::phase_span;
use crate::models::{ArchiveInfo, ProjectRequest, Run, RunId};

/// Sequences the seven phases of a run, merges and persists their output,
/// and packages the result.
///
/// Cheap to clone; every run shares the same layout, store and packager.
#[derive(Clone)]
pub struct PipelineOrchestrator {
    config: PipelineConfig,
    layout: Arc<Vec<PhaseLayout>>,
    store: StoreHandle,
    packager: Arc<dyn Packager>,
    event_tx: Option<mpsc::Sender<PipelineEvent>>,
}

impl PipelineOrchestrator {
    pub fn new(
        config: PipelineConfig,
        generator: Arc<dyn Generator>,
        model_for: impl Fn(&str) -> String,
        store: Arc<dyn ArtifactStore>,
        packager: Arc<dyn Packager>,
    ) -> Self {
        let layout = standard_layout(&config, generator, model_for);
        Self {
            config,
            layout: Arc::new(layout),
            store: StoreHandle::new(store),
            packager,
            event_tx: None,
        }
    }

    /// Set an event channel for progress reporting.
    pub fn with_event_channel(mut self, tx: mpsc::Sender<PipelineEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn store(&self) -> &StoreHandle {
        &self.store
    }

    /// Drive `run` through every phase and return it in a terminal state.
    ///
    /// Failures never escape as errors: they end the run as `failed` with a
    /// message naming the stage. Artifacts persisted before the failure stay
    /// in the store.
    pub async fn execute(&self, mut run: Run, request: &ProjectRequest) -> Run {
        let run_id = run.id;
        info!(run_id = %run_id, title = %request.title, category = %request.category.as_str(), "Run started");
        self.emit_event(PipelineEvent::RunStarted { run_id }).await;

        match self.run_phases(&mut run, request).await {
            Ok(archive) => {
                info!(
                    run_id = %run_id,
                    archive = %archive.path.display(),
                    files = archive.file_count,
                    "Run succeeded"
                );
                let path = archive.path.clone();
                run.succeed(archive);
                self.emit_event(PipelineEvent::RunSucceeded { run_id, archive: path })
                    .await;
            }
            Err(err) => {
                error!(run_id = %run_id, error = %err, "Run failed");
                let message = format!("Project generation failed: {}", err);
                run.fail(message.clone());
                self.emit_event(PipelineEvent::RunFailed { run_id, message })
                    .await;
            }
        }
        run
    }

    async fn run_phases(
        &self,
        run: &mut Run,
        request: &ProjectRequest,
    ) -> Result<ArchiveInfo, PipelineError> {
        let mut artifacts = ArtifactSet::new();
        for layout in self.layout.iter() {
            let span = phase_span(&run.id.to_string(), layout.phase.as_str());
            self.run_phase(run, layout, request, &mut artifacts)
                .instrument(span)
                .await?;
        }
        self.package(run.id).await
    }

    async fn run_phase(
        &self,
        run: &mut Run,
        layout: &PhaseLayout,
        request: &ProjectRequest,
        artifacts: &mut ArtifactSet,
    ) -> Result<(), PipelineError> {
        let phase = layout.phase;
        let run_id = run.id;
        run.enter_phase(phase.ordinal(), phase.as_str());
        info!(ordinal = phase.ordinal(), "Phase started");
        self.emit_event(PipelineEvent::PhaseStarted {
            run_id,
            phase,
            ordinal: phase.ordinal(),
        })
        .await;

        let started = Instant::now();
        let mut files = 0;
        let mut fallbacks = 0;
        for step in &layout.steps {
            // Each step sees everything merged so far, including the
            // previous step of the same phase.
            let input = phase_input(phase, run_id, request, Arc::new(artifacts.clone()))?;
            let outcome = run_step(phase, layout.settings, work_units(step, input)).await?;

            for fell_back in outcome.fallbacks() {
                if let WorkerResult::Fallback { cause, .. } = &fell_back.result {
                    fallbacks += 1;
                    self.emit_event(PipelineEvent::WorkerFellBack {
                        run_id,
                        phase,
                        worker: fell_back.worker.to_string(),
                        cause: cause.to_string(),
                    })
                    .await;
                }
            }

            files += outcome.delta.len();
            self.persist(run_id, phase.as_str(), &outcome.delta).await?;
            artifacts.merge(outcome.delta);
        }

        let duration_ms = started.elapsed().as_millis() as u64;
        info!(files, fallbacks, duration_ms, total = artifacts.len(), "Phase completed");
        self.emit_event(PipelineEvent::PhaseCompleted {
            run_id,
            phase,
            files,
            fallbacks,
            duration_ms,
        })
        .await;
        Ok(())
    }

    async fn persist(&self, run_id: RunId, phase: &str, delta: &ArtifactSet) -> Result<(), PipelineError> {
        let delta = delta.clone();
        self.store
            .call(move |store| store.put_all(&run_id, &delta))
            .await
            .map_err(|source| PipelineError::Persistence {
                phase: phase.to_string(),
                source,
            })
    }

    async fn package(&self, run_id: RunId) -> Result<ArchiveInfo, PipelineError> {
        let packager = self.packager.clone();
        let archive = tokio::task::spawn_blocking(move || packager.package(&run_id))
            .await
            .map_err(|e| PackagingError::Aborted(e.to_string()))??;
        Ok(archive)
    }

    /// Emit an event to the event channel if configured.
    async fn emit_event(&self, event: PipelineEvent) {
        if let Some(ref tx) = self.event_tx {
            tx.send(event).await.ok();
        }
    }
}

impl std::fmt::Debug for PipelineOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineOrchestrator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{MemoryArtifactStore, TarballPackager, read_archive};
    use crate::errors::{StoreError, WorkerError};
    use crate::llm::{GenerationRequest, OfflineGenerator};
    use crate::models::{ProjectCategory, RunStatus};
    use crate::pipeline::Phase;
    use crate::worker::documents::{DELIVERY_NOTES_PATH, PLAN_PATH, STRATEGY_PATH};
    use async_trait::async_trait;
    use tempfile::TempDir;

    fn request() -> ProjectRequest {
        ProjectRequest::new("T", "D", ProjectCategory::WebApp)
    }

    fn orchestrator(
        config: PipelineConfig,
        generator: Arc<dyn Generator>,
        store: Arc<dyn ArtifactStore>,
        dir: &TempDir,
    ) -> PipelineOrchestrator {
        let packager = Arc::new(TarballPackager::new(store.clone(), dir.path().join("archives")));
        PipelineOrchestrator::new(config, generator, |role| role.to_string(), store, packager)
    }

    fn drain(rx: &mut mpsc::Receiver<PipelineEvent>) -> Vec<PipelineEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn offline_run_succeeds_on_fallbacks_alone() {
        let dir = TempDir::new().unwrap();
        let store: Arc<dyn ArtifactStore> = Arc::new(MemoryArtifactStore::new());
        let (tx, mut rx) = mpsc::channel(256);
        let orch = orchestrator(PipelineConfig::default(), Arc::new(OfflineGenerator), store.clone(), &dir)
            .with_event_channel(tx);

        let run = orch.execute(Run::new(), &request()).await;

        assert_eq!(run.status, RunStatus::Succeeded, "{:?}", run.message);
        assert_eq!(run.current_phase, 7);
        let archive = run.archive.clone().unwrap();
        let packaged = read_archive(&archive.path).unwrap();
        for path in [STRATEGY_PATH, PLAN_PATH, "main.py", "modules/setup_project.py", DELIVERY_NOTES_PATH] {
            assert!(packaged.contains(path), "archive missing {path}");
        }
        assert_eq!(packaged, store.load(&run.id).unwrap());

        let events = drain(&mut rx);
        assert_eq!(events.first(), Some(&PipelineEvent::RunStarted { run_id: run.id }));
        assert!(matches!(events.last(), Some(PipelineEvent::RunSucceeded { .. })));
        let started: Vec<Phase> = events
            .iter()
            .filter_map(|e| match e {
                PipelineEvent::PhaseStarted { phase, .. } => Some(*phase),
                _ => None,
            })
            .collect();
        assert_eq!(started, Phase::ALL.to_vec());
    }

    #[tokio::test]
    async fn non_recoverable_failure_stops_the_run() {
        let dir = TempDir::new().unwrap();
        let store: Arc<dyn ArtifactStore> = Arc::new(MemoryArtifactStore::new());
        let (tx, mut rx) = mpsc::channel(256);
        let config = PipelineConfig::default().with_recoverable(Phase::Strategize, false);
        let orch = orchestrator(config, Arc::new(OfflineGenerator), store.clone(), &dir)
            .with_event_channel(tx);

        let run = orch.execute(Run::new(), &request()).await;

        assert_eq!(run.status, RunStatus::Failed);
        let message = run.message.unwrap();
        assert!(message.starts_with("Project generation failed"));
        assert!(message.contains("strategize"), "{message}");
        assert!(run.archive.is_none());
        assert!(store.list(&run.id).unwrap().is_empty());

        let events = drain(&mut rx);
        assert!(!events.iter().any(|e| matches!(
            e,
            PipelineEvent::PhaseStarted { phase: Phase::Plan, .. }
        )));
    }

    /// Refuses to store the plan document.
    struct ForgetfulStore(MemoryArtifactStore);

    impl ArtifactStore for ForgetfulStore {
        fn put(&self, run_id: &RunId, path: &str, content: &str) -> Result<(), StoreError> {
            if path == PLAN_PATH {
                return Err(StoreError::Unreachable("disk full".into()));
            }
            self.0.put(run_id, path, content)
        }
        fn list(&self, run_id: &RunId) -> Result<Vec<String>, StoreError> {
            self.0.list(run_id)
        }
        fn get(&self, run_id: &RunId, path: &str) -> Result<String, StoreError> {
            self.0.get(run_id, path)
        }
        fn delete(&self, run_id: &RunId) -> Result<(), StoreError> {
            self.0.delete(run_id)
        }
    }

    #[tokio::test]
    async fn persistence_failure_is_fatal_and_keeps_earlier_phases() {
        let dir = TempDir::new().unwrap();
        let store: Arc<dyn ArtifactStore> = Arc::new(ForgetfulStore(MemoryArtifactStore::new()));
        let orch = orchestrator(PipelineConfig::default(), Arc::new(OfflineGenerator), store.clone(), &dir);

        let run = orch.execute(Run::new(), &request()).await;

        assert_eq!(run.status, RunStatus::Failed);
        let message = run.message.unwrap();
        assert!(message.contains("persisting phase plan"), "{message}");
        assert_eq!(run.current_phase, 2);
        assert_eq!(store.list(&run.id).unwrap(), vec![STRATEGY_PATH.to_string()]);
    }

    struct Fixed(&'static str);

    #[async_trait]
    impl Generator for Fixed {
        async fn generate(&self, _request: GenerationRequest) -> Result<String, WorkerError> {
            Ok(self.0.to_string())
        }
    }

    #[tokio::test]
    async fn invalid_output_everywhere_still_delivers() {
        let dir = TempDir::new().unwrap();
        let store: Arc<dyn ArtifactStore> = Arc::new(MemoryArtifactStore::new());
        let (tx, mut rx) = mpsc::channel(256);
        let orch = orchestrator(PipelineConfig::default(), Arc::new(Fixed("¯\\_(ツ)_/¯")), store, &dir)
            .with_event_channel(tx);

        let run = orch.execute(Run::new(), &request()).await;
        assert_eq!(run.status, RunStatus::Succeeded);

        let events = drain(&mut rx);
        let fell_back = events
            .iter()
            .filter(|e| matches!(e, PipelineEvent::WorkerFellBack { .. }))
            .count();
        // Every worker but the idle implementers (one task, five workers).
        assert_eq!(fell_back, 1 + 1 + 1 + 1 + 2 + 1 + 1 + 1);
    }
}
