//! Run registry and lifecycle: submit, status, archive lookup.
//!
//! Each run's latest snapshot lives in a `watch` channel, so status queries
//! are a cheap borrow and waiters can block on the terminal transition
//! without polling. The registry is in-memory; artifacts and archives on
//! disk outlive the process, run records do not.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::{RwLock, mpsc, watch};
use tracing::{error, info};

use crate::artifact::{ArtifactStore, FsArtifactStore, TarballPackager};
use crate::config::FoundryConfig;
use crate::errors::ControllerError;
use crate::llm;
use crate::models::{ArchiveInfo, ProjectRequest, Run, RunId, RunStatus, RunSummary};
use crate::pipeline::{PipelineEvent, PipelineOrchestrator};

type Registry = Arc<RwLock<HashMap<RunId, watch::Sender<Run>>>>;

#[derive(Clone)]
pub struct RunController {
    orchestrator: PipelineOrchestrator,
    runs: Registry,
    event_sink: Option<mpsc::Sender<PipelineEvent>>,
}

impl RunController {
    pub fn new(orchestrator: PipelineOrchestrator) -> Self {
        Self {
            orchestrator,
            runs: Arc::new(RwLock::new(HashMap::new())),
            event_sink: None,
        }
    }

    /// Wire up the generator, filesystem store and tarball packager named by
    /// `config`.
    pub fn from_config(config: &FoundryConfig) -> Result<Self> {
        let generator = llm::from_config(&config.llm).context("Failed to set up generator")?;
        let store: Arc<dyn ArtifactStore> = Arc::new(FsArtifactStore::new(config.runs_dir()));
        let packager = Arc::new(TarballPackager::new(store.clone(), config.archives_dir()));
        let llm_section = config.llm.clone();
        let orchestrator = PipelineOrchestrator::new(
            config.pipeline_config(),
            generator,
            move |role| llm_section.model_for(role),
            store,
            packager,
        );
        Ok(Self::new(orchestrator))
    }

    /// Also forward every pipeline event of every run to `tx`.
    pub fn with_event_sink(mut self, tx: mpsc::Sender<PipelineEvent>) -> Self {
        self.event_sink = Some(tx);
        self
    }

    /// Start a run in the background. The run is registered as `running`
    /// before this returns.
    pub async fn submit(&self, request: ProjectRequest) -> RunId {
        let (id, _) = self.launch(request).await;
        id
    }

    /// Run a pipeline to completion and return the terminal snapshot.
    pub async fn execute(&self, request: ProjectRequest) -> Result<Run, ControllerError> {
        let (id, handle) = self.launch(request).await;
        handle.await.ok();
        self.status(&id).await
    }

    pub async fn status(&self, id: &RunId) -> Result<Run, ControllerError> {
        let runs = self.runs.read().await;
        runs.get(id)
            .map(|tx| tx.borrow().clone())
            .ok_or_else(|| ControllerError::RunNotFound { id: id.to_string() })
    }

    /// Block until the run is terminal.
    pub async fn wait(&self, id: &RunId) -> Result<Run, ControllerError> {
        let mut rx = {
            let runs = self.runs.read().await;
            runs.get(id)
                .map(|tx| tx.subscribe())
                .ok_or_else(|| ControllerError::RunNotFound { id: id.to_string() })?
        };
        // An error means the sender is gone; the last snapshot still stands.
        if rx.wait_for(|run| run.is_terminal()).await.is_err() {
            tracing::debug!(run_id = %id, "Run state channel closed while waiting");
        }
        let finished = rx.borrow().clone();
        Ok(finished)
    }

    /// Archive of a succeeded run. Unknown, running and failed runs all
    /// report not found.
    pub async fn archive_location(&self, id: &RunId) -> Result<ArchiveInfo, ControllerError> {
        let run = self.status(id).await?;
        match (&run.status, run.archive) {
            (RunStatus::Succeeded, Some(archive)) => Ok(archive),
            (status, _) => Err(ControllerError::ArchiveNotFound {
                id: id.to_string(),
                status: status.to_string(),
            }),
        }
    }

    /// Every known run, oldest first.
    pub async fn list(&self) -> Vec<RunSummary> {
        let runs = self.runs.read().await;
        let mut summaries: Vec<RunSummary> = runs.values().map(|tx| tx.borrow().summary()).collect();
        summaries.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        summaries
    }

    /// Paths currently stored for a run.
    pub async fn artifacts(&self, id: &RunId) -> Result<Vec<String>, ControllerError> {
        self.status(id).await?;
        let run_id = *id;
        let paths = self
            .orchestrator
            .store()
            .call(move |store| store.list(&run_id))
            .await?;
        Ok(paths)
    }

    async fn launch(&self, request: ProjectRequest) -> (RunId, tokio::task::JoinHandle<()>) {
        let run = Run::new();
        let id = run.id;
        let (state_tx, _) = watch::channel(run.clone());
        self.runs.write().await.insert(id, state_tx.clone());
        info!(run_id = %id, title = %request.title, "Run submitted");

        // Phase progress reaches the registry through the event channel; the
        // forwarder is drained before the terminal snapshot is published.
        let (tx, mut rx) = mpsc::channel::<PipelineEvent>(64);
        let orchestrator = self.orchestrator.clone().with_event_channel(tx);
        let sink = self.event_sink.clone();
        let progress = state_tx.clone();
        let forwarder = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if let PipelineEvent::PhaseStarted { phase, ordinal, .. } = &event {
                    progress.send_modify(|run| {
                        run.enter_phase(*ordinal, phase.as_str());
                    });
                }
                if let Some(sink) = &sink {
                    sink.send(event).await.ok();
                }
            }
        });

        let handle = tokio::spawn(async move {
            let pipeline = tokio::spawn(async move { orchestrator.execute(run, &request).await });
            let finished = match pipeline.await {
                Ok(finished) => Some(finished),
                Err(err) => {
                    error!(run_id = %id, error = %err, "Run task aborted");
                    None
                }
            };
            forwarder.await.ok();
            state_tx.send_modify(|current| match finished {
                Some(finished) => *current = finished,
                None => {
                    current.fail("Project generation failed: run task aborted");
                }
            });
        });
        (id, handle)
    }
}

impl std::fmt::Debug for RunController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunController")
            .field("orchestrator", &self.orchestrator)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::MemoryArtifactStore;
    use crate::errors::WorkerError;
    use crate::llm::{GenerationRequest, Generator, OfflineGenerator};
    use crate::models::ProjectCategory;
    use crate::pipeline::{Phase, PipelineConfig};
    use async_trait::async_trait;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::sync::Notify;

    fn controller(generator: Arc<dyn Generator>, dir: &TempDir) -> RunController {
        let store: Arc<dyn ArtifactStore> = Arc::new(MemoryArtifactStore::new());
        let packager = Arc::new(TarballPackager::new(store.clone(), dir.path()));
        RunController::new(PipelineOrchestrator::new(
            PipelineConfig::default(),
            generator,
            |role| role.to_string(),
            store,
            packager,
        ))
    }

    fn request() -> ProjectRequest {
        ProjectRequest::new("T", "D", ProjectCategory::WebApp)
    }

    /// Holds the planner until released; everything else fails fast.
    struct GatedPlanner(Arc<Notify>);

    #[async_trait]
    impl Generator for GatedPlanner {
        async fn generate(&self, request: GenerationRequest) -> Result<String, WorkerError> {
            if request.role == "planner" {
                self.0.notified().await;
            }
            Err(WorkerError::failed("scripted"))
        }
    }

    #[tokio::test]
    async fn unknown_run_is_not_found() {
        let dir = TempDir::new().unwrap();
        let ctl = controller(Arc::new(OfflineGenerator), &dir);
        let id = RunId::new();

        assert!(matches!(ctl.status(&id).await, Err(ControllerError::RunNotFound { .. })));
        assert!(matches!(
            ctl.archive_location(&id).await,
            Err(ControllerError::RunNotFound { .. })
        ));
        assert!(matches!(ctl.wait(&id).await, Err(ControllerError::RunNotFound { .. })));
    }

    #[tokio::test]
    async fn submit_returns_running_and_tracks_phase() {
        let dir = TempDir::new().unwrap();
        let gate = Arc::new(Notify::new());
        let ctl = controller(Arc::new(GatedPlanner(gate.clone())), &dir);

        let id = ctl.submit(request()).await;
        let run = ctl.status(&id).await.unwrap();
        assert!(!run.is_terminal());

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let run = ctl.status(&id).await.unwrap();
            if run.current_phase == Phase::Plan.ordinal() {
                assert_eq!(run.phase_name.as_deref(), Some("plan"));
                break;
            }
            assert!(tokio::time::Instant::now() < deadline, "never reached plan phase");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(matches!(
            ctl.archive_location(&id).await,
            Err(ControllerError::ArchiveNotFound { ref status, .. }) if status == "running"
        ));

        gate.notify_one();
        let run = ctl.wait(&id).await.unwrap();
        assert_eq!(run.status, RunStatus::Succeeded);
        assert_eq!(run.current_phase, 7);
        let archive = ctl.archive_location(&id).await.unwrap();
        assert!(archive.path.exists());
    }

    #[tokio::test]
    async fn failed_run_has_no_archive_but_keeps_artifacts() {
        let dir = TempDir::new().unwrap();
        let store: Arc<dyn ArtifactStore> = Arc::new(MemoryArtifactStore::new());
        let packager = Arc::new(TarballPackager::new(store.clone(), dir.path()));
        let config = PipelineConfig::default().with_recoverable(Phase::CoreBuild, false);
        let ctl = RunController::new(PipelineOrchestrator::new(
            config,
            Arc::new(OfflineGenerator),
            |role| role.to_string(),
            store,
            packager,
        ));

        let run = ctl.execute(request()).await.unwrap();

        assert_eq!(run.status, RunStatus::Failed);
        assert!(run.message.as_deref().unwrap().contains("core_build"));
        assert!(matches!(
            ctl.archive_location(&run.id).await,
            Err(ControllerError::ArchiveNotFound { ref status, .. }) if status == "failed"
        ));
        let paths = ctl.artifacts(&run.id).await.unwrap();
        assert_eq!(paths, vec!["docs/plan.json", "docs/strategy.json"]);
    }

    #[tokio::test]
    async fn list_is_ordered_by_creation() {
        let dir = TempDir::new().unwrap();
        let ctl = controller(Arc::new(OfflineGenerator), &dir);

        let first = ctl.submit(request()).await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        let second = ctl.submit(request()).await;
        ctl.wait(&first).await.unwrap();
        ctl.wait(&second).await.unwrap();

        let listed: Vec<RunId> = ctl.list().await.into_iter().map(|s| s.id).collect();
        assert_eq!(listed, vec![first, second]);
    }

    #[tokio::test]
    async fn events_are_forwarded_to_sink() {
        let dir = TempDir::new().unwrap();
        let (tx, mut rx) = mpsc::channel(256);
        let ctl = controller(Arc::new(OfflineGenerator), &dir).with_event_sink(tx);

        let run = ctl.execute(request()).await.unwrap();

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert!(events.iter().all(|e| e.run_id() == run.id));
        assert!(matches!(events.last(), Some(PipelineEvent::RunSucceeded { .. })));
    }
}
