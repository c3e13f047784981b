//! One-shot generation — `foundry run`.

use std::str::FromStr;

use anyhow::{Context, Result, bail};
use tokio::sync::mpsc;

use foundry::config::FoundryConfig;
use foundry::controller::RunController;
use foundry::models::{ProjectCategory, ProjectRequest, RunStatus};
use foundry::pipeline::PipelineEvent;

pub async fn cmd_run(
    config: &FoundryConfig,
    title: String,
    description: String,
    category: &str,
    requirements: Vec<String>,
) -> Result<()> {
    let category = ProjectCategory::from_str(category).map_err(anyhow::Error::msg)?;
    let request = ProjectRequest::new(title, description, category).with_requirements(requirements);
    request
        .validate()
        .map_err(anyhow::Error::msg)
        .context("Invalid project request")?;

    let (tx, rx) = mpsc::channel(64);
    let controller = RunController::from_config(config)?.with_event_sink(tx);
    let printer = tokio::spawn(print_progress(rx));

    let run = controller.execute(request).await?;
    // Dropping the controller closes the event sink so the printer finishes.
    drop(controller);
    printer.await.ok();

    println!();
    println!("Run:    {}", run.id);
    println!("Status: {}", run.status);
    match (run.status, &run.archive) {
        (RunStatus::Succeeded, Some(archive)) => {
            println!("Archive: {}", archive.path.display());
            println!("  files:  {}", archive.file_count);
            println!("  size:   {} bytes", archive.size_bytes);
            println!("  sha256: {}", archive.sha256);
            Ok(())
        }
        _ => bail!(
            "{}",
            run.message
                .unwrap_or_else(|| "Project generation failed".to_string())
        ),
    }
}

async fn print_progress(mut rx: mpsc::Receiver<PipelineEvent>) {
    while let Some(event) = rx.recv().await {
        match event {
            PipelineEvent::PhaseStarted { phase, ordinal, .. } => {
                println!("[{}/7] {}", ordinal, phase);
            }
            PipelineEvent::WorkerFellBack { worker, cause, .. } => {
                println!("      {} used its fallback ({})", worker, cause);
            }
            PipelineEvent::PhaseCompleted {
                files, duration_ms, ..
            } => {
                println!("      {} file(s) in {} ms", files, duration_ms);
            }
            PipelineEvent::RunStarted { .. }
            | PipelineEvent::RunSucceeded { .. }
            | PipelineEvent::RunFailed { .. } => {}
        }
    }
}
