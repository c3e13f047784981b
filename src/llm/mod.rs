//! Text generation backends behind the workers.
//!
//! Real implementations: [`OllamaGenerator`] (HTTP) and [`CommandGenerator`]
//! (local CLI). [`OfflineGenerator`] always fails, so every worker takes its
//! fallback; useful for scaffolding without a model.

mod command;
mod ollama;

pub use command::CommandGenerator;
pub use ollama::OllamaGenerator;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use crate::config::{LlmBackend, LlmSection};
use crate::errors::WorkerError;

/// One prompt sent on behalf of a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    /// Worker role, e.g. `planner` or `implementer`.
    pub role: String,
    pub model: String,
    pub prompt: String,
}

#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, request: GenerationRequest) -> Result<String, WorkerError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineGenerator;

#[async_trait]
impl Generator for OfflineGenerator {
    async fn generate(&self, request: GenerationRequest) -> Result<String, WorkerError> {
        Err(WorkerError::failed(format!(
            "offline: no generator available for {}",
            request.role
        )))
    }
}

/// Build the generator selected by `[llm].backend`.
pub fn from_config(llm: &LlmSection) -> Result<Arc<dyn Generator>> {
    let generator: Arc<dyn Generator> = match llm.backend {
        LlmBackend::Ollama => Arc::new(OllamaGenerator::new(
            &llm.base_url,
            llm.temperature,
            Duration::from_secs(llm.request_timeout_secs),
        )?),
        LlmBackend::Command => Arc::new(CommandGenerator::new(&llm.command)),
        LlmBackend::Offline => Arc::new(OfflineGenerator),
    };
    Ok(generator)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn offline_generator_always_fails() {
        let err = OfflineGenerator
            .generate(GenerationRequest {
                role: "planner".into(),
                model: "m".into(),
                prompt: "p".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, WorkerError::Failed { .. }));
        assert!(err.to_string().contains("planner"));
    }

    #[test]
    fn from_config_honours_backend_selection() {
        let mut llm = LlmSection::default();
        assert!(from_config(&llm).is_ok());
        llm.backend = LlmBackend::Command;
        assert!(from_config(&llm).is_ok());
        llm.backend = LlmBackend::Offline;
        assert!(from_config(&llm).is_ok());
    }
}
