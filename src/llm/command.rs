use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use super::{GenerationRequest, Generator};
use crate::errors::WorkerError;

/// Runs a local CLI in print mode (`<cmd> --print --output-format text -p <prompt>`)
/// and returns its stdout.
///
/// The child is killed when the future is dropped, so a phase timeout does
/// not leave it running.
#[derive(Debug, Clone)]
pub struct CommandGenerator {
    command: String,
}

impl CommandGenerator {
    pub fn new(command: &str) -> Self {
        Self {
            command: command.to_string(),
        }
    }
}

#[async_trait]
impl Generator for CommandGenerator {
    async fn generate(&self, request: GenerationRequest) -> Result<String, WorkerError> {
        let output = Command::new(&self.command)
            .args([
                "--print",
                "--output-format",
                "text",
                "-p",
                &request.prompt,
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| WorkerError::failed(format!("failed to run {}: {}", self.command, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(WorkerError::failed(format!(
                "{} exited with {}: {}",
                self.command,
                output.status,
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn request() -> GenerationRequest {
        GenerationRequest {
            role: "implementer".into(),
            model: "ignored".into(),
            prompt: "write code".into(),
        }
    }

    #[tokio::test]
    async fn stdout_becomes_the_response() {
        // `echo` prints its arguments, prompt included.
        let text = CommandGenerator::new("echo").generate(request()).await.unwrap();
        assert!(text.contains("write code"));
    }

    #[tokio::test]
    async fn non_zero_exit_is_worker_failure() {
        let err = CommandGenerator::new("false").generate(request()).await.unwrap_err();
        assert!(matches!(err, WorkerError::Failed { .. }));
    }

    #[tokio::test]
    async fn missing_binary_is_worker_failure() {
        let err = CommandGenerator::new("/nonexistent/foundry-llm")
            .generate(request())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("failed to run"));
    }
}
