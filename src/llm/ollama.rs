use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{GenerationRequest, Generator};
use crate::errors::WorkerError;

/// Talks to an Ollama server's `/api/generate` endpoint.
#[derive(Debug, Clone)]
pub struct OllamaGenerator {
    client: reqwest::Client,
    base_url: String,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct GenerateBody<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    keep_alive: &'a str,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
    num_ctx: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateReply {
    response: String,
}

impl OllamaGenerator {
    pub fn new(base_url: &str, temperature: f32, request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .context("Failed to build HTTP client for Ollama")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            temperature,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/api/generate", self.base_url)
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    async fn generate(&self, request: GenerationRequest) -> Result<String, WorkerError> {
        let body = GenerateBody {
            model: &request.model,
            prompt: &request.prompt,
            stream: false,
            keep_alive: "30m",
            options: GenerateOptions {
                temperature: self.temperature,
                num_ctx: 2048,
            },
        };

        tracing::debug!(role = %request.role, model = %request.model, "ollama request");
        let response = self
            .client
            .post(self.endpoint())
            .json(&body)
            .send()
            .await
            .map_err(|e| WorkerError::failed(format!("ollama request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(WorkerError::failed(format!(
                "ollama returned {}: {}",
                status,
                text.trim()
            )));
        }

        let reply: GenerateReply = response
            .json()
            .await
            .map_err(|e| WorkerError::failed(format!("unreadable ollama reply: {}", e)))?;
        Ok(reply.response)
    }
}
