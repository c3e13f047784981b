//! Configuration for foundry, read from `foundry.toml`.
//!
//! Resolution is layered: file → environment → CLI flags. Every field has a
//! default, so an empty or missing file is a valid configuration.
//!
//! # Configuration File Format
//!
//! ```toml
//! [pipeline]
//! implementers = 5
//! integrators = 2
//!
//! [phases.core_build]
//! timeout_secs = 900
//!
//! [phases.strategize]
//! recoverable = false
//!
//! [storage]
//! generated_dir = "generated"
//!
//! [llm]
//! backend = "ollama"
//! base_url = "http://localhost:11434"
//!
//! [llm.roles]
//! implementer = "codellama"
//!
//! [server]
//! host = "127.0.0.1"
//! port = 8000
//!
//! [logging]
//! json = false
//! file = true
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::pipeline::{Phase, PipelineConfig};

pub const CONFIG_FILE: &str = "foundry.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSection {
    #[serde(default = "default_implementers")]
    pub implementers: usize,
    #[serde(default = "default_integrators")]
    pub integrators: usize,
}

fn default_implementers() -> usize {
    PipelineConfig::DEFAULT_IMPLEMENTERS
}

fn default_integrators() -> usize {
    PipelineConfig::DEFAULT_INTEGRATORS
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            implementers: default_implementers(),
            integrators: default_integrators(),
        }
    }
}

/// Per-phase override; unset fields keep the phase default.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PhaseOverride {
    pub timeout_secs: Option<u64>,
    pub recoverable: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSection {
    #[serde(default = "default_generated_dir")]
    pub generated_dir: PathBuf,
}

fn default_generated_dir() -> PathBuf {
    PathBuf::from("generated")
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            generated_dir: default_generated_dir(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmBackend {
    #[default]
    Ollama,
    Command,
    /// No model at all; every worker produces its fallback output.
    Offline,
}

impl std::str::FromStr for LlmBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "command" => Ok(Self::Command),
            "offline" => Ok(Self::Offline),
            _ => Err(format!("Invalid LLM backend: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSection {
    #[serde(default)]
    pub backend: LlmBackend,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// CLI invoked by the `command` backend.
    #[serde(default = "default_command")]
    pub command: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Model alias → concrete model name.
    #[serde(default = "default_models")]
    pub models: BTreeMap<String, String>,
    /// Worker role → model alias.
    #[serde(default = "default_roles")]
    pub roles: BTreeMap<String, String>,
}

fn default_base_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_command() -> String {
    "claude".to_string()
}

fn default_request_timeout_secs() -> u64 {
    1200
}

fn default_temperature() -> f32 {
    0.7
}

fn default_models() -> BTreeMap<String, String> {
    [
        ("mistral", "mistral:7b-instruct"),
        ("starcoder", "starcoder2:7b"),
        ("codellama", "codellama:7b"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

fn default_roles() -> BTreeMap<String, String> {
    [
        ("strategist", "mistral"),
        ("planner", "mistral"),
        ("architect", "starcoder"),
        ("implementer", "codellama"),
        ("integrator", "mistral"),
        ("integration_verifier", "starcoder"),
        ("acceptance_verifier", "starcoder"),
        ("release_preparer", "mistral"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            backend: LlmBackend::default(),
            base_url: default_base_url(),
            command: default_command(),
            request_timeout_secs: default_request_timeout_secs(),
            temperature: default_temperature(),
            models: default_models(),
            roles: default_roles(),
        }
    }
}

impl LlmSection {
    /// Concrete model for a worker role: role → alias → model name. An alias
    /// missing from `models` is used verbatim; an unassigned role gets the
    /// first configured model.
    pub fn model_for(&self, role: &str) -> String {
        match self.roles.get(role) {
            Some(alias) => self.models.get(alias).cloned().unwrap_or_else(|| alias.clone()),
            None => self
                .models
                .values()
                .next()
                .cloned()
                .unwrap_or_else(|| "mistral:7b-instruct".to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingSection {
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
    /// Also write a daily-rolling log file under `<generated_dir>/logs`.
    #[serde(default)]
    pub file: bool,
}

/// Root of `foundry.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FoundryConfig {
    #[serde(default)]
    pub pipeline: PipelineSection,
    #[serde(default)]
    pub phases: BTreeMap<String, PhaseOverride>,
    #[serde(default)]
    pub storage: StorageSection,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

impl FoundryConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse foundry.toml")
    }

    /// Load `path` if given, else `./foundry.toml` if it exists, else defaults.
    /// An explicitly given path must exist.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let default_path = Path::new(CONFIG_FILE);
                if default_path.exists() {
                    Self::load(default_path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize foundry.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply environment overrides using `lookup` to read variables.
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(dir) = lookup("FOUNDRY_GENERATED_DIR") {
            self.storage.generated_dir = PathBuf::from(dir);
        }
        if let Some(url) = lookup("OLLAMA_BASE_URL") {
            self.llm.base_url = url;
        }
        if let Some(cmd) = lookup("FOUNDRY_LLM_COMMAND") {
            self.llm.command = cmd;
            self.llm.backend = LlmBackend::Command;
        }
        // An explicit backend wins over the one implied by a command.
        if let Some(backend) = lookup("FOUNDRY_LLM_BACKEND") {
            self.llm.backend = backend
                .parse()
                .map_err(|e: String| anyhow::anyhow!(e))
                .context("FOUNDRY_LLM_BACKEND")?;
        }
        if let Some(port) = lookup("FOUNDRY_PORT") {
            self.server.port = port
                .parse()
                .with_context(|| format!("FOUNDRY_PORT is not a valid port: {}", port))?;
        }
        Ok(())
    }

    /// Resolve the orchestrator's pipeline shape from this configuration.
    pub fn pipeline_config(&self) -> PipelineConfig {
        let mut config = PipelineConfig::default()
            .with_pool_sizes(self.pipeline.implementers, self.pipeline.integrators);
        for phase in Phase::ALL {
            if let Some(over) = self.phases.get(phase.as_str()) {
                if let Some(secs) = over.timeout_secs {
                    config = config.with_timeout(phase, Duration::from_secs(secs));
                }
                if let Some(recoverable) = over.recoverable {
                    config = config.with_recoverable(phase, recoverable);
                }
            }
        }
        config
    }

    pub fn runs_dir(&self) -> PathBuf {
        self.storage.generated_dir.join("runs")
    }

    pub fn archives_dir(&self) -> PathBuf {
        self.storage.generated_dir.join("archives")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.storage.generated_dir.join("logs")
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.pipeline.implementers == 0 {
            warnings.push("pipeline.implementers is 0; one implementer will be used".to_string());
        }
        if self.pipeline.integrators == 0 {
            warnings.push("pipeline.integrators is 0; one integrator will be used".to_string());
        }

        for (name, over) in &self.phases {
            if name.parse::<Phase>().is_err() {
                warnings.push(format!("Unknown phase '{}' in [phases]", name));
            }
            if over.timeout_secs == Some(0) {
                warnings.push(format!(
                    "Phase '{}' has timeout_secs = 0; every worker will fall back",
                    name
                ));
            }
            let max_secs = PipelineConfig::MAX_TIMEOUT.as_secs();
            if let Some(secs) = over.timeout_secs.filter(|&secs| secs > max_secs) {
                warnings.push(format!(
                    "Phase '{}' has timeout_secs = {}; it will be capped at {}",
                    name, secs, max_secs
                ));
            }
        }

        for (role, alias) in &self.llm.roles {
            if !self.llm.models.contains_key(alias) {
                warnings.push(format!(
                    "Role '{}' uses model alias '{}' which is not in [llm.models]; it will be sent as-is",
                    role, alias
                ));
            }
        }

        if !(0.0..=2.0).contains(&self.llm.temperature) {
            warnings.push(format!(
                "llm.temperature {} is outside the usual 0.0-2.0 range",
                self.llm.temperature
            ));
        }

        warnings
    }
}
