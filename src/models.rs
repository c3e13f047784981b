use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProjectCategory {
    WebApp,
    AiMl,
    FullStack,
    DataAnalysis,
}

impl ProjectCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WebApp => "web_app",
            Self::AiMl => "ai_ml",
            Self::FullStack => "full_stack",
            Self::DataAnalysis => "data_analysis",
        }
    }

    /// Human-readable name used in prompts and fallback documents.
    pub fn label(&self) -> &'static str {
        match self {
            Self::WebApp => "web application",
            Self::AiMl => "AI/ML application",
            Self::FullStack => "full-stack application",
            Self::DataAnalysis => "data analysis project",
        }
    }
}

impl FromStr for ProjectCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "web_app" => Ok(Self::WebApp),
            "ai_ml" => Ok(Self::AiMl),
            "full_stack" => Ok(Self::FullStack),
            "data_analysis" => Ok(Self::DataAnalysis),
            _ => Err(format!("Invalid project category: {}", s)),
        }
    }
}

/// A request to build one project.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProjectRequest {
    pub title: String,
    pub description: String,
    pub category: ProjectCategory,
    #[serde(default)]
    pub requirements: Vec<String>,
}

impl ProjectRequest {
    pub fn new(title: impl Into<String>, description: impl Into<String>, category: ProjectCategory) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            category,
            requirements: Vec::new(),
        }
    }

    pub fn with_requirements(mut self, requirements: Vec<String>) -> Self {
        self.requirements = requirements;
        self
    }

    /// Check the request is fit to start a run.
    pub fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("title must not be empty".to_string());
        }
        if self.description.trim().is_empty() {
            return Err("description must not be empty".to_string());
        }
        if self.requirements.iter().any(|r| r.trim().is_empty()) {
            return Err("requirements must not contain empty entries".to_string());
        }
        Ok(())
    }
}

/// Opaque run identifier. Generated at submission and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RunId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| format!("Invalid run id '{}': {}", s, e))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Succeeded,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(Self::Running),
            "succeeded" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid run status: {}", s)),
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Location and integrity data for a packaged run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArchiveInfo {
    pub path: PathBuf,
    pub sha256: String,
    pub file_count: usize,
    pub size_bytes: u64,
}

/// One pipeline execution.
///
/// Transitions are one-way: once `status` is terminal every mutator is a
/// no-op and returns `false`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Run {
    pub id: RunId,
    /// 1-based ordinal of the phase being executed; 0 before the first phase starts.
    pub current_phase: usize,
    pub phase_name: Option<String>,
    pub status: RunStatus,
    pub message: Option<String>,
    pub archive: Option<ArchiveInfo>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Run {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: RunId::new(),
            current_phase: 0,
            phase_name: None,
            status: RunStatus::Running,
            message: None,
            archive: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn enter_phase(&mut self, ordinal: usize, name: &str) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.current_phase = ordinal;
        self.phase_name = Some(name.to_string());
        self.touch();
        true
    }

    pub fn succeed(&mut self, archive: ArchiveInfo) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.status = RunStatus::Succeeded;
        self.message = Some("Project generated successfully".to_string());
        self.archive = Some(archive);
        self.touch();
        true
    }

    pub fn fail(&mut self, message: impl Into<String>) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.status = RunStatus::Failed;
        self.message = Some(message.into());
        self.touch();
        true
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            id: self.id,
            status: self.status,
            created_at: self.created_at,
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

impl Default for Run {
    fn default() -> Self {
        Self::new()
    }
}

/// Listing entry for a known run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunSummary {
    pub id: RunId,
    pub status: RunStatus,
    pub created_at: DateTime<Utc>,
}
