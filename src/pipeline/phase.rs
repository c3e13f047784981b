use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// The seven stages every run goes through, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Strategize,
    Plan,
    CoreBuild,
    ModuleBuild,
    Integrate,
    Verify,
    Release,
}

impl Phase {
    pub const ALL: [Phase; 7] = [
        Phase::Strategize,
        Phase::Plan,
        Phase::CoreBuild,
        Phase::ModuleBuild,
        Phase::Integrate,
        Phase::Verify,
        Phase::Release,
    ];

    /// 1-based position in the pipeline.
    pub fn ordinal(&self) -> usize {
        *self as usize + 1
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Strategize => "strategize",
            Self::Plan => "plan",
            Self::CoreBuild => "core_build",
            Self::ModuleBuild => "module_build",
            Self::Integrate => "integrate",
            Self::Verify => "verify",
            Self::Release => "release",
        }
    }

    /// Deadline applied when no configuration overrides it. `Verify` applies
    /// it to each of its two sub-steps.
    pub fn default_timeout(&self) -> Duration {
        let secs = match self {
            Self::Strategize | Self::Plan | Self::Release => 300,
            Self::CoreBuild | Self::Verify => 600,
            Self::ModuleBuild | Self::Integrate => 400,
        };
        Duration::from_secs(secs)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Phase::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| format!("Invalid phase: {}", s))
    }
}

/// Time budget and failure policy for one phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseSettings {
    pub timeout: Duration,
    /// When false, a worker error (not a timeout or invalid output) fails the run.
    pub recoverable: bool,
}

/// Everything the orchestrator needs to know about pipeline shape, passed in
/// at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    settings: [PhaseSettings; 7],
    pub implementers: usize,
    pub integrators: usize,
}

impl PipelineConfig {
    pub const DEFAULT_IMPLEMENTERS: usize = 5;
    pub const DEFAULT_INTEGRATORS: usize = 2;
    /// Longest deadline a phase may be given (one week).
    pub const MAX_TIMEOUT: Duration = Duration::from_secs(7 * 24 * 60 * 60);

    pub fn settings(&self, phase: Phase) -> PhaseSettings {
        self.settings[phase as usize]
    }

    /// Timeouts above [`Self::MAX_TIMEOUT`] are clamped to it.
    pub fn with_timeout(mut self, phase: Phase, timeout: Duration) -> Self {
        self.settings[phase as usize].timeout = timeout.min(Self::MAX_TIMEOUT);
        self
    }

    pub fn with_recoverable(mut self, phase: Phase, recoverable: bool) -> Self {
        self.settings[phase as usize].recoverable = recoverable;
        self
    }

    /// Pool sizes are clamped to at least one worker.
    pub fn with_pool_sizes(mut self, implementers: usize, integrators: usize) -> Self {
        self.implementers = implementers.max(1);
        self.integrators = integrators.max(1);
        self
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            settings: Phase::ALL.map(|phase| PhaseSettings {
                timeout: phase.default_timeout(),
                recoverable: true,
            }),
            implementers: Self::DEFAULT_IMPLEMENTERS,
            integrators: Self::DEFAULT_INTEGRATORS,
        }
    }
}
