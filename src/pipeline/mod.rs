//! The orchestration engine: phase sequencing, the timeout/fallback
//! protocol, fan-out/fan-in merge, and per-phase persistence.

pub mod events;
pub mod executor;
pub mod layout;
mod orchestrator;
mod phase;

pub use events::PipelineEvent;
pub use executor::{FallbackCause, StepOutcome, WorkUnit, WorkerOutcome, WorkerResult, run_step};
pub use layout::{Fanout, PhaseLayout, Step, partition_round_robin};
pub use orchestrator::PipelineOrchestrator;
pub use phase::{Phase, PhaseSettings, PipelineConfig};
