//! Core engine: the per-account analyze → persist → execute → stake cycle.

pub mod gate;
pub mod orchestrator;
pub mod report;

pub use orchestrator::{EngineConfig, Orchestrator};
pub use report::{CycleReport, StageStatus};
