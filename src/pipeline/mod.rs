//! Pipeline orchestration: one state machine per question, batched
//! concurrently under a fixed limit.

pub mod batch;
pub mod config;
pub mod orchestrator;
pub mod types;

pub use batch::{BatchCoordinator, BatchStats, QuestionResult};
pub use config::{ConfigError, PipelineConfig};
pub use orchestrator::PipelineOrchestrator;
pub use types::{
    DiagramRequest, OutcomeStatus, PipelineOutcome, RenderResult, MAX_ATTEMPTS,
};
