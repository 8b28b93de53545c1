//! Engine error types

use thiserror::Error;

/// Errors raised while building or driving the engine
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("duplicate trigger id: {0}")]
    DuplicateTrigger(String),

    #[error("duplicate instruction id: {0}")]
    DuplicateInstruction(String),

    #[error("instruction {instruction_id} references unknown trigger {trigger_id}")]
    UnknownTrigger {
        instruction_id: String,
        trigger_id: String,
    },

    #[error("group {group_id} references unknown trigger {trigger_id}")]
    UnknownGroupChild { group_id: String, trigger_id: String },

    #[error("cyclic before/after links: {}", .0.join(" -> "))]
    CyclicInstructions(Vec<String>),

    #[error("instruction not found: {0}")]
    InstructionNotFound(String),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Event(#[from] tm_core::EventError),
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors raised while traversing an instruction chain
#[derive(Debug, Clone, Error)]
pub enum WalkError {
    /// The chain reaches an instruction already on the current path
    #[error("cycle at instruction {instruction_id}: {}", .path.join(" -> "))]
    Cycle {
        instruction_id: String,
        path: Vec<String>,
    },
}

impl From<WalkError> for EngineError {
    fn from(err: WalkError) -> Self {
        match err {
            WalkError::Cycle { path, .. } => EngineError::CyclicInstructions(path),
        }
    }
}
