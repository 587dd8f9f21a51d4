//! Core domain errors.

use thiserror::Error;

use crate::status::{EntityEvent, EntityStatus, JobStatus};

/// Core domain errors for mcphub.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A declarative entity record was malformed or duplicated.
    #[error("Invalid entity record: {0}")]
    Config(String),

    /// Entity not found in the registry.
    #[error("Entity not found: {0}")]
    EntityNotFound(String),

    /// Entity state change not allowed by the lifecycle.
    #[error("Invalid transition for '{entity}': {from} --{event}-->")]
    InvalidTransition {
        entity: String,
        from: EntityStatus,
        event: EntityEvent,
    },

    /// Job state change out of a terminal (or otherwise illegal) state.
    #[error("Invalid job state transition: {from} -> {to}")]
    InvalidJobTransition { from: JobStatus, to: JobStatus },
}

impl CoreError {
    /// Short, stable tag for the error category.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::EntityNotFound(_) => "not_found",
            Self::InvalidTransition { .. } | Self::InvalidJobTransition { .. } => {
                "invalid_transition"
            }
        }
    }
}
