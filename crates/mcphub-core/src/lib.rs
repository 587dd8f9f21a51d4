//! mcphub Core Domain Types
//!
//! This crate contains pure domain types with no dependencies on:
//! - The filesystem
//! - Subprocesses
//! - Runtime specifics
//!
//! Entities and their status state machine live here, together with the
//! record types the job manager persists.

pub mod entity;
pub mod error;
pub mod ids;
pub mod job;
pub mod registry;
pub mod status;

// Re-export commonly used types
pub use entity::{CommandSpec, Entity, EntityKind, EntityRecord, Runtime};
pub use error::CoreError;
pub use ids::JobId;
pub use job::{JobCommand, JobRecord};
pub use registry::{EntityFilter, EntityList, Registry};
pub use status::{EntityEvent, EntityStatus, JobStatus};
