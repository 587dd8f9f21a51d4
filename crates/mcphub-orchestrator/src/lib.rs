//! mcphub orchestration facade.
//!
//! Ties the entity [`Registry`](mcphub_core::Registry), the cross-process
//! [`StatusCache`](mcphub_store::StatusCache) and the
//! [`JobManager`](mcphub_jobs::JobManager) together:
//!
//! - the catalog file is loaded into the registry
//! - entity status is probed from the host, through the cache
//! - install/register/unregister/uninstall run their command specs as jobs
//!   and only move the entity's state once the job succeeded

pub mod catalog;
pub mod config;
pub mod error;
pub mod facade;
pub mod probe;

pub use config::Config;
pub use error::OrchestratorError;
pub use facade::{InstallOptions, Operation, Orchestrator, StatusReport};
pub use probe::{StatusProbe, SystemProbe};
