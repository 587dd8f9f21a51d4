//! Status enums for Entities and Jobs.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// Installation/registration status of an Entity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityStatus {
    /// Nothing materialized on this host.
    #[default]
    NotInstalled,
    /// Materialized (environment built / image present) but not registered.
    Installed,
    /// Known to the host process without local installation evidence.
    ///
    /// Only ever observed by a probe; `apply` never produces it.
    Registered,
    /// Installed and registered.
    Both,
}

/// Lifecycle events that drive `EntityStatus` transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityEvent {
    Installed,
    Registered,
    Unregistered,
    Uninstalled,
}

impl EntityStatus {
    /// Returns true if the entity counts as installed.
    pub fn is_installed(&self) -> bool {
        matches!(self, Self::Installed | Self::Both)
    }

    /// Returns true if the entity is registered with the host.
    pub fn is_registered(&self) -> bool {
        matches!(self, Self::Registered | Self::Both)
    }

    /// Combine two probe observations into a status.
    pub fn from_observation(installed: bool, registered: bool) -> Self {
        match (installed, registered) {
            (true, true) => Self::Both,
            (true, false) => Self::Installed,
            (false, true) => Self::Registered,
            (false, false) => Self::NotInstalled,
        }
    }

    /// Apply a lifecycle event.
    ///
    /// Uninstall always resets fully and is a no-op on an entity that is not
    /// installed. Registration requires installation. Unregistering keeps the
    /// installation. Repeating an event on an entity already in that state
    /// is a no-op.
    pub fn apply(self, event: EntityEvent) -> Option<Self> {
        match (self, event) {
            (Self::NotInstalled, EntityEvent::Installed) => Some(Self::Installed),
            (Self::Installed, EntityEvent::Installed) => Some(Self::Installed),
            (Self::Registered, EntityEvent::Installed) => Some(Self::Both),
            (Self::Both, EntityEvent::Installed) => Some(Self::Both),

            (Self::Installed, EntityEvent::Registered) => Some(Self::Both),
            (Self::Both, EntityEvent::Registered) => Some(Self::Both),
            (Self::NotInstalled | Self::Registered, EntityEvent::Registered) => None,

            (Self::Both | Self::Installed, EntityEvent::Unregistered) => Some(Self::Installed),
            (Self::Registered | Self::NotInstalled, EntityEvent::Unregistered) => {
                Some(Self::NotInstalled)
            }

            (_, EntityEvent::Uninstalled) => Some(Self::NotInstalled),
        }
    }

    /// Events that bring a fresh `NotInstalled` entity to this status.
    ///
    /// `Registered` has no such path and yields an empty replay.
    pub fn replay_events(&self) -> &'static [EntityEvent] {
        match self {
            Self::NotInstalled | Self::Registered => &[],
            Self::Installed => &[EntityEvent::Installed],
            Self::Both => &[EntityEvent::Installed, EntityEvent::Registered],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotInstalled => "NOT_INSTALLED",
            Self::Installed => "INSTALLED",
            Self::Registered => "REGISTERED",
            Self::Both => "BOTH",
        }
    }
}

impl fmt::Display for EntityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for EntityEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Installed => "Installed",
            Self::Registered => "Registered",
            Self::Unregistered => "Unregistered",
            Self::Uninstalled => "Uninstalled",
        };
        f.write_str(s)
    }
}

/// Status of a Job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    /// Job persisted but not yet picked up by a worker.
    #[default]
    Pending,
    /// Subprocess started.
    Running,
    /// Subprocess exited with status 0.
    Completed,
    /// Subprocess exited non-zero or could not be spawned.
    Failed,
    /// Job was cancelled before finishing.
    Cancelled,
}

impl JobStatus {
    /// Returns true if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Returns true if the job is still active (not terminal).
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Whether the job state machine allows `self -> next`.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running)
                | (Self::Pending, Self::Failed)
                | (Self::Pending, Self::Cancelled)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Failed)
                | (Self::Running, Self::Cancelled)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(Self::Pending),
            "RUNNING" => Ok(Self::Running),
            "COMPLETED" => Ok(Self::Completed),
            "FAILED" => Ok(Self::Failed),
            "CANCELLED" | "CANCELED" => Ok(Self::Cancelled),
            other => Err(CoreError::Config(format!("unknown job status '{other}'"))),
        }
    }
}
