//! Entity types: one installable/registerable tool server or skill.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::CoreError;
use crate::job::JobCommand;
use crate::status::{EntityEvent, EntityStatus};

/// A declarative entity record as read from the catalog.
pub type EntityRecord = Map<String, Value>;

/// Category of an entity. Informational only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    #[serde(alias = "mcp", alias = "server")]
    Tool,
    Skill,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tool => f.write_str("tool"),
            Self::Skill => f.write_str("skill"),
        }
    }
}

/// How an entity is materialized and run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Runtime {
    /// Interpreter-based, installed into a local virtual environment.
    #[serde(
        alias = "local",
        alias = "python",
        alias = "node",
        alias = "uvx",
        alias = "npx",
        alias = "binary"
    )]
    LocalEnvironment,
    /// Built or pulled as a container image.
    #[serde(alias = "docker")]
    Container,
}

impl Runtime {
    /// Whether the entity runs directly on this host without a container runtime.
    pub fn is_local(&self) -> bool {
        matches!(self, Self::LocalEnvironment)
    }
}

impl fmt::Display for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LocalEnvironment => f.write_str("local"),
            Self::Container => f.write_str("container"),
        }
    }
}

/// Opaque command needed to materialize, register or remove an entity.
///
/// Either an argument vector (`[program, arg, ...]`) or a single command
/// line run through `sh -c`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommandSpec {
    Args(Vec<String>),
    Line(String),
}

impl CommandSpec {
    /// Convert to a runnable command, or `None` if the spec is empty.
    pub fn to_command(&self) -> Option<JobCommand> {
        match self {
            Self::Args(args) => {
                let (program, rest) = args.split_first()?;
                if program.trim().is_empty() {
                    return None;
                }
                Some(JobCommand::new(program.clone()).with_args(rest.iter().cloned()))
            }
            Self::Line(line) if line.trim().is_empty() => None,
            Self::Line(line) => Some(JobCommand::shell(line.clone())),
        }
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Args(args) => f.write_str(&args.join(" ")),
            Self::Line(line) => f.write_str(line),
        }
    }
}

/// One installable/registerable unit tracked by the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Unique entity name.
    pub name: String,

    /// Category (tool server or skill).
    pub kind: EntityKind,

    /// How the entity is installed and run.
    pub runtime: Runtime,

    /// Command that materializes the entity.
    pub install_spec: CommandSpec,

    /// Command that registers the entity with the host process.
    pub register_spec: CommandSpec,

    /// Command that removes the entity's local artifacts, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uninstall_spec: Option<CommandSpec>,

    /// Command that removes the host registration. Defaults to the host
    /// CLI's `mcp remove <clean name>`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unregister_spec: Option<CommandSpec>,

    /// Entities that must be installed before this one.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requires: Vec<String>,

    /// Entities uninstalled together with this one.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cleanup: Vec<String>,

    #[serde(default)]
    pub description: String,

    #[serde(default = "default_source")]
    pub source: String,

    /// Local installation directory (LocalEnvironment entities).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Image reference (Container entities).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Current lifecycle status, never read from records.
    #[serde(skip_deserializing, default)]
    pub status: EntityStatus,

    /// Unknown record fields, kept verbatim.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

fn default_source() -> String {
    "Community".to_string()
}

impl Entity {
    /// Create a new Entity with minimal required fields.
    pub fn new(
        name: impl Into<String>,
        kind: EntityKind,
        runtime: Runtime,
        install_spec: CommandSpec,
        register_spec: CommandSpec,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            runtime,
            install_spec,
            register_spec,
            uninstall_spec: None,
            unregister_spec: None,
            requires: Vec::new(),
            cleanup: Vec::new(),
            description: String::new(),
            source: default_source(),
            path: None,
            image: None,
            status: EntityStatus::NotInstalled,
            extra: BTreeMap::new(),
        }
    }

    /// Parse one declarative record.
    pub fn from_record(record: EntityRecord) -> Result<Self, CoreError> {
        let label = record
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or("<unnamed>")
            .to_string();

        let mut entity: Entity = serde_json::from_value(Value::Object(record))
            .map_err(|e| CoreError::Config(format!("record '{label}': {e}")))?;
        entity.extra.remove("status");

        if entity.name.trim().is_empty() {
            return Err(CoreError::Config("record has an empty name".to_string()));
        }
        Ok(entity)
    }

    /// Builder method to set description.
    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }

    /// Builder method to set the local installation path.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Builder method to set the container image.
    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    /// Builder method to set the uninstall command.
    pub fn with_uninstall_spec(mut self, spec: CommandSpec) -> Self {
        self.uninstall_spec = Some(spec);
        self
    }

    /// Builder method to set the unregister command.
    pub fn with_unregister_spec(mut self, spec: CommandSpec) -> Self {
        self.unregister_spec = Some(spec);
        self
    }

    /// Builder method to set required entities.
    pub fn with_requires<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.requires = names.into_iter().map(Into::into).collect();
        self
    }

    /// Builder method to set entities removed along with this one.
    pub fn with_cleanup<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cleanup = names.into_iter().map(Into::into).collect();
        self
    }

    /// Name as the host CLI knows it (`/` and `-` become `_`).
    pub fn clean_name(&self) -> String {
        self.name.replace(['/', '-'], "_")
    }

    /// Apply a lifecycle event to this entity's status.
    ///
    /// On error the status is left untouched.
    pub fn transition(&mut self, event: EntityEvent) -> Result<EntityStatus, CoreError> {
        let next = self
            .status
            .apply(event)
            .ok_or_else(|| CoreError::InvalidTransition {
                entity: self.name.clone(),
                from: self.status,
                event,
            })?;
        self.status = next;
        Ok(next)
    }
}
