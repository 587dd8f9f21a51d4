//! Status probing against the host.

use std::path::PathBuf;
use std::process::{Command, Stdio};

use tracing::debug;

use mcphub_core::{Entity, EntityStatus, Runtime};

use crate::config::Config;
use crate::error::OrchestratorError;

/// Observes the real installation/registration status of an entity.
///
/// Probes may be slow; the facade only calls them on a status cache miss.
pub trait StatusProbe: Send + Sync {
    fn probe(&self, entity: &Entity) -> Result<EntityStatus, OrchestratorError>;
}

/// Probes the local machine.
///
/// - installed: the entity's `path` exists (local entities) or
///   `<container-runtime> image inspect <image>` succeeds (container entities)
/// - registered: `<host-cli> mcp list` mentions the entity's clean name
///
/// A missing host CLI or container runtime counts as "not", not as an error.
#[derive(Debug, Clone)]
pub struct SystemProbe {
    host_cli: String,
    container_runtime: String,
    base_dir: PathBuf,
}

impl SystemProbe {
    pub fn new(
        host_cli: impl Into<String>,
        container_runtime: impl Into<String>,
        base_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            host_cli: host_cli.into(),
            container_runtime: container_runtime.into(),
            base_dir: base_dir.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.host_cli, &config.container_runtime, &config.home)
    }

    pub fn is_installed(&self, entity: &Entity) -> bool {
        match entity.runtime {
            Runtime::LocalEnvironment => entity
                .path
                .as_ref()
                .map(|p| {
                    let path = PathBuf::from(p);
                    if path.is_absolute() {
                        path
                    } else {
                        self.base_dir.join(path)
                    }
                })
                .is_some_and(|p| p.exists()),
            Runtime::Container => entity.image.as_deref().is_some_and(|image| {
                run_quiet(&self.container_runtime, &["image", "inspect", image])
            }),
        }
    }

    pub fn is_registered(&self, entity: &Entity) -> bool {
        let output = Command::new(&self.host_cli)
            .args(["mcp", "list"])
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output();
        match output {
            Ok(output) => String::from_utf8_lossy(&output.stdout).contains(&entity.clean_name()),
            Err(e) => {
                debug!(cli = %self.host_cli, error = %e, "Host CLI unavailable");
                false
            }
        }
    }
}

impl StatusProbe for SystemProbe {
    fn probe(&self, entity: &Entity) -> Result<EntityStatus, OrchestratorError> {
        let installed = self.is_installed(entity);
        let registered = self.is_registered(entity);
        let status = EntityStatus::from_observation(installed, registered);
        debug!(entity = %entity.name, status = %status, "Probed status");
        Ok(status)
    }
}

fn run_quiet(program: &str, args: &[&str]) -> bool {
    match Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
    {
        Ok(status) => status.success(),
        Err(e) => {
            debug!(program = %program, error = %e, "Probe command unavailable");
            false
        }
    }
}
