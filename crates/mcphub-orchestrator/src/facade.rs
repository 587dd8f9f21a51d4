//! The orchestration facade.

use std::fmt;

use serde::Serialize;
use tracing::{debug, info, warn};

use mcphub_core::{
    CommandSpec, CoreError, Entity, EntityEvent, EntityFilter, EntityKind, EntityList,
    EntityStatus, JobStatus, Registry, Runtime,
};
use mcphub_jobs::JobManager;
use mcphub_store::StatusCache;

use crate::catalog;
use crate::config::Config;
use crate::error::OrchestratorError;
use crate::probe::{StatusProbe, SystemProbe};

/// Entity operations that run a command spec as a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Install,
    Register,
    Unregister,
    Uninstall,
}

impl Operation {
    /// The entity event applied once the operation succeeded.
    pub fn event(self) -> EntityEvent {
        match self {
            Self::Install => EntityEvent::Installed,
            Self::Register => EntityEvent::Registered,
            Self::Unregister => EntityEvent::Unregistered,
            Self::Uninstall => EntityEvent::Uninstalled,
        }
    }

    /// The command this operation runs for `entity`. Unregistering falls
    /// back to `<host_cli> mcp remove <clean name>`.
    pub fn spec(self, entity: &Entity, host_cli: &str) -> Option<CommandSpec> {
        match self {
            Self::Install => Some(entity.install_spec.clone()),
            Self::Register => Some(entity.register_spec.clone()),
            Self::Unregister => Some(entity.unregister_spec.clone().unwrap_or_else(|| {
                CommandSpec::Args(vec![
                    host_cli.to_string(),
                    "mcp".to_string(),
                    "remove".to_string(),
                    entity.clean_name(),
                ])
            })),
            Self::Uninstall => entity.uninstall_spec.clone(),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Install => f.write_str("install"),
            Self::Register => f.write_str("register"),
            Self::Unregister => f.write_str("unregister"),
            Self::Uninstall => f.write_str("uninstall"),
        }
    }
}

/// How `Orchestrator::install` treats an entity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InstallOptions {
    /// Register with the host after installing.
    pub register: bool,
    /// Run the install command even if the entity is already installed.
    pub force: bool,
}

impl InstallOptions {
    pub fn with_register(mut self, register: bool) -> Self {
        self.register = register;
        self
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }
}

/// Observed status of one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub name: String,
    pub kind: EntityKind,
    pub runtime: Runtime,
    pub status: EntityStatus,
}

/// Entry point for entity and job operations.
pub struct Orchestrator<P = SystemProbe> {
    config: Config,
    registry: Registry,
    cache: StatusCache,
    jobs: JobManager,
    probe: P,
}

impl Orchestrator<SystemProbe> {
    /// Open the orchestrator described by `config`, probing the real host.
    pub fn open(config: Config) -> Result<Self, OrchestratorError> {
        let probe = SystemProbe::from_config(&config);
        Self::with_probe(config, probe)
    }
}

impl<P: StatusProbe> Orchestrator<P> {
    /// Open with a custom status probe. Loads the catalog.
    pub fn with_probe(config: Config, probe: P) -> Result<Self, OrchestratorError> {
        let orchestrator = Self {
            registry: Registry::new(),
            cache: config.status_cache(),
            jobs: JobManager::new(config.job_manager_config()),
            probe,
            config,
        };
        orchestrator.reload()?;
        Ok(orchestrator)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn cache(&self) -> &StatusCache {
        &self.cache
    }

    pub fn jobs(&self) -> &JobManager {
        &self.jobs
    }

    /// Re-read the catalog, replacing every entity.
    pub fn reload(&self) -> Result<usize, OrchestratorError> {
        let records = catalog::load_records(&self.config.catalog_path)?;
        let count = self.registry.load(records)?;
        info!(count, catalog = %self.config.catalog_path.display(), "Registry loaded");
        Ok(count)
    }

    pub fn list(&self, filter: EntityFilter) -> EntityList {
        self.registry.list(filter)
    }

    pub fn search(&self, query: &str) -> EntityList {
        self.registry.search(query)
    }

    /// The entity with its status brought in line with the host.
    pub fn info(&self, name: &str) -> Result<Entity, OrchestratorError> {
        self.hydrate(name)?;
        Ok(self.registry.find(name)?)
    }

    /// Observed status of every entity. `refresh` drops all cached statuses first.
    pub fn status(&self, refresh: bool) -> Result<Vec<StatusReport>, OrchestratorError> {
        if refresh {
            if let Err(e) = self.cache.invalidate_all() {
                warn!(error = %e, "Could not clear status cache");
            }
        }

        self.registry
            .list(EntityFilter::default())
            .iter()
            .map(|entity| {
                let status = self.hydrate_entity(entity)?;
                Ok(StatusReport {
                    name: entity.name.clone(),
                    kind: entity.kind,
                    runtime: entity.runtime,
                    status,
                })
            })
            .collect()
    }

    /// Install an entity after everything it requires.
    ///
    /// Requirements are installed and registered first, without `force`.
    /// The first failure stops the chain.
    pub async fn install(&self, name: &str, options: InstallOptions) -> Result<EntityStatus, OrchestratorError> {
        let order = self.install_order(name)?;
        for required in order.iter().filter(|n| n.as_str() != name) {
            info!(entity = %name, requires = %required, "Installing requirement");
            self.install_one(required, InstallOptions::default().with_register(true))
                .await?;
        }
        self.install_one(name, options).await
    }

    /// Register an installed entity with the host.
    pub async fn register(&self, name: &str) -> Result<EntityStatus, OrchestratorError> {
        self.hydrate(name)?;
        self.register_installed(name).await
    }

    /// Remove an entity's host registration, keeping its installation.
    pub async fn unregister(&self, name: &str) -> Result<EntityStatus, OrchestratorError> {
        let observed = self.hydrate(name)?;
        let entity = self.registry.find(name)?;
        if !observed.is_registered() {
            info!(entity = %name, "Not registered");
            return Ok(entity.status);
        }
        self.remove_registration(&entity).await
    }

    /// Remove an entity, then the entities listed in its `cleanup`.
    ///
    /// A registered entity is unregistered first. Succeeds without running
    /// anything if the entity is neither installed nor registered. Cleanup
    /// failures are logged and skipped.
    pub async fn uninstall(&self, name: &str) -> Result<EntityStatus, OrchestratorError> {
        let status = self.uninstall_one(name).await?;

        let entity = self.registry.find(name)?;
        for other in entity.cleanup.iter().filter(|n| n.as_str() != name) {
            if let Err(e) = self.uninstall_one(other).await {
                warn!(entity = %name, cleanup = %other, error = %e, "Cleanup failed");
            }
        }
        Ok(status)
    }

    async fn install_one(&self, name: &str, options: InstallOptions) -> Result<EntityStatus, OrchestratorError> {
        let observed = self.hydrate(name)?;
        let entity = self.registry.find(name)?;

        if observed.is_installed() && !options.force {
            info!(entity = %name, "Already installed");
        } else {
            self.run_operation(&entity, Operation::Install).await?;
            self.registry.transition(name, EntityEvent::Installed)?;
            self.invalidate(name);
        }

        if options.register {
            return self.register_installed(name).await;
        }
        Ok(self.registry.find(name)?.status)
    }

    async fn uninstall_one(&self, name: &str) -> Result<EntityStatus, OrchestratorError> {
        let observed = self.hydrate(name)?;
        let entity = self.registry.find(name)?;

        if observed == EntityStatus::NotInstalled {
            debug!(entity = %name, "Not installed, nothing to remove");
            return Ok(self.registry.transition(name, EntityEvent::Uninstalled)?);
        }

        if observed.is_registered() {
            self.remove_registration(&entity).await?;
        }
        if observed.is_installed() && entity.uninstall_spec.is_some() {
            self.run_operation(&entity, Operation::Uninstall).await?;
        }
        let status = self.registry.transition(name, EntityEvent::Uninstalled)?;
        self.invalidate(name);
        info!(entity = %name, "Uninstalled");
        Ok(status)
    }

    async fn remove_registration(&self, entity: &Entity) -> Result<EntityStatus, OrchestratorError> {
        self.run_operation(entity, Operation::Unregister).await?;
        let status = self.registry.transition(&entity.name, EntityEvent::Unregistered)?;
        self.invalidate(&entity.name);
        Ok(status)
    }

    /// `name` preceded by its requirements, dependencies first.
    fn install_order(&self, name: &str) -> Result<Vec<String>, OrchestratorError> {
        let mut order = Vec::new();
        let mut path = Vec::new();
        self.visit_requirements(name, &mut path, &mut order)?;
        Ok(order)
    }

    fn visit_requirements(
        &self,
        name: &str,
        path: &mut Vec<String>,
        order: &mut Vec<String>,
    ) -> Result<(), OrchestratorError> {
        if order.iter().any(|n| n == name) {
            return Ok(());
        }
        if path.iter().any(|n| n == name) {
            path.push(name.to_string());
            return Err(OrchestratorError::DependencyCycle {
                chain: path.join(" -> "),
            });
        }

        let entity = self.registry.find(name)?;
        path.push(entity.name.clone());
        for required in &entity.requires {
            self.visit_requirements(required, path, order)?;
        }
        path.pop();
        order.push(entity.name);
        Ok(())
    }

    async fn register_installed(&self, name: &str) -> Result<EntityStatus, OrchestratorError> {
        let entity = self.registry.find(name)?;
        if entity.status.apply(EntityEvent::Registered).is_none() {
            return Err(CoreError::InvalidTransition {
                entity: entity.name,
                from: entity.status,
                event: EntityEvent::Registered,
            }
            .into());
        }
        if entity.status.is_registered() {
            info!(entity = %name, "Already registered");
            return Ok(entity.status);
        }

        self.run_operation(&entity, Operation::Register).await?;
        let status = self.registry.transition(name, EntityEvent::Registered)?;
        self.invalidate(name);
        Ok(status)
    }

    /// Run one operation's command as a job and wait for it.
    async fn run_operation(&self, entity: &Entity, operation: Operation) -> Result<(), OrchestratorError> {
        let missing = || OrchestratorError::MissingSpec {
            entity: entity.name.clone(),
            operation,
        };
        let command = operation
            .spec(entity, &self.config.host_cli)
            .ok_or_else(missing)?
            .to_command()
            .ok_or_else(missing)?;

        std::fs::create_dir_all(&self.config.home).map_err(|source| OrchestratorError::Io {
            path: self.config.home.clone(),
            source,
        })?;

        let receipt = self.jobs.submit(
            command,
            &self.config.home,
            Some(format!("{}-{}", operation, entity.name)),
        )?;
        info!(
            entity = %entity.name,
            operation = %operation,
            job_id = %receipt.job_id,
            "Operation started"
        );

        let record = self
            .jobs
            .wait(&receipt.job_id, self.config.operation_timeout)
            .await?;
        if record.status != JobStatus::Completed {
            warn!(
                entity = %entity.name,
                operation = %operation,
                job_id = %record.job_id,
                status = %record.status,
                "Operation failed"
            );
            return Err(OrchestratorError::OperationFailed {
                entity: entity.name.clone(),
                operation,
                job_id: record.job_id,
                status: record.status,
                error: record.error,
            });
        }
        Ok(())
    }

    /// Bring the named entity's in-memory status in line with the observed one.
    fn hydrate(&self, name: &str) -> Result<EntityStatus, OrchestratorError> {
        let entity = self.registry.find(name)?;
        self.hydrate_entity(&entity)
    }

    /// Observe `entity` (through the cache) and replay the result into the
    /// registry. Returns the observed status.
    fn hydrate_entity(&self, entity: &Entity) -> Result<EntityStatus, OrchestratorError> {
        let observed = self
            .cache
            .get(&entity.name, || self.probe.probe(entity))?;
        if observed == entity.status {
            return Ok(observed);
        }

        if observed == EntityStatus::Registered {
            // No transition path reaches REGISTERED without installing.
            warn!(
                entity = %entity.name,
                current = %entity.status,
                "Registered without local installation"
            );
            return Ok(observed);
        }

        self.registry.transition(&entity.name, EntityEvent::Uninstalled)?;
        for event in observed.replay_events() {
            self.registry.transition(&entity.name, *event)?;
        }
        debug!(entity = %entity.name, from = %entity.status, to = %observed, "Status hydrated");
        Ok(observed)
    }

    fn invalidate(&self, name: &str) {
        if let Err(e) = self.cache.invalidate(name) {
            warn!(entity = %name, error = %e, "Could not invalidate cached status");
        }
    }
}
