//! In-memory entity registry.
//!
//! The registry holds one immutable snapshot of entities behind a lock.
//! `load` swaps in a whole new snapshot, transitions copy-on-write, and
//! listings keep the snapshot they were created from.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::entity::{Entity, EntityKind, EntityRecord, Runtime};
use crate::error::CoreError;
use crate::status::{EntityEvent, EntityStatus};

type Snapshot = Arc<BTreeMap<String, Entity>>;

/// Collection of entities keyed by name.
#[derive(Debug, Default)]
pub struct Registry {
    entities: RwLock<Snapshot>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry from declarative records.
    pub fn from_records<I>(records: I) -> Result<Self, CoreError>
    where
        I: IntoIterator<Item = EntityRecord>,
    {
        let registry = Self::new();
        registry.load(records)?;
        Ok(registry)
    }

    /// Replace the whole entity set with the parsed records.
    ///
    /// Nothing changes unless every record parses and names are unique.
    pub fn load<I>(&self, records: I) -> Result<usize, CoreError>
    where
        I: IntoIterator<Item = EntityRecord>,
    {
        let mut parsed = BTreeMap::new();
        for record in records {
            let entity = Entity::from_record(record)?;
            if parsed.contains_key(&entity.name) {
                return Err(CoreError::Config(format!(
                    "duplicate entity name '{}'",
                    entity.name
                )));
            }
            parsed.insert(entity.name.clone(), entity);
        }

        let count = parsed.len();
        *self.entities.write() = Arc::new(parsed);
        Ok(count)
    }

    /// Look up an entity by name.
    pub fn find(&self, name: &str) -> Result<Entity, CoreError> {
        self.entities
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| CoreError::EntityNotFound(name.to_string()))
    }

    /// Entities matching `filter` in the current snapshot.
    pub fn list(&self, filter: EntityFilter) -> EntityList {
        EntityList {
            snapshot: self.entities.read().clone(),
            filter,
        }
    }

    /// Case-insensitive search over name, description and source.
    pub fn search(&self, query: &str) -> EntityList {
        self.list(EntityFilter::default().with_query(query))
    }

    /// Apply a lifecycle event to the named entity.
    pub fn transition(&self, name: &str, event: EntityEvent) -> Result<EntityStatus, CoreError> {
        let mut guard = self.entities.write();
        let entity = Arc::make_mut(&mut guard)
            .get_mut(name)
            .ok_or_else(|| CoreError::EntityNotFound(name.to_string()))?;
        entity.transition(event)
    }

    pub fn len(&self) -> usize {
        self.entities.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.read().is_empty()
    }
}

/// Optional predicates for `Registry::list`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityFilter {
    pub kind: Option<EntityKind>,
    pub runtime: Option<Runtime>,
    pub source: Option<String>,
    pub query: Option<String>,
}

impl EntityFilter {
    /// Builder method to restrict to one kind.
    pub fn with_kind(mut self, kind: EntityKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Builder method to restrict to one runtime.
    pub fn with_runtime(mut self, runtime: Runtime) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Builder method to restrict to one source.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Builder method to add a free-text query.
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into().to_lowercase());
        self
    }

    /// Only entities that run without a container runtime.
    pub fn local_only() -> Self {
        Self::default().with_runtime(Runtime::LocalEnvironment)
    }

    pub fn matches(&self, entity: &Entity) -> bool {
        if self.kind.is_some_and(|k| k != entity.kind) {
            return false;
        }
        if self.runtime.is_some_and(|r| r != entity.runtime) {
            return false;
        }
        if let Some(source) = &self.source {
            if !entity.source.eq_ignore_ascii_case(source) {
                return false;
            }
        }
        if let Some(query) = &self.query {
            let query = query.to_lowercase();
            return entity.name.to_lowercase().contains(&query)
                || entity.description.to_lowercase().contains(&query)
                || entity.source.to_lowercase().contains(&query);
        }
        true
    }
}

/// A filtered view over one registry snapshot.
///
/// Iterating again re-applies the filter to the same snapshot.
#[derive(Debug, Clone)]
pub struct EntityList {
    snapshot: Snapshot,
    filter: EntityFilter,
}

impl EntityList {
    pub fn iter(&self) -> impl Iterator<Item = &Entity> + '_ {
        self.snapshot.values().filter(|e| self.filter.matches(e))
    }
}

impl<'a> IntoIterator for &'a EntityList {
    type Item = &'a Entity;
    type IntoIter = Box<dyn Iterator<Item = &'a Entity> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}
