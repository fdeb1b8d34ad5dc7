//! Error types for the AI query layer.
//!
//! Programming errors (failing predicates, stale collection handles) are typed
//! errors that abort the current decision cycle. Benign misses such as unknown
//! entity ids or destroying an unknown cache key are `Option`s and no-ops instead.

use thiserror::Error;

use crate::ai::collections::CollectionId;
use crate::ai::entity::EntityId;

/// A predicate could not evaluate an entity.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct FilterError {
    pub reason: String,
}

impl FilterError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollectionError {
    #[error("collection {0} was destroyed")]
    Destroyed(CollectionId),
    #[error("filter `{filter}` failed on entity {entity}: {source}")]
    Predicate {
        filter: String,
        entity: EntityId,
        #[source]
        source: FilterError,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("entity {0} not found")]
    NotFound(EntityId),
    #[error("entity id {0} is already in use")]
    DuplicateId(EntityId),
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("manifest io failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("manifest encoding failed: {0}")]
    Encoding(#[from] bincode::Error),
    #[error("unsupported manifest version {found} (expected {expected})")]
    Version { found: u32, expected: u32 },
}

/// Umbrella error returned by decision agents and the driver.
#[derive(Debug, Error)]
pub enum AiError {
    #[error(transparent)]
    Collection(#[from] CollectionError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}
