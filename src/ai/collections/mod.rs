//! Live entity collections for decision agents.
//!
//! A decision module asks the same questions every cycle ("own idle workers",
//! "enemy structures"). Collections answer them from a member list that the
//! propagator keeps current from entity events, so only the first query scans
//! the registry.
//!
//! # Example: Quick Start
//!
//! ```rust
//! use peregrine_ai::ai::collections::{CollectionCache, CollectionSource};
//! use peregrine_ai::ai::entity::{EntityId, PlayerId};
//! use peregrine_ai::ai::filter::builtin;
//! use peregrine_ai::ai::registry::{EntityArena, EntityRecord};
//!
//! let mut arena = EntityArena::new();
//! arena.spawn(EntityRecord::new(EntityId(1), PlayerId(1), "units/worker").with_classes(&["Worker"])).unwrap();
//!
//! let mut cache = CollectionCache::default();
//! let workers = cache
//!     .get_or_create(&arena, "player-1-workers", builtin::by_class("Worker"), CollectionSource::Registry)
//!     .unwrap();
//! assert_eq!(cache.get(workers).unwrap().len(), 1);
//! ```

pub mod cache;
pub mod collection;
pub mod members;
pub mod store;

#[cfg(test)]
mod tests;

pub use cache::{CacheTag, CollectionCache, RestoreReport};
pub use collection::{Collection, CollectionId, FilterChain, MembershipChange};
pub use members::{MemberSet, MemberSetStats, SweepConfig};
pub use store::{CollectionSource, CollectionStats, CollectionStore, StoreConfig};
