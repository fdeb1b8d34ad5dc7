//! Collection Store: arena of live collections addressed by generational ids.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::ai::entity::EntityId;
use crate::ai::error::CollectionError;
use crate::ai::filter::Filter;
use crate::ai::registry::EntityRegistry;

use super::collection::{Collection, CollectionId, FilterChain, MembershipChange};
use super::members::SweepConfig;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    pub sweep: SweepConfig,
    /// Skip re-tests for property notifications a collection's filters do not read.
    pub selective_invalidation: bool,
}

/// Where a new collection draws its candidates from.
#[derive(Debug, Clone, Copy)]
pub enum CollectionSource<'a> {
    /// Full registry scan.
    Registry,
    /// Members of a live collection; the result remembers it as parent.
    Live(CollectionId),
    /// Members of an unregistered collection.
    Snapshot(&'a Collection),
}

/// Running totals since the store was created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CollectionStats {
    pub full_scans: u64,
    pub derived_scans: u64,
    pub retests: u64,
    pub skipped_retests: u64,
    pub insertions: u64,
    pub removals: u64,
    pub renames: u64,
}

impl CollectionStats {
    pub(crate) fn record(&mut self, change: MembershipChange) {
        match change {
            MembershipChange::Added => self.insertions += 1,
            MembershipChange::Removed => self.removals += 1,
            MembershipChange::Unchanged => {}
        }
    }
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    collection: Option<Collection>,
}

#[derive(Debug, Default)]
pub struct CollectionStore {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
    config: StoreConfig,
    pub(crate) stats: CollectionStats,
}

impl CollectionStore {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    pub fn config(&self) -> StoreConfig {
        self.config
    }

    /// Build an unregistered collection of `source` members passing `filter`.
    pub fn build(
        &mut self,
        registry: &dyn EntityRegistry,
        source: CollectionSource<'_>,
        filter: Filter,
    ) -> Result<Collection, CollectionError> {
        match source {
            CollectionSource::Registry => {
                self.stats.full_scans += 1;
                Collection::scan(registry, filter, self.config.sweep)
            }
            CollectionSource::Live(parent) => {
                let mut derived = self.get(parent)?.filter(registry, filter)?;
                derived.parent = Some(parent);
                self.stats.derived_scans += 1;
                Ok(derived)
            }
            CollectionSource::Snapshot(base) => {
                self.stats.derived_scans += 1;
                base.filter(registry, filter)
            }
        }
    }

    /// Full scan against an existing filter chain (used when restoring a cache).
    pub(crate) fn build_chain(
        &mut self,
        registry: &dyn EntityRegistry,
        filters: FilterChain,
    ) -> Result<Collection, CollectionError> {
        self.stats.full_scans += 1;
        Collection::scan_chain(registry, filters, self.config.sweep)
    }

    /// Hand `collection` to the store; from now on every batch maintains it.
    pub fn register(&mut self, mut collection: Collection) -> CollectionId {
        collection.live = true;
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.collection = Some(collection);
            return CollectionId {
                index,
                generation: slot.generation,
            };
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            collection: Some(collection),
        });
        CollectionId { index, generation: 0 }
    }

    /// Confirm `id` is registered. Registering twice changes nothing.
    pub fn register_updates(&mut self, id: CollectionId) -> Result<(), CollectionError> {
        self.get(id).map(|_| ())
    }

    pub fn get(&self, id: CollectionId) -> Result<&Collection, CollectionError> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.collection.as_ref())
            .ok_or(CollectionError::Destroyed(id))
    }

    pub fn get_mut(&mut self, id: CollectionId) -> Result<&mut Collection, CollectionError> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.collection.as_mut())
            .ok_or(CollectionError::Destroyed(id))
    }

    pub fn contains(&self, id: CollectionId) -> bool {
        self.get(id).is_ok()
    }

    /// Stop maintaining `id` and return its final state. Stale ids return `None`.
    pub fn destroy(&mut self, id: CollectionId) -> Option<Collection> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        let mut collection = slot.collection.take()?;
        collection.live = false;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.live -= 1;
        Some(collection)
    }

    pub fn live_count(&self) -> usize {
        self.live
    }

    pub fn stats(&self) -> CollectionStats {
        self.stats
    }

    pub(crate) fn live_mut(&mut self) -> impl Iterator<Item = &mut Collection> {
        self.slots.iter_mut().filter_map(|slot| slot.collection.as_mut())
    }

    pub(crate) fn live_entries_mut(&mut self) -> impl Iterator<Item = (CollectionId, &mut Collection)> {
        self.slots.iter_mut().enumerate().filter_map(|(index, slot)| {
            let id = CollectionId {
                index: index as u32,
                generation: slot.generation,
            };
            slot.collection.as_mut().map(|collection| (id, collection))
        })
    }

    /// Destroy collections whose predicate failed mid-update. Their members can
    /// no longer be trusted, so retained handles must fail from here on.
    pub(crate) fn drop_failed(&mut self, failed: &[CollectionId], cause: &CollectionError) {
        for &id in failed {
            if let Some(collection) = self.destroy(id) {
                error!(
                    "CollectionStore: dropped `{}` ({}): {}",
                    collection.key().unwrap_or("<unkeyed>"),
                    id,
                    cause
                );
            }
        }
    }

    /// Re-test `entity` in one live collection.
    pub fn update_entity(
        &mut self,
        id: CollectionId,
        registry: &dyn EntityRegistry,
        entity: EntityId,
    ) -> Result<MembershipChange, CollectionError> {
        let change = self.get_mut(id)?.refresh(registry, entity)?;
        self.stats.retests += 1;
        self.stats.record(change);
        Ok(change)
    }

    /// Re-test `entity` in every live collection after a change nobody emits an
    /// event for. Returns how many memberships changed.
    ///
    /// Collections whose predicate fails are destroyed; the others are still updated.
    pub fn notify_entity_changed(
        &mut self,
        registry: &dyn EntityRegistry,
        entity: EntityId,
        property: Option<&str>,
    ) -> Result<usize, CollectionError> {
        let selective = self.config.selective_invalidation;
        let mut stats = self.stats;
        let mut changed = 0;
        let mut failed = Vec::new();
        let mut first_error = None;
        for (id, collection) in self.live_entries_mut() {
            if let (true, Some(property)) = (selective, property) {
                if !collection.depends_on(property) {
                    stats.skipped_retests += 1;
                    continue;
                }
            }
            match collection.refresh(registry, entity) {
                Ok(change) => {
                    stats.retests += 1;
                    stats.record(change);
                    if change != MembershipChange::Unchanged {
                        changed += 1;
                    }
                }
                Err(e) => {
                    failed.push(id);
                    first_error.get_or_insert(e);
                }
            }
        }
        self.stats = stats;
        if let Some(e) = first_error {
            self.drop_failed(&failed, &e);
            return Err(e);
        }
        if changed > 0 {
            trace!("CollectionStore: {} memberships changed for entity {}", changed, entity);
        }
        Ok(changed)
    }
}
