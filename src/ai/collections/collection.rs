//! Collections: filtered, optionally live, subsets of the entity registry.
//!
//! A collection keeps the whole chain of filters it was derived with (its
//! ancestors' filters followed by its own). Membership is always "passes every
//! filter of the chain", which is the same set as "passes its own filter among the
//! parent's members" but can be re-tested for one entity without touching the
//! parent. Parents therefore never need to know about their children.

use std::fmt;

use rustc_hash::FxHashSet;
use smallvec::SmallVec;

use crate::ai::entity::{EntityId, EntityView};
use crate::ai::error::CollectionError;
use crate::ai::filter::Filter;
use crate::ai::fixed_math::FixedVec2;
use crate::ai::registry::EntityRegistry;

use super::members::{MemberSet, MemberSetStats, SweepConfig};

pub type FilterChain = SmallVec<[Filter; 4]>;

/// Generational handle to a live collection in a [`super::CollectionStore`].
///
/// The generation changes when the collection is destroyed, so a retained handle
/// fails with [`CollectionError::Destroyed`] instead of reading another collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CollectionId {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl fmt::Display for CollectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

/// Outcome of re-testing one entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipChange {
    Added,
    Removed,
    Unchanged,
}

#[derive(Debug, Clone)]
pub struct Collection {
    pub(crate) key: Option<String>,
    pub(crate) parent: Option<CollectionId>,
    filters: FilterChain,
    members: MemberSet,
    pub(crate) live: bool,
    changes: u64,
}

impl Collection {
    /// One-shot snapshot of every registry entity passing `filter`.
    pub fn from_registry(registry: &dyn EntityRegistry, filter: Filter) -> Result<Self, CollectionError> {
        Self::scan(registry, filter, SweepConfig::default())
    }

    pub(crate) fn scan(
        registry: &dyn EntityRegistry,
        filter: Filter,
        config: SweepConfig,
    ) -> Result<Self, CollectionError> {
        Self::scan_chain(registry, SmallVec::from_elem(filter, 1), config)
    }

    /// Full registry scan against every filter of `filters`.
    pub(crate) fn scan_chain(
        registry: &dyn EntityRegistry,
        filters: FilterChain,
        config: SweepConfig,
    ) -> Result<Self, CollectionError> {
        let mut collection = Self::empty(filters, config);
        for ent in registry.entities() {
            if collection.matches(ent)? {
                collection.members.insert(ent.id());
            }
        }
        Ok(collection)
    }

    fn empty(filters: FilterChain, config: SweepConfig) -> Self {
        Self {
            key: None,
            parent: None,
            filters,
            members: MemberSet::new(config),
            live: false,
            changes: 0,
        }
    }

    /// Derived snapshot: members of `self` that also pass `filter`.
    ///
    /// The result is not maintained; register it with a store to make it live.
    pub fn filter(&self, registry: &dyn EntityRegistry, filter: Filter) -> Result<Collection, CollectionError> {
        let mut filters = self.filters.clone();
        filters.push(filter);
        let mut derived = Self::empty(filters, self.members.config());
        for id in self.members.iter() {
            let Some(ent) = registry.get(id) else { continue };
            if derived.matches_last(ent)? {
                derived.members.insert(id);
            }
        }
        Ok(derived)
    }

    /// Members with a position, nearest to `pos` first, truncated to `limit`.
    ///
    /// Equal distances keep insertion order. The result is a read-time snapshot.
    /// Its chain ends with a filter admitting only the selected ids, so if it is
    /// ever registered, later events can shrink it but never grow it past them.
    pub fn filter_nearest(&self, registry: &dyn EntityRegistry, pos: FixedVec2, limit: Option<usize>) -> Collection {
        let mut ranked: Vec<_> = self
            .members
            .iter()
            .filter_map(|id| {
                let position = registry.get(id)?.position()?;
                Some((position.distance_squared(pos), id))
            })
            .collect();
        ranked.sort_by_key(|(distance, _)| *distance);

        let ordered: Vec<EntityId> = ranked
            .into_iter()
            .take(limit.unwrap_or(usize::MAX))
            .map(|(_, id)| id)
            .collect();
        let pinned: FxHashSet<EntityId> = ordered.iter().copied().collect();
        let mut filters = self.filters.clone();
        filters.push(Filter::new(format!("nearest-{}", ordered.len()), &[], move |ent| {
            pinned.contains(&ent.id())
        }));

        let mut nearest = Self::empty(filters, self.members.config());
        for id in ordered {
            nearest.members.insert(id);
        }
        nearest
    }

    pub fn values(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.members.iter()
    }

    pub fn for_each(&self, mut f: impl FnMut(EntityId)) {
        for id in self.members.iter() {
            f(id);
        }
    }

    /// Resolve members against the registry, skipping ids it no longer knows.
    pub fn entities<'r>(&'r self, registry: &'r dyn EntityRegistry) -> impl Iterator<Item = &'r dyn EntityView> + 'r {
        self.members.iter().filter_map(move |id| registry.get(id))
    }

    pub fn to_entity_array(&self) -> Vec<EntityId> {
        self.members.iter().collect()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn has_entities(&self) -> bool {
        !self.members.is_empty()
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.members.contains(id)
    }

    /// Re-evaluate one entity the caller knows has changed.
    pub fn update_ent(&mut self, ent: &dyn EntityView) -> Result<MembershipChange, CollectionError> {
        let keep = self.matches(ent)?;
        Ok(self.apply(ent.id(), keep))
    }

    /// Re-evaluate `id`, dropping it if the registry no longer knows it.
    pub fn refresh(&mut self, registry: &dyn EntityRegistry, id: EntityId) -> Result<MembershipChange, CollectionError> {
        match registry.get(id) {
            Some(ent) => self.update_ent(ent),
            None => Ok(self.apply(id, false)),
        }
    }

    pub(crate) fn remove_id(&mut self, id: EntityId) -> bool {
        self.apply(id, false) == MembershipChange::Removed
    }

    /// Carry membership over to a renamed id without counting a change.
    pub(crate) fn migrate(&mut self, old: EntityId, new: EntityId) -> bool {
        self.members.rename(old, new)
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub fn parent(&self) -> Option<CollectionId> {
        self.parent
    }

    pub fn is_live(&self) -> bool {
        self.live
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn dependent_props(&self) -> impl Iterator<Item = &str> + '_ {
        self.filters.iter().flat_map(|f| f.dependent_props().iter().map(String::as_str))
    }

    pub fn depends_on(&self, property: &str) -> bool {
        self.filters.iter().any(|f| f.depends_on(property))
    }

    /// Number of additions and removals since construction.
    pub fn change_count(&self) -> u64 {
        self.changes
    }

    pub fn member_stats(&self) -> MemberSetStats {
        self.members.stats()
    }

    fn apply(&mut self, id: EntityId, keep: bool) -> MembershipChange {
        let change = if keep {
            if self.members.insert(id) { MembershipChange::Added } else { MembershipChange::Unchanged }
        } else if self.members.remove(id) {
            MembershipChange::Removed
        } else {
            MembershipChange::Unchanged
        };
        if change != MembershipChange::Unchanged {
            self.changes += 1;
        }
        change
    }

    fn matches(&self, ent: &dyn EntityView) -> Result<bool, CollectionError> {
        for filter in &self.filters {
            if !test(filter, ent)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn matches_last(&self, ent: &dyn EntityView) -> Result<bool, CollectionError> {
        match self.filters.last() {
            Some(filter) => test(filter, ent),
            None => Ok(true),
        }
    }
}

fn test(filter: &Filter, ent: &dyn EntityView) -> Result<bool, CollectionError> {
    filter.test(ent).map_err(|source| CollectionError::Predicate {
        filter: filter.label().to_string(),
        entity: ent.id(),
        source,
    })
}
