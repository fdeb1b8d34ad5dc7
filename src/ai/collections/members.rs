//! Member Set: insertion-ordered entity id set with O(1) membership.
//!
//! # Purpose
//!
//! Collections must iterate their members in a stable order (lockstep replays
//! and multiplayer depend on every client visiting entities identically) while
//! the propagator adds and removes ids every cycle.
//!
//! # Architecture
//!
//! - Items live in a `Vec` in insertion order.
//! - Removal marks the slot in a tombstone bitset instead of shifting the tail.
//! - Once tombstones pass a configurable share of the slots, a sweep compacts
//!   the vector in order and rewrites the positions of the moved ids.
//! - An id → position map gives O(1) `contains` and O(1) removal.
//!
//! Renaming an id rewrites its slot in place, so the entity keeps its position.

use bevy::prelude::*;
use fixedbitset::FixedBitSet;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::ai::entity::EntityId;

/// Configuration for tombstone compaction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SweepConfig {
    /// Sweep once tombstones make up this share of all slots.
    pub ratio: f32,
    /// Never sweep below this many tombstones.
    pub min_tombstones: usize,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            ratio: 0.25,
            min_tombstones: 32,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MemberSet {
    items: Vec<EntityId>,
    tombstones: FixedBitSet,
    tombstone_count: usize,
    positions: FxHashMap<EntityId, usize>,
    config: SweepConfig,
}

/// Statistics about set usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberSetStats {
    pub live: usize,
    pub tombstones: usize,
    pub slots: usize,
}

impl Default for MemberSet {
    fn default() -> Self {
        Self::new(SweepConfig::default())
    }
}

impl MemberSet {
    pub fn new(config: SweepConfig) -> Self {
        Self {
            items: Vec::new(),
            tombstones: FixedBitSet::new(),
            tombstone_count: 0,
            positions: FxHashMap::default(),
            config,
        }
    }

    pub(crate) fn config(&self) -> SweepConfig {
        self.config
    }

    /// Append `id`. Returns false if it was already a member.
    pub fn insert(&mut self, id: EntityId) -> bool {
        if self.positions.contains_key(&id) {
            return false;
        }
        let position = self.items.len();
        self.items.push(id);
        self.tombstones.grow(position + 1);
        self.positions.insert(id, position);
        true
    }

    /// Tombstone `id`. Returns false if it was not a member.
    pub fn remove(&mut self, id: EntityId) -> bool {
        let Some(position) = self.positions.remove(&id) else {
            return false;
        };
        self.tombstones.set(position, true);
        self.tombstone_count += 1;
        self.sweep_if_needed();
        true
    }

    /// Move membership from `old` to `new` in place. Returns false if `old` was not a member.
    pub fn rename(&mut self, old: EntityId, new: EntityId) -> bool {
        if !self.positions.contains_key(&old) {
            return false;
        }
        if self.positions.contains_key(&new) {
            // Both ids present: the old slot simply goes away.
            return self.remove(old);
        }
        if let Some(position) = self.positions.remove(&old) {
            self.items[position] = new;
            self.positions.insert(new, position);
        }
        true
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.positions.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.items
            .iter()
            .enumerate()
            .filter(move |(position, _)| !self.tombstones[*position])
            .map(|(_, id)| *id)
    }

    /// Compact tombstoned slots, preserving order.
    pub fn sweep(&mut self) {
        if self.tombstone_count == 0 {
            return;
        }

        let mut write = 0;
        for read in 0..self.items.len() {
            if self.tombstones[read] {
                continue;
            }
            if read != write {
                let id = self.items[read];
                self.items[write] = id;
                self.positions.insert(id, write);
            }
            write += 1;
        }

        self.items.truncate(write);
        self.tombstones = FixedBitSet::with_capacity(write);
        self.tombstone_count = 0;
    }

    pub fn stats(&self) -> MemberSetStats {
        MemberSetStats {
            live: self.len(),
            tombstones: self.tombstone_count,
            slots: self.items.len(),
        }
    }

    fn sweep_if_needed(&mut self) {
        if self.tombstone_count < self.config.min_tombstones {
            return;
        }
        if (self.tombstone_count as f32) < self.items.len() as f32 * self.config.ratio {
            return;
        }
        trace!(
            "MemberSet: sweeping {} tombstones ({} slots)",
            self.tombstone_count,
            self.items.len()
        );
        self.sweep();
    }
}
