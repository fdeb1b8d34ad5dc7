//! Collection Cache: named live collections shared by every decision module.
//!
//! Keys are plain strings. Per-player keys follow `player-<id>-<name>` so a
//! player's collections can be dropped by prefix. Entries may also carry a
//! [`CacheTag`]; the cache keeps a tag → keys index so bulk resets (diplomacy
//! changes, defeat) never parse key strings.

use std::collections::BTreeSet;

use bevy::prelude::*;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::ai::entity::PlayerId;
use crate::ai::error::CollectionError;
use crate::ai::filter::{Filter, FilterSpec};
use crate::ai::persistence::{CacheManifest, ManifestEntry};
use crate::ai::registry::EntityRegistry;

use super::collection::{Collection, CollectionId, FilterChain};
use super::store::{CollectionSource, CollectionStore, StoreConfig};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CacheTag {
    /// Depends on who `PlayerId` considers ally or enemy.
    Diplomacy(PlayerId),
    /// Depends on which players are still in the game.
    Victory(PlayerId),
    Custom(String),
}

#[derive(Debug, Clone)]
struct CacheEntry {
    id: CollectionId,
    tag: Option<CacheTag>,
    sequence: u64,
}

/// Outcome of [`CollectionCache::restore`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreReport {
    pub restored: Vec<String>,
    pub skipped: Vec<String>,
}

#[derive(Resource, Debug, Default)]
pub struct CollectionCache {
    store: CollectionStore,
    entries: FxHashMap<String, CacheEntry>,
    tags: FxHashMap<CacheTag, BTreeSet<String>>,
    sequence: u64,
}

impl CollectionCache {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            store: CollectionStore::new(config),
            ..Default::default()
        }
    }

    pub fn store(&self) -> &CollectionStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut CollectionStore {
        &mut self.store
    }

    /// Return the live collection under `key`, building and registering it first
    /// if the key is unknown. `filter` and `source` are ignored on a hit.
    pub fn get_or_create(
        &mut self,
        registry: &dyn EntityRegistry,
        key: &str,
        filter: Filter,
        source: CollectionSource<'_>,
    ) -> Result<CollectionId, CollectionError> {
        self.get_or_create_inner(registry, key, None, filter, source)
    }

    pub fn get_or_create_tagged(
        &mut self,
        registry: &dyn EntityRegistry,
        key: &str,
        tag: CacheTag,
        filter: Filter,
        source: CollectionSource<'_>,
    ) -> Result<CollectionId, CollectionError> {
        self.get_or_create_inner(registry, key, Some(tag), filter, source)
    }

    fn get_or_create_inner(
        &mut self,
        registry: &dyn EntityRegistry,
        key: &str,
        tag: Option<CacheTag>,
        filter: Filter,
        source: CollectionSource<'_>,
    ) -> Result<CollectionId, CollectionError> {
        if let Some(id) = self.lookup(key) {
            return Ok(id);
        }
        let collection = self.store.build(registry, source, filter)?;
        Ok(self.insert(key, tag, collection))
    }

    fn insert(&mut self, key: &str, tag: Option<CacheTag>, mut collection: Collection) -> CollectionId {
        // A stale entry (its collection destroyed through the store) is replaced.
        self.forget(key);
        collection.key = Some(key.to_string());
        let id = self.store.register(collection);
        if let Some(tag) = &tag {
            self.tags.entry(tag.clone()).or_default().insert(key.to_string());
        }
        self.sequence += 1;
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                id,
                tag,
                sequence: self.sequence,
            },
        );
        debug!("CollectionCache: created `{}` as {}", key, id);
        id
    }

    /// Id of the live collection cached under `key`.
    pub fn lookup(&self, key: &str) -> Option<CollectionId> {
        self.entries
            .get(key)
            .map(|entry| entry.id)
            .filter(|id| self.store.contains(*id))
    }

    pub fn get(&self, id: CollectionId) -> Result<&Collection, CollectionError> {
        self.store.get(id)
    }

    pub fn collection(&self, key: &str) -> Option<&Collection> {
        self.lookup(key).and_then(|id| self.store.get(id).ok())
    }

    /// Stop maintaining the collection under `key`. Unknown keys are a no-op.
    pub fn destroy(&mut self, key: &str) -> bool {
        match self.forget(key) {
            Some(entry) => self.store.destroy(entry.id).is_some(),
            None => false,
        }
    }

    /// Destroy every collection whose key starts with `prefix`. Returns how many.
    pub fn reset_by_prefix(&mut self, prefix: &str) -> usize {
        let keys: Vec<String> = self
            .entries
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect();
        self.destroy_all(keys)
    }

    /// Destroy every collection tagged with `tag`. Returns how many.
    pub fn reset_by_tag(&mut self, tag: &CacheTag) -> usize {
        let keys: Vec<String> = self
            .tags
            .get(tag)
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default();
        self.destroy_all(keys)
    }

    fn destroy_all(&mut self, keys: Vec<String>) -> usize {
        let destroyed = keys.iter().filter(|key| self.destroy(key)).count();
        if destroyed > 0 {
            debug!("CollectionCache: reset {} collections", destroyed);
        }
        destroyed
    }

    /// Register an ad-hoc collection that stays owned by its creator.
    pub fn register(&mut self, collection: Collection) -> CollectionId {
        self.store.register(collection)
    }

    /// Destroy by id, dropping the cache entry too if the collection was cached.
    pub fn destroy_collection(&mut self, id: CollectionId) -> bool {
        let Some(collection) = self.store.destroy(id) else {
            return false;
        };
        if let Some(key) = collection.key() {
            if self.entries.get(key).is_some_and(|entry| entry.id == id) {
                self.forget(key);
            }
        }
        true
    }

    /// Cached keys in lexicographic order.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self
            .entries
            .iter()
            .filter(|(_, entry)| self.store.contains(entry.id))
            .map(|(key, _)| key.as_str())
            .collect();
        keys.sort_unstable();
        keys
    }

    pub fn len(&self) -> usize {
        self.entries.values().filter(|entry| self.store.contains(entry.id)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn forget(&mut self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        if let Some(tag) = &entry.tag {
            if let Some(keys) = self.tags.get_mut(tag) {
                keys.remove(key);
                if keys.is_empty() {
                    self.tags.remove(tag);
                }
            }
        }
        Some(entry)
    }

    // ------------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------------

    /// Live cached keys in creation order, with what is needed to rebuild them.
    pub fn manifest(&self) -> CacheManifest {
        let mut entries: Vec<(&String, &CacheEntry)> = self
            .entries
            .iter()
            .filter(|(_, entry)| self.store.contains(entry.id))
            .collect();
        entries.sort_by_key(|(_, entry)| entry.sequence);

        let entries = entries
            .into_iter()
            .filter_map(|(key, entry)| {
                let collection = self.store.get(entry.id).ok()?;
                let filters = collection
                    .filters()
                    .iter()
                    .map(|filter| filter.spec().cloned())
                    .collect::<Option<Vec<FilterSpec>>>();
                let parent_key = collection
                    .parent()
                    .and_then(|parent| self.store.get(parent).ok())
                    .and_then(|parent| parent.key().map(str::to_string));
                Some(ManifestEntry {
                    key: key.clone(),
                    tag: entry.tag.clone(),
                    filters,
                    parent_key,
                })
            })
            .collect();

        CacheManifest {
            entries,
            ..Default::default()
        }
    }

    /// Rebuild the entries of `manifest` against `registry`.
    ///
    /// Keys already cached are kept as they are. Entries whose filters cannot be
    /// rebuilt are reported as skipped.
    pub fn restore(
        &mut self,
        manifest: &CacheManifest,
        registry: &dyn EntityRegistry,
    ) -> Result<RestoreReport, CollectionError> {
        let mut report = RestoreReport::default();
        for entry in &manifest.entries {
            let Some(specs) = entry.filters.as_ref().filter(|_| entry.is_restorable()) else {
                warn!("CollectionCache: `{}` has no serialisable filter, skipping", entry.key);
                report.skipped.push(entry.key.clone());
                continue;
            };
            if self.lookup(&entry.key).is_some() {
                report.restored.push(entry.key.clone());
                continue;
            }

            let mut filters: FilterChain = specs.iter().map(FilterSpec::to_filter).collect();
            let parent = entry.parent_key.as_deref().and_then(|key| self.lookup(key));
            let collection = match (parent, filters.pop()) {
                (Some(parent), Some(own)) if self.store.get(parent)?.filters().len() == filters.len() => {
                    self.store.build(registry, CollectionSource::Live(parent), own)?
                }
                (_, own) => {
                    filters.extend(own);
                    self.store.build_chain(registry, filters)?
                }
            };
            self.insert(&entry.key, entry.tag.clone(), collection);
            report.restored.push(entry.key.clone());
        }
        info!(
            "CollectionCache: restored {} collections, skipped {}",
            report.restored.len(),
            report.skipped.len()
        );
        Ok(report)
    }
}
