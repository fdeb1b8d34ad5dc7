//! Player Queries: the named collections a decision agent asks for.
//!
//! Keys built here follow `player-<id>-<name>` for per-player collections and a
//! bare name for global ones, so several agents share one maintained collection
//! per question. Collections that depend on the current diplomacy (ally/enemy
//! owner lists are captured when the filter is built) carry
//! [`CacheTag::Diplomacy`] and are rebuilt after a stance change.

use bevy::prelude::*;

use crate::ai::collections::{CacheTag, Collection, CollectionCache, CollectionId, CollectionSource};
use crate::ai::diplomacy::Diplomacy;
use crate::ai::entity::{EntityId, MetadataValue, PlayerId};
use crate::ai::error::{AiError, CollectionError};
use crate::ai::filter::{builtin, Filter};
use crate::ai::fixed_math::FixedVec2;
use crate::ai::registry::{EntityArena, EntityRegistry};

pub struct PlayerQueries<'a> {
    player: PlayerId,
    arena: &'a mut EntityArena,
    cache: &'a mut CollectionCache,
    diplomacy: &'a Diplomacy,
}

impl<'a> PlayerQueries<'a> {
    pub fn new(
        player: PlayerId,
        arena: &'a mut EntityArena,
        cache: &'a mut CollectionCache,
        diplomacy: &'a Diplomacy,
    ) -> Self {
        Self {
            player,
            arena,
            cache,
            diplomacy,
        }
    }

    pub fn player(&self) -> PlayerId {
        self.player
    }

    pub fn registry(&self) -> &dyn EntityRegistry {
        &*self.arena
    }

    pub fn cache(&self) -> &CollectionCache {
        &*self.cache
    }

    pub fn diplomacy(&self) -> &Diplomacy {
        self.diplomacy
    }

    pub fn collection(&self, id: CollectionId) -> Result<&Collection, CollectionError> {
        self.cache.get(id)
    }

    /// `player-<id>-<name>`.
    pub fn key(&self, name: &str) -> String {
        player_key(self.player, name)
    }

    // ------------------------------------------------------------------------
    // Generic access
    // ------------------------------------------------------------------------

    pub fn updating_collection(
        &mut self,
        name: &str,
        filter: Filter,
        source: CollectionSource<'_>,
    ) -> Result<CollectionId, CollectionError> {
        let key = self.key(name);
        self.cache.get_or_create(&*self.arena, &key, filter, source)
    }

    pub fn updating_global_collection(
        &mut self,
        key: &str,
        filter: Filter,
        source: CollectionSource<'_>,
    ) -> Result<CollectionId, CollectionError> {
        self.cache.get_or_create(&*self.arena, key, filter, source)
    }

    fn updating_diplomacy_collection(
        &mut self,
        name: &str,
        filter: Filter,
        source: CollectionSource<'_>,
    ) -> Result<CollectionId, CollectionError> {
        let key = self.key(name);
        let tag = CacheTag::Diplomacy(self.player);
        self.cache.get_or_create_tagged(&*self.arena, &key, tag, filter, source)
    }

    pub fn destroy_collection(&mut self, name: &str) -> bool {
        let key = self.key(name);
        self.cache.destroy(&key)
    }

    /// Drop every collection built from this player's current diplomacy.
    pub fn reset_on_diplomacy_changed(&mut self) -> usize {
        self.cache.reset_by_tag(&CacheTag::Diplomacy(self.player))
    }

    /// Read-time proximity ordering of a collection's members.
    pub fn nearest(&self, id: CollectionId, pos: FixedVec2, limit: Option<usize>) -> Result<Collection, CollectionError> {
        Ok(self.cache.get(id)?.filter_nearest(&*self.arena, pos, limit))
    }

    // ------------------------------------------------------------------------
    // Ownership
    // ------------------------------------------------------------------------

    pub fn entities_of(&mut self, player: PlayerId) -> Result<CollectionId, CollectionError> {
        let key = player_key(player, "entities");
        self.updating_global_collection(&key, builtin::by_owner(player), CollectionSource::Registry)
    }

    pub fn structures(&mut self) -> Result<CollectionId, CollectionError> {
        self.updating_global_collection("structures", builtin::by_class("Structure"), CollectionSource::Registry)
    }

    pub fn own_entities(&mut self) -> Result<CollectionId, CollectionError> {
        self.entities_of(self.player)
    }

    pub fn own_structures(&mut self) -> Result<CollectionId, CollectionError> {
        self.own_subset("structures", builtin::by_class("Structure"))
    }

    pub fn own_units(&mut self) -> Result<CollectionId, CollectionError> {
        self.own_subset("units", builtin::by_class("Unit"))
    }

    pub fn own_foundations(&mut self) -> Result<CollectionId, CollectionError> {
        self.own_subset("foundations", builtin::is_foundation())
    }

    pub fn own_entities_by_metadata(
        &mut self,
        key: &str,
        value: impl Into<MetadataValue>,
    ) -> Result<CollectionId, CollectionError> {
        let value = value.into();
        let name = metadata_name(key, &value);
        let filter = builtin::by_metadata(self.player, key, value);
        self.own_subset(&name, filter)
    }

    /// One-shot variant of [`Self::own_entities_by_metadata`]; nothing is cached.
    pub fn own_entities_by_metadata_snapshot(
        &mut self,
        key: &str,
        value: impl Into<MetadataValue>,
    ) -> Result<Collection, CollectionError> {
        let own = self.own_entities()?;
        let filter = builtin::by_metadata(self.player, key, value);
        self.cache.store_mut().build(&*self.arena, CollectionSource::Live(own), filter)
    }

    pub fn own_entities_by_role(&mut self, role: &str) -> Result<CollectionId, CollectionError> {
        self.own_entities_by_metadata("role", role)
    }

    pub fn own_entities_by_role_snapshot(&mut self, role: &str) -> Result<Collection, CollectionError> {
        self.own_entities_by_metadata_snapshot("role", role)
    }

    pub fn own_entities_by_type(&mut self, template: &str) -> Result<CollectionId, CollectionError> {
        self.own_subset(&format!("type-{}", template), builtin::by_type(template))
    }

    pub fn own_entities_by_type_snapshot(&mut self, template: &str) -> Result<Collection, CollectionError> {
        let own = self.own_entities()?;
        self.cache
            .store_mut()
            .build(&*self.arena, CollectionSource::Live(own), builtin::by_type(template))
    }

    pub fn own_entities_by_class(&mut self, class: &str) -> Result<CollectionId, CollectionError> {
        self.own_subset(&format!("class-{}", class), builtin::by_class(class))
    }

    pub fn own_entities_by_class_snapshot(&mut self, class: &str) -> Result<Collection, CollectionError> {
        let own = self.own_entities()?;
        self.cache
            .store_mut()
            .build(&*self.arena, CollectionSource::Live(own), builtin::by_class(class))
    }

    pub fn own_foundations_by_class(&mut self, class: &str) -> Result<CollectionId, CollectionError> {
        let foundations = self.own_foundations()?;
        self.updating_collection(
            &format!("foundations-class-{}", class),
            builtin::by_class(class),
            CollectionSource::Live(foundations),
        )
    }

    pub fn own_training_facilities(&mut self) -> Result<CollectionId, CollectionError> {
        self.own_subset("training-facilities", builtin::by_training_queue())
    }

    pub fn own_dropsites(&mut self, resource: Option<&str>) -> Result<CollectionId, CollectionError> {
        let name = format!("dropsite-{}", resource.unwrap_or("all"));
        self.own_subset(&name, builtin::is_dropsite(resource))
    }

    /// Dropsites of every player.
    pub fn any_dropsites(&mut self, resource: Option<&str>) -> Result<CollectionId, CollectionError> {
        let key = format!("dropsite-{}", resource.unwrap_or("all"));
        self.updating_global_collection(&key, builtin::is_dropsite(resource), CollectionSource::Registry)
    }

    // ------------------------------------------------------------------------
    // Resources
    // ------------------------------------------------------------------------

    pub fn resource_supplies(&mut self, generic: &str) -> Result<CollectionId, CollectionError> {
        let key = format!("resource-{}", generic);
        self.updating_global_collection(&key, builtin::by_resource(generic), CollectionSource::Registry)
    }

    pub fn huntable_supplies(&mut self) -> Result<CollectionId, CollectionError> {
        self.updating_global_collection("resource-hunt", builtin::is_huntable(), CollectionSource::Registry)
    }

    pub fn fishable_supplies(&mut self) -> Result<CollectionId, CollectionError> {
        self.updating_global_collection("resource-fish", builtin::is_fishable(), CollectionSource::Registry)
    }

    // ------------------------------------------------------------------------
    // Diplomacy
    // ------------------------------------------------------------------------

    /// Structures of all allies (this player included), or of one given ally.
    pub fn ally_structures(&mut self, ally: Option<PlayerId>) -> Result<CollectionId, CollectionError> {
        match ally {
            Some(ally) => self.structures_of(ally),
            None => {
                let owners = self.diplomacy.allies(self.player);
                let filter = builtin::by_owners(&owners).and(builtin::by_class("Structure"));
                self.updating_diplomacy_collection("diplo-ally-structures", filter, CollectionSource::Registry)
            }
        }
    }

    pub fn enemy_structures(&mut self, enemy: Option<PlayerId>) -> Result<CollectionId, CollectionError> {
        match enemy {
            Some(enemy) => self.structures_of(enemy),
            None => {
                let owners = self.diplomacy.enemies(self.player);
                let filter = builtin::by_owners(&owners).and(builtin::by_class("Structure"));
                self.updating_diplomacy_collection("diplo-enemy-structures", filter, CollectionSource::Registry)
            }
        }
    }

    pub fn enemy_units(&mut self, enemy: PlayerId) -> Result<CollectionId, CollectionError> {
        let entities = self.entities_of(enemy)?;
        let key = player_key(enemy, "units");
        self.updating_global_collection(&key, builtin::by_class("Unit"), CollectionSource::Live(entities))
    }

    pub fn ally_entities(&mut self) -> Result<Collection, CollectionError> {
        let owners = self.diplomacy.allies(self.player);
        self.snapshot_of_owners(&owners)
    }

    pub fn exclusive_ally_entities(&mut self) -> Result<Collection, CollectionError> {
        let owners = self.diplomacy.exclusive_allies(self.player);
        self.snapshot_of_owners(&owners)
    }

    pub fn enemy_entities(&mut self) -> Result<Collection, CollectionError> {
        let owners = self.diplomacy.enemies(self.player);
        self.snapshot_of_owners(&owners)
    }

    pub fn exclusive_ally_markets(&mut self) -> Result<CollectionId, CollectionError> {
        let owners = self.diplomacy.exclusive_allies(self.player);
        let filter = builtin::by_owners(&owners).and(builtin::by_class("Trade"));
        self.updating_diplomacy_collection("diplo-exclusive-ally-markets", filter, CollectionSource::Registry)
    }

    // ------------------------------------------------------------------------
    // Counters
    // ------------------------------------------------------------------------

    pub fn count_entities_by_type(&mut self, template: &str) -> Result<usize, CollectionError> {
        let id = self.own_entities_by_type(template)?;
        Ok(self.cache.get(id)?.len())
    }

    pub fn count_own_entities_by_role(&mut self, role: &str) -> Result<usize, CollectionError> {
        let id = self.own_entities_by_role(role)?;
        Ok(self.cache.get(id)?.len())
    }

    pub fn count_foundations_by_type(&mut self, template: &str) -> Result<usize, CollectionError> {
        let foundations = self.own_foundations()?;
        let id = self.updating_collection(
            &format!("foundations-type-{}", template),
            builtin::by_type(template),
            CollectionSource::Live(foundations),
        )?;
        Ok(self.cache.get(id)?.len())
    }

    // ------------------------------------------------------------------------
    // Metadata
    // ------------------------------------------------------------------------

    pub fn metadata(&self, entity: EntityId, key: &str) -> Option<&MetadataValue> {
        self.arena.get(entity)?.metadata(self.player, key)
    }

    /// Write AI-private metadata and re-test the entity everywhere at once. The
    /// simulation emits no event for metadata, so no other path would notice.
    pub fn set_metadata(
        &mut self,
        entity: EntityId,
        key: &str,
        value: Option<MetadataValue>,
    ) -> Result<(), AiError> {
        self.arena.set_metadata(self.player, entity, key, value)?;
        let property = format!("metadata.{}", key);
        self.cache
            .store_mut()
            .notify_entity_changed(&*self.arena, entity, Some(&property))?;
        trace!("PlayerQueries: player {} set {} on {}", self.player, key, entity);
        Ok(())
    }

    // ------------------------------------------------------------------------

    fn own_subset(&mut self, name: &str, filter: Filter) -> Result<CollectionId, CollectionError> {
        let own = self.own_entities()?;
        self.updating_collection(name, filter, CollectionSource::Live(own))
    }

    fn structures_of(&mut self, player: PlayerId) -> Result<CollectionId, CollectionError> {
        let entities = self.entities_of(player)?;
        let key = player_key(player, "structures");
        self.updating_global_collection(&key, builtin::by_class("Structure"), CollectionSource::Live(entities))
    }

    fn snapshot_of_owners(&mut self, owners: &[PlayerId]) -> Result<Collection, CollectionError> {
        self.cache
            .store_mut()
            .build(&*self.arena, CollectionSource::Registry, builtin::by_owners(owners))
    }
}

pub fn player_key(player: PlayerId, name: &str) -> String {
    format!("player-{}-{}", player.0, name)
}

/// `metadata-<key>=<kind>:<value>`, with backslashes and `=` escaped in the key so
/// distinct (key, value) pairs never share a cache key.
fn metadata_name(key: &str, value: &MetadataValue) -> String {
    let mut name = String::from("metadata-");
    for c in key.chars() {
        if matches!(c, '\\' | '=') {
            name.push('\\');
        }
        name.push(c);
    }
    let value = match value {
        MetadataValue::Int(v) => format!("int:{}", v),
        MetadataValue::Text(v) => format!("text:{}", v),
        MetadataValue::Flag(v) => format!("flag:{}", v),
    };
    name.push('=');
    name.push_str(&value);
    name
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::registry::EntityRecord;

    fn arena_with(records: Vec<EntityRecord>) -> EntityArena {
        let mut arena = EntityArena::new();
        for record in records {
            arena.spawn(record).unwrap();
        }
        arena.drain_events();
        arena
    }

    #[test]
    fn test_metadata_name_keeps_value_kind() {
        assert_eq!(metadata_name("role", &MetadataValue::Int(1)), "metadata-role=int:1");
        assert_eq!(metadata_name("role", &MetadataValue::from("1")), "metadata-role=text:1");
        assert_eq!(metadata_name("role", &MetadataValue::Flag(true)), "metadata-role=flag:true");
        assert_ne!(
            metadata_name("a=text:b", &MetadataValue::from("c")),
            metadata_name("a", &MetadataValue::from("b=text:c"))
        );
        assert_ne!(
            metadata_name("a-b", &MetadataValue::from("c")),
            metadata_name("a", &MetadataValue::from("b-c"))
        );
    }

    #[test]
    fn test_metadata_collections_do_not_share_keys_across_kinds() {
        let p1 = PlayerId(1);
        let mut arena = arena_with(vec![
            EntityRecord::new(EntityId(1), p1, "units/worker").with_metadata(p1, "role", 1i64),
            EntityRecord::new(EntityId(2), p1, "units/worker").with_metadata(p1, "role", "1"),
        ]);
        let mut cache = CollectionCache::default();
        let diplomacy = Diplomacy::new(2);
        let mut queries = PlayerQueries::new(p1, &mut arena, &mut cache, &diplomacy);

        let ints = queries.own_entities_by_metadata("role", 1i64).unwrap();
        let texts = queries.own_entities_by_metadata("role", "1").unwrap();
        assert_ne!(ints, texts);
        assert_eq!(queries.collection(ints).unwrap().to_entity_array(), vec![EntityId(1)]);
        assert_eq!(queries.collection(texts).unwrap().to_entity_array(), vec![EntityId(2)]);

        // Same question, same collection
        assert_eq!(queries.own_entities_by_metadata("role", 1i64).unwrap(), ints);
    }
}
