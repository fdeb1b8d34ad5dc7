//! Tests for MemberSet, Collection, CollectionStore and CollectionCache

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::ai::entity::{EntityId, PlayerId};
    use crate::ai::error::{CollectionError, FilterError};
    use crate::ai::filter::{builtin, Filter};
    use crate::ai::fixed_math::FixedVec2;
    use crate::ai::registry::{EntityArena, EntityRecord};

    fn unit(id: u32, owner: u8) -> EntityRecord {
        EntityRecord::new(EntityId(id), PlayerId(owner), "units/spearman").with_classes(&["Unit", "Infantry"])
    }

    fn arena_with(records: Vec<EntityRecord>) -> EntityArena {
        let mut arena = EntityArena::new();
        for record in records {
            arena.spawn(record).unwrap();
        }
        arena.drain_events();
        arena
    }

    // ------------------------------------------------------------------------
    // MemberSet
    // ------------------------------------------------------------------------

    #[test]
    fn test_member_set_keeps_insertion_order() {
        let mut set = MemberSet::default();
        for id in [5, 1, 9, 3] {
            assert!(set.insert(EntityId(id)));
        }
        assert!(!set.insert(EntityId(1)));
        assert_eq!(set.len(), 4);

        assert!(set.remove(EntityId(9)));
        assert!(!set.remove(EntityId(9)));
        let items: Vec<_> = set.iter().collect();
        assert_eq!(items, vec![EntityId(5), EntityId(1), EntityId(3)]);

        // Reinsertion goes to the back
        set.insert(EntityId(9));
        let items: Vec<_> = set.iter().collect();
        assert_eq!(items, vec![EntityId(5), EntityId(1), EntityId(3), EntityId(9)]);
    }

    #[test]
    fn test_member_set_sweeps_tombstones() {
        let config = SweepConfig {
            ratio: 0.5,
            min_tombstones: 4,
        };
        let mut set = MemberSet::new(config);
        for id in 0..10 {
            set.insert(EntityId(id));
        }

        for id in 0..4 {
            set.remove(EntityId(id));
        }
        // 4 tombstones of 10 slots is below the ratio
        assert_eq!(set.stats().tombstones, 4);
        assert_eq!(set.stats().slots, 10);

        set.remove(EntityId(4));
        assert_eq!(set.stats().tombstones, 0);
        assert_eq!(set.stats().slots, 5);
        assert_eq!(set.len(), 5);

        let items: Vec<_> = set.iter().collect();
        assert_eq!(items, (5..10).map(EntityId).collect::<Vec<_>>());
        assert!(set.contains(EntityId(7)));
        assert!(set.remove(EntityId(7)));
        assert!(!set.contains(EntityId(7)));
    }

    #[test]
    fn test_member_set_rename_in_place() {
        let mut set = MemberSet::default();
        for id in [1, 2, 3] {
            set.insert(EntityId(id));
        }
        assert!(set.rename(EntityId(2), EntityId(20)));
        assert!(!set.rename(EntityId(99), EntityId(100)));

        let items: Vec<_> = set.iter().collect();
        assert_eq!(items, vec![EntityId(1), EntityId(20), EntityId(3)]);
        assert!(!set.contains(EntityId(2)));

        // Renaming onto an existing member drops the old slot
        assert!(set.rename(EntityId(1), EntityId(3)));
        let items: Vec<_> = set.iter().collect();
        assert_eq!(items, vec![EntityId(20), EntityId(3)]);
    }

    // ------------------------------------------------------------------------
    // Collection
    // ------------------------------------------------------------------------

    #[test]
    fn test_from_registry_matches_scan() {
        let arena = arena_with(vec![unit(1, 1), unit(2, 2), unit(3, 1)]);
        let own = Collection::from_registry(&arena, builtin::by_owner(PlayerId(1))).unwrap();

        assert_eq!(own.to_entity_array(), vec![EntityId(1), EntityId(3)]);
        assert_eq!(own.len(), 2);
        assert!(own.has_entities());
        assert!(!own.is_live());
        assert!(own.key().is_none());
    }

    #[test]
    fn test_filter_derives_from_members() {
        let arena = arena_with(vec![
            unit(1, 1).idle(true),
            unit(2, 2).idle(true),
            unit(3, 1),
            unit(4, 1).idle(true),
        ]);
        let own = Collection::from_registry(&arena, builtin::by_owner(PlayerId(1))).unwrap();
        let idle = own.filter(&arena, builtin::is_idle()).unwrap();

        assert_eq!(idle.to_entity_array(), vec![EntityId(1), EntityId(4)]);
        assert_eq!(idle.filters().len(), 2);
        assert!(idle.depends_on("owner"));
        assert!(idle.depends_on("idle"));

        let mut visited = Vec::new();
        idle.for_each(|id| visited.push(id));
        assert_eq!(visited, idle.values().collect::<Vec<_>>());
    }

    #[test]
    fn test_update_ent_tests_whole_chain() {
        let mut arena = arena_with(vec![unit(1, 1), unit(2, 1)]);
        let own = Collection::from_registry(&arena, builtin::by_owner(PlayerId(1))).unwrap();
        let mut idle = own.filter(&arena, builtin::is_idle()).unwrap();
        assert!(idle.is_empty());

        arena.set_idle(EntityId(2), true).unwrap();
        let change = idle.update_ent(arena.record(EntityId(2)).unwrap()).unwrap();
        assert_eq!(change, MembershipChange::Added);

        // Idle but no longer ours: the ancestor filter rejects it
        arena.set_owner(EntityId(2), PlayerId(2)).unwrap();
        let change = idle.update_ent(arena.record(EntityId(2)).unwrap()).unwrap();
        assert_eq!(change, MembershipChange::Removed);
        assert_eq!(idle.change_count(), 2);

        let change = idle.refresh(&arena, EntityId(77)).unwrap();
        assert_eq!(change, MembershipChange::Unchanged);
    }

    #[test]
    fn test_predicate_failure_names_filter_and_entity() {
        let arena = arena_with(vec![unit(1, 1), unit(2, 1)]);
        let broken = Filter::try_new("broken", &[], |ent| {
            if ent.id() == EntityId(2) {
                Err(FilterError::new("no data"))
            } else {
                Ok(true)
            }
        });
        let err = Collection::from_registry(&arena, broken).unwrap_err();
        assert_eq!(
            err,
            CollectionError::Predicate {
                filter: "broken".to_string(),
                entity: EntityId(2),
                source: FilterError::new("no data"),
            }
        );
    }

    #[test]
    fn test_filter_nearest_orders_by_distance() {
        let arena = arena_with(vec![
            unit(1, 1).at(10.0, 0.0),
            unit(2, 1).at(2.0, 0.0),
            unit(3, 1).garrisoned(),
            unit(4, 1).at(0.0, 5.0),
            unit(5, 1).at(-2.0, 0.0),
        ]);
        let all = Collection::from_registry(&arena, builtin::by_owner(PlayerId(1))).unwrap();
        let origin = FixedVec2::ZERO;

        let nearest = all.filter_nearest(&arena, origin, None);
        // Ties keep insertion order, garrisoned entity dropped
        assert_eq!(
            nearest.to_entity_array(),
            vec![EntityId(2), EntityId(5), EntityId(4), EntityId(1)]
        );

        let two = all.filter_nearest(&arena, origin, Some(2));
        assert_eq!(two.to_entity_array(), vec![EntityId(2), EntityId(5)]);
        assert!(!two.is_live());
        assert!(two.filters().last().unwrap().spec().is_none());
    }

    #[test]
    fn test_registered_nearest_snapshot_never_grows() {
        let mut arena = arena_with(vec![unit(1, 1).at(10.0, 0.0), unit(2, 1).at(2.0, 0.0)]);
        let all = Collection::from_registry(&arena, builtin::by_owner(PlayerId(1))).unwrap();
        let mut store = CollectionStore::default();
        let nearest = store.register(all.filter_nearest(&arena, FixedVec2::ZERO, Some(1)));

        arena.spawn(unit(3, 1).at(1.0, 0.0)).unwrap();
        store.notify_entity_changed(&arena, EntityId(3), None).unwrap();
        assert_eq!(store.get(nearest).unwrap().to_entity_array(), vec![EntityId(2)]);

        arena.set_owner(EntityId(2), PlayerId(2)).unwrap();
        store.notify_entity_changed(&arena, EntityId(2), Some("owner")).unwrap();
        assert!(store.get(nearest).unwrap().is_empty());
    }

    // ------------------------------------------------------------------------
    // CollectionStore
    // ------------------------------------------------------------------------

    #[test]
    fn test_store_destroy_invalidates_handle() {
        let arena = arena_with(vec![unit(1, 1)]);
        let mut store = CollectionStore::default();
        let collection = store
            .build(&arena, CollectionSource::Registry, builtin::by_owner(PlayerId(1)))
            .unwrap();
        let id = store.register(collection);
        assert!(store.get(id).unwrap().is_live());
        assert!(store.register_updates(id).is_ok());
        assert!(store.register_updates(id).is_ok());
        assert_eq!(store.live_count(), 1);

        let final_state = store.destroy(id).unwrap();
        assert!(!final_state.is_live());
        assert_eq!(store.get(id).unwrap_err(), CollectionError::Destroyed(id));
        assert!(store.destroy(id).is_none());

        // The slot is reused under a new generation
        let again = store
            .build(&arena, CollectionSource::Registry, builtin::by_owner(PlayerId(1)))
            .unwrap();
        let new_id = store.register(again);
        assert_ne!(new_id, id);
        assert!(store.get(id).is_err());
        assert!(store.get(new_id).is_ok());
    }

    #[test]
    fn test_store_counts_scans() {
        let arena = arena_with(vec![unit(1, 1), unit(2, 1).idle(true)]);
        let mut store = CollectionStore::default();
        let own = store
            .build(&arena, CollectionSource::Registry, builtin::by_owner(PlayerId(1)))
            .unwrap();
        let own = store.register(own);
        let idle = store
            .build(&arena, CollectionSource::Live(own), builtin::is_idle())
            .unwrap();
        assert_eq!(idle.parent(), Some(own));
        assert_eq!(idle.to_entity_array(), vec![EntityId(2)]);

        let snapshot = store
            .build(&arena, CollectionSource::Snapshot(&idle), builtin::by_class("Infantry"))
            .unwrap();
        assert_eq!(snapshot.len(), 1);

        let stats = store.stats();
        assert_eq!(stats.full_scans, 1);
        assert_eq!(stats.derived_scans, 2);
    }

    #[test]
    fn test_notify_entity_changed_respects_selective_flag() {
        let mut arena = arena_with(vec![unit(1, 1)]);
        for selective in [false, true] {
            let config = StoreConfig {
                selective_invalidation: selective,
                ..Default::default()
            };
            let mut store = CollectionStore::new(config);
            let role = store
                .build(&arena, CollectionSource::Registry, builtin::by_metadata(PlayerId(1), "role", "worker"))
                .unwrap();
            let role = store.register(role);
            let idle = store.build(&arena, CollectionSource::Registry, builtin::is_idle()).unwrap();
            store.register(idle);

            arena
                .set_metadata(PlayerId(1), EntityId(1), "role", Some("worker".into()))
                .unwrap();
            let changed = store
                .notify_entity_changed(&arena, EntityId(1), Some("metadata.role"))
                .unwrap();
            assert_eq!(changed, 1);
            assert!(store.get(role).unwrap().contains(EntityId(1)));

            let stats = store.stats();
            if selective {
                assert_eq!((stats.retests, stats.skipped_retests), (1, 1));
            } else {
                assert_eq!((stats.retests, stats.skipped_retests), (2, 0));
            }
            arena.set_metadata(PlayerId(1), EntityId(1), "role", None).unwrap();
        }
    }

    #[test]
    fn test_notify_failure_destroys_only_failing_collection() {
        let mut arena = arena_with(vec![unit(1, 1), unit(2, 1)]);
        let mut store = CollectionStore::default();
        let broken = Filter::try_new("broken", &[], |ent| {
            if ent.is_idle() {
                Err(FilterError::new("idle state unreadable"))
            } else {
                Ok(true)
            }
        });
        let broken = store.build(&arena, CollectionSource::Registry, broken).unwrap();
        let broken = store.register(broken);
        let idle = store.build(&arena, CollectionSource::Registry, builtin::is_idle()).unwrap();
        let idle = store.register(idle);

        arena.set_idle(EntityId(2), true).unwrap();
        let err = store.notify_entity_changed(&arena, EntityId(2), None).unwrap_err();
        assert!(matches!(err, CollectionError::Predicate { entity: EntityId(2), .. }));

        assert_eq!(store.get(broken).unwrap_err(), CollectionError::Destroyed(broken));
        assert_eq!(store.get(idle).unwrap().to_entity_array(), vec![EntityId(2)]);
        assert_eq!(store.live_count(), 1);
    }

    // ------------------------------------------------------------------------
    // CollectionCache
    // ------------------------------------------------------------------------

    #[test]
    fn test_cache_tags_and_prefixes() {
        let arena = arena_with(vec![unit(1, 1), unit(2, 2)]);
        let mut cache = CollectionCache::default();
        let p1 = PlayerId(1);

        cache
            .get_or_create_tagged(&arena, "player-1-enemies", CacheTag::Diplomacy(p1), builtin::by_owner(PlayerId(2)), CollectionSource::Registry)
            .unwrap();
        cache
            .get_or_create(&arena, "player-1-units", builtin::by_class("Unit"), CollectionSource::Registry)
            .unwrap();
        cache
            .get_or_create(&arena, "player-10-units", builtin::by_class("Unit"), CollectionSource::Registry)
            .unwrap();
        assert_eq!(cache.keys(), vec!["player-1-enemies", "player-1-units", "player-10-units"]);

        assert_eq!(cache.reset_by_tag(&CacheTag::Diplomacy(p1)), 1);
        assert_eq!(cache.reset_by_tag(&CacheTag::Diplomacy(p1)), 0);
        assert_eq!(cache.keys(), vec!["player-1-units", "player-10-units"]);

        assert_eq!(cache.reset_by_prefix("player-1-"), 1);
        assert_eq!(cache.keys(), vec!["player-10-units"]);
        assert!(!cache.destroy("unknown"));
    }

    #[test]
    fn test_destroy_collection_by_id_drops_entry() {
        let arena = arena_with(vec![unit(1, 1)]);
        let mut cache = CollectionCache::default();
        let id = cache
            .get_or_create(&arena, "units", builtin::by_class("Unit"), CollectionSource::Registry)
            .unwrap();

        assert!(cache.destroy_collection(id));
        assert!(!cache.destroy_collection(id));
        assert!(cache.lookup("units").is_none());
        assert!(cache.is_empty());

        let rebuilt = cache
            .get_or_create(&arena, "units", builtin::by_class("Unit"), CollectionSource::Registry)
            .unwrap();
        assert_ne!(rebuilt, id);
        assert_eq!(cache.collection("units").unwrap().key(), Some("units"));
    }

    #[test]
    fn test_adhoc_registration_is_not_cached() {
        let arena = arena_with(vec![unit(1, 1)]);
        let mut cache = CollectionCache::default();
        let snapshot = Collection::from_registry(&arena, builtin::by_class("Unit")).unwrap();
        let id = cache.register(snapshot);

        assert!(cache.get(id).unwrap().is_live());
        assert!(cache.keys().is_empty());
        assert_eq!(cache.store().live_count(), 1);
    }

    #[test]
    fn test_manifest_lists_creation_order_and_parents() {
        let arena = arena_with(vec![unit(1, 1).idle(true)]);
        let mut cache = CollectionCache::default();
        let own = cache
            .get_or_create(&arena, "player-1-entities", builtin::by_owner(PlayerId(1)), CollectionSource::Registry)
            .unwrap();
        cache
            .get_or_create(&arena, "player-1-idle", builtin::is_idle(), CollectionSource::Live(own))
            .unwrap();
        cache
            .get_or_create(&arena, "custom", Filter::new("custom", &[], |_| true), CollectionSource::Registry)
            .unwrap();

        let manifest = cache.manifest();
        let keys: Vec<_> = manifest.entries.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["player-1-entities", "player-1-idle", "custom"]);

        let idle = &manifest.entries[1];
        assert_eq!(idle.parent_key.as_deref(), Some("player-1-entities"));
        assert_eq!(idle.filters.as_ref().map(Vec::len), Some(2));
        assert!(idle.is_restorable());
        assert!(!manifest.entries[2].is_restorable());
    }
}
