use std::sync::{Arc, Mutex};

use bevy::prelude::*;
use peregrine_ai::ai::collections::{CollectionCache, CollectionSource};
use peregrine_ai::ai::config::AiConfig;
use peregrine_ai::ai::diplomacy::{Diplomacy, Stance};
use peregrine_ai::ai::driver::{is_due, AiAgents, DecisionAgent, DecisionClock, PendingEvents};
use peregrine_ai::ai::entity::{EntityId, PlayerId};
use peregrine_ai::ai::error::{AiError, FilterError};
use peregrine_ai::ai::events::EntityEvent;
use peregrine_ai::ai::filter::Filter;
use peregrine_ai::ai::queries::PlayerQueries;
use peregrine_ai::ai::registry::{EntityArena, EntityRecord};
use peregrine_ai::ai::AiPlugin;

type Log = Arc<Mutex<Vec<(PlayerId, u64, usize)>>>;

/// Records (player, agent cycle number, own unit count) per cycle.
struct RecordingAgent {
    player: PlayerId,
    cycles: u64,
    log: Log,
}

impl DecisionAgent for RecordingAgent {
    fn player(&self) -> PlayerId {
        self.player
    }

    fn name(&self) -> &str {
        "recorder"
    }

    fn on_cycle(&mut self, queries: &mut PlayerQueries<'_>) -> Result<(), AiError> {
        self.cycles += 1;
        let units = queries.own_units()?;
        let count = queries.collection(units)?.len();
        self.log.lock().unwrap().push((self.player, self.cycles, count));
        Ok(())
    }
}

struct FailingAgent;

impl DecisionAgent for FailingAgent {
    fn player(&self) -> PlayerId {
        PlayerId(2)
    }

    fn name(&self) -> &str {
        "failing"
    }

    fn on_cycle(&mut self, queries: &mut PlayerQueries<'_>) -> Result<(), AiError> {
        queries.set_metadata(EntityId(9999), "role", None)?;
        Ok(())
    }
}

fn test_config(turns_per_cycle: u32, stagger_by_player: bool) -> AiConfig {
    AiConfig {
        turns_per_cycle,
        stagger_by_player,
        stats_log_interval: 0,
        ..Default::default()
    }
}

fn setup_app(config: AiConfig) -> App {
    let mut app = App::new();
    app.add_plugins(MinimalPlugins);
    app.add_plugins(AiPlugin::with_config(config).with_players(2));
    app.update();
    app
}

fn recorder(app: &mut App, player: u8) -> Log {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    app.world_mut().resource_mut::<AiAgents>().push(RecordingAgent {
        player: PlayerId(player),
        cycles: 0,
        log: log.clone(),
    });
    log
}

fn unit(id: u32, owner: u8) -> EntityRecord {
    EntityRecord::new(EntityId(id), PlayerId(owner), "units/spearman").with_classes(&["Unit"])
}

fn run_turns(app: &mut App, turns: usize) {
    for _ in 0..turns {
        app.world_mut().run_schedule(FixedUpdate);
    }
}

#[test]
fn test_due_rule_staggers_players() {
    let config = test_config(4, true);
    let due: Vec<u64> = (1..=8).filter(|&turn| is_due(&config, turn, PlayerId(1))).collect();
    assert_eq!(due, vec![3, 7]);
    let due: Vec<u64> = (1..=8).filter(|&turn| is_due(&config, turn, PlayerId(2))).collect();
    assert_eq!(due, vec![2, 6]);

    let flat = test_config(4, false);
    assert!(is_due(&flat, 4, PlayerId(1)) && is_due(&flat, 4, PlayerId(2)));

    let zero = test_config(0, false);
    assert!(is_due(&zero, 5, PlayerId(1)));
}

#[test]
fn test_agents_run_on_their_turns() {
    let mut app = setup_app(test_config(4, true));
    let log1 = recorder(&mut app, 1);
    let log2 = recorder(&mut app, 2);

    run_turns(&mut app, 8);

    assert_eq!(app.world().resource::<DecisionClock>().turn, 8);
    assert_eq!(app.world().resource::<DecisionClock>().cycles_run, 4);
    assert_eq!(log1.lock().unwrap().len(), 2);
    assert_eq!(log2.lock().unwrap().len(), 2);
}

#[test]
fn test_agents_see_all_events_before_deciding() {
    let mut app = setup_app(test_config(2, false));
    let log = recorder(&mut app, 1);

    {
        let mut arena = app.world_mut().resource_mut::<EntityArena>();
        arena.spawn(unit(1, 1)).unwrap();
        arena.spawn(unit(2, 1)).unwrap();
        arena.spawn(unit(3, 2)).unwrap();
    }
    run_turns(&mut app, 1);
    // Not due yet: events wait in the backlog
    assert_eq!(app.world().resource::<PendingEvents>().0.len(), 3);
    assert!(log.lock().unwrap().is_empty());

    {
        let mut arena = app.world_mut().resource_mut::<EntityArena>();
        arena.destroy(EntityId(2)).unwrap();
        arena.set_owner(EntityId(3), PlayerId(1)).unwrap();
    }
    run_turns(&mut app, 1);
    assert!(app.world().resource::<PendingEvents>().0.is_empty());
    assert_eq!(log.lock().unwrap().as_slice(), &[(PlayerId(1), 1, 2)]);

    {
        let mut arena = app.world_mut().resource_mut::<EntityArena>();
        arena.spawn(unit(4, 1)).unwrap();
    }
    run_turns(&mut app, 2);
    assert_eq!(log.lock().unwrap().last(), Some(&(PlayerId(1), 2, 3)));
}

#[test]
fn test_external_entity_messages_are_applied() {
    let mut app = setup_app(test_config(1, false));
    let log = recorder(&mut app, 1);
    run_turns(&mut app, 1);
    assert_eq!(log.lock().unwrap().last(), Some(&(PlayerId(1), 1, 0)));

    // A simulation with its own command layer writes messages directly
    app.world_mut()
        .resource_mut::<EntityArena>()
        .spawn(unit(5, 1))
        .unwrap();
    app.world_mut().resource_mut::<EntityArena>().drain_events();
    app.world_mut().write_message(EntityEvent::Create { entity: EntityId(5) });
    run_turns(&mut app, 1);

    assert_eq!(log.lock().unwrap().last(), Some(&(PlayerId(1), 2, 1)));
}

#[test]
fn test_diplomacy_change_resets_tagged_collections() {
    let mut app = setup_app(test_config(1, false));
    app.world_mut()
        .resource_mut::<EntityArena>()
        .spawn(
            EntityRecord::new(EntityId(1), PlayerId(2), "structures/house").with_classes(&["Structure"]),
        )
        .unwrap();
    run_turns(&mut app, 1);

    let enemy_structures = {
        let world = app.world_mut();
        world.resource_scope(|world, mut arena: Mut<EntityArena>| {
            world.resource_scope(|world, mut cache: Mut<CollectionCache>| {
                let diplomacy = world.resource::<Diplomacy>();
                let mut queries = PlayerQueries::new(PlayerId(1), &mut arena, &mut cache, diplomacy);
                let id = queries.enemy_structures(None).unwrap();
                assert_eq!(queries.collection(id).unwrap().len(), 1);
                id
            })
        })
    };

    app.world_mut()
        .resource_mut::<Diplomacy>()
        .set_stance(PlayerId(1), PlayerId(2), Stance::Ally);
    run_turns(&mut app, 1);

    let cache = app.world().resource::<CollectionCache>();
    assert!(cache.get(enemy_structures).is_err());
    assert!(cache.lookup("player-1-diplo-enemy-structures").is_none());
}

#[test]
fn test_failing_agent_does_not_stop_others() {
    let mut app = setup_app(test_config(1, false));
    app.world_mut().resource_mut::<AiAgents>().push(FailingAgent);
    let log = recorder(&mut app, 1);

    run_turns(&mut app, 3);

    assert_eq!(log.lock().unwrap().len(), 3);
    assert_eq!(app.world().resource::<DecisionClock>().cycles_run, 3);
}

#[test]
fn test_propagation_error_skips_the_cycle() {
    let mut app = setup_app(test_config(1, false));
    let log = recorder(&mut app, 1);
    run_turns(&mut app, 1);
    assert_eq!(log.lock().unwrap().as_slice(), &[(PlayerId(1), 1, 0)]);

    let strict = {
        let world = app.world_mut();
        world.resource_scope(|world, mut cache: Mut<CollectionCache>| {
            let arena = world.resource::<EntityArena>();
            let strict = Filter::try_new("strict", &[], |ent| {
                if ent.template_name() == "units/broken" {
                    Err(FilterError::new("unreadable template"))
                } else {
                    Ok(true)
                }
            });
            cache
                .get_or_create(arena, "strict", strict, CollectionSource::Registry)
                .unwrap()
        })
    };

    // The valid unit arrives in the same batch, after the failing entity
    {
        let mut arena = app.world_mut().resource_mut::<EntityArena>();
        arena
            .spawn(EntityRecord::new(EntityId(1), PlayerId(1), "units/broken"))
            .unwrap();
        arena.spawn(unit(2, 1)).unwrap();
    }
    run_turns(&mut app, 1);
    assert_eq!(log.lock().unwrap().len(), 1);
    assert_eq!(app.world().resource::<DecisionClock>().cycles_run, 1);

    let cache = app.world().resource::<CollectionCache>();
    assert!(cache.get(strict).is_err());
    assert!(cache.lookup("strict").is_none());
    let own_units = cache.collection("player-1-units").unwrap();
    assert_eq!(own_units.to_entity_array(), vec![EntityId(2)]);

    run_turns(&mut app, 2);
    assert_eq!(
        log.lock().unwrap().as_slice(),
        &[(PlayerId(1), 1, 0), (PlayerId(1), 2, 1), (PlayerId(1), 3, 1)]
    );
}

#[test]
fn test_zero_tick_rate_uses_default_timestep() {
    let config = AiConfig {
        tick_rate: 0.0,
        ..test_config(1, false)
    };
    let app = setup_app(config);
    let expected = Time::<Fixed>::from_hz(AiConfig::default().tick_rate).timestep();
    assert_eq!(app.world().resource::<Time<Fixed>>().timestep(), expected);
}
