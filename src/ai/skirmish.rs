//! Skirmish sandbox: a seeded stand-in for the simulation.
//!
//! Spawns a small map into the [`EntityArena`] and then mutates it every fixed
//! tick (training, deaths, captures, promotions, construction, garrisoning) so the
//! collection cache sees a realistic event stream. The same seed always produces
//! the same stream.

use bevy::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::ai::collections::CollectionSource;
use crate::ai::driver::{AiAgents, AiSet, DecisionAgent};
use crate::ai::entity::{EntityId, EntityView, MetadataValue, PlayerId, ResourceType};
use crate::ai::error::AiError;
use crate::ai::filter::builtin;
use crate::ai::fixed_math::FixedVec2;
use crate::ai::queries::PlayerQueries;
use crate::ai::registry::{EntityArena, EntityRecord, EntityRegistry};

pub const WORKER_TEMPLATE: &str = "units/athen/infantry_worker";
pub const CHAMPION_TEMPLATE: &str = "units/athen/champion_infantry";
pub const CIVIC_CENTRE_TEMPLATE: &str = "structures/athen/civil_centre";
pub const HOUSE_TEMPLATE: &str = "structures/athen/house";

#[derive(Resource)]
pub struct SkirmishRng(pub StdRng);

#[derive(Resource, Debug, Clone, Copy, PartialEq, Eq)]
pub struct SkirmishSettings {
    pub players: u8,
    pub workers_per_player: usize,
    pub trees: usize,
    pub animals: usize,
    pub fish: usize,
    /// Random mutations applied per fixed tick.
    pub churn_per_tick: usize,
}

impl Default for SkirmishSettings {
    fn default() -> Self {
        Self {
            players: 2,
            workers_per_player: 8,
            trees: 40,
            animals: 12,
            fish: 6,
            churn_per_tick: 3,
        }
    }
}

pub struct SkirmishPlugin {
    pub seed: u64,
    pub settings: SkirmishSettings,
    /// Register one [`GathererAgent`] per player.
    pub with_agents: bool,
}

impl SkirmishPlugin {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            settings: SkirmishSettings::default(),
            with_agents: true,
        }
    }
}

impl Plugin for SkirmishPlugin {
    fn build(&self, app: &mut App) {
        app.insert_resource(SkirmishRng(StdRng::seed_from_u64(self.seed)))
            .insert_resource(self.settings)
            .add_systems(Startup, setup_skirmish)
            .add_systems(FixedUpdate, churn_entities.before(AiSet::Ingest));

        if self.with_agents {
            let mut agents = AiAgents::default();
            for player in 1..=self.settings.players {
                agents.push(GathererAgent::new(PlayerId(player)));
            }
            app.insert_resource(agents);
        }
    }
}

pub fn setup_skirmish(
    settings: Res<SkirmishSettings>,
    mut rng: ResMut<SkirmishRng>,
    mut arena: ResMut<EntityArena>,
) {
    if let Err(e) = populate(&mut arena, &settings, &mut rng.0) {
        error!("Skirmish setup failed: {}", e);
        return;
    }
    info!(
        "Skirmish setup: {} players, {} entities",
        settings.players,
        arena.len()
    );
}

/// Fill `arena` with a starting map. Deterministic for a given rng state.
pub fn populate(arena: &mut EntityArena, settings: &SkirmishSettings, rng: &mut StdRng) -> Result<(), AiError> {
    for player in 1..=settings.players {
        let owner = PlayerId(player);
        let base = 200.0 * player as f32;
        let id = arena.allocate_id();
        arena.spawn(
            EntityRecord::new(id, owner, CIVIC_CENTRE_TEMPLATE)
                .with_classes(&["Structure", "CivCentre", "Town"])
                .at(base, base)
                .with_training_queue()
                .with_garrison_capacity(20)
                .with_defensive_fire()
                .dropsite_for(&["food", "wood", "stone", "metal"]),
        )?;
        for _ in 0..settings.workers_per_player {
            let x = base + rng.random_range(-20.0..20.0);
            let y = base + rng.random_range(-20.0..20.0);
            spawn_worker(arena, owner, x, y)?;
        }
    }

    for _ in 0..settings.trees {
        let id = arena.allocate_id();
        let (x, y) = random_point(rng);
        arena.spawn(
            EntityRecord::new(id, PlayerId::GAIA, "gaia/tree/oak")
                .with_classes(&["Tree"])
                .at(x, y)
                .with_supply(200, ResourceType::new("wood", "tree")),
        )?;
    }
    for i in 0..settings.animals {
        let id = arena.allocate_id();
        let (x, y) = random_point(rng);
        let mut record = EntityRecord::new(id, PlayerId::GAIA, "gaia/fauna_deer")
            .with_classes(&["Animal"])
            .at(x, y)
            .with_unit_motion()
            .with_supply(100, ResourceType::new("food", "meat"));
        if i % 4 == 3 {
            record = record.dangerous();
        }
        arena.spawn(record)?;
    }
    for _ in 0..settings.fish {
        let id = arena.allocate_id();
        let (x, y) = random_point(rng);
        arena.spawn(
            EntityRecord::new(id, PlayerId::GAIA, "gaia/fish/tuna")
                .with_classes(&["SeaCreature"])
                .at(x, y)
                .with_supply(1000, ResourceType::new("food", "fish")),
        )?;
    }
    Ok(())
}

fn spawn_worker(arena: &mut EntityArena, owner: PlayerId, x: f32, y: f32) -> Result<EntityId, AiError> {
    let id = arena.allocate_id();
    Ok(arena.spawn(
        EntityRecord::new(id, owner, WORKER_TEMPLATE)
            .with_classes(&["Unit", "Worker", "Infantry"])
            .at(x, y)
            .idle(true)
            .with_unit_motion(),
    )?)
}

fn random_point(rng: &mut StdRng) -> (f32, f32) {
    (rng.random_range(0.0..1000.0), rng.random_range(0.0..1000.0))
}

/// Apply `churn_per_tick` random mutations to the arena.
pub fn churn_entities(
    settings: Res<SkirmishSettings>,
    mut rng: ResMut<SkirmishRng>,
    mut arena: ResMut<EntityArena>,
) {
    for _ in 0..settings.churn_per_tick {
        if let Err(e) = churn_once(&mut arena, &settings, &mut rng.0) {
            warn!("Skirmish churn failed: {}", e);
        }
    }
}

fn churn_once(arena: &mut EntityArena, settings: &SkirmishSettings, rng: &mut StdRng) -> Result<(), AiError> {
    let ids: Vec<EntityId> = arena.entities().map(|ent| ent.id()).collect();
    if ids.is_empty() {
        return Ok(());
    }
    let target = ids[rng.random_range(0..ids.len())];
    let Some(record) = arena.record(target) else {
        return Ok(());
    };
    let owner = record.owner();
    let is_worker = record.template_name() == WORKER_TEMPLATE;

    match rng.random_range(0..100) {
        // Train a worker for a random player.
        0..=19 => {
            let player = PlayerId(rng.random_range(1..=settings.players));
            let base = 200.0 * player.0 as f32;
            spawn_worker(arena, player, base, base)?;
        }
        // Death.
        20..=29 => {
            if owner != PlayerId::GAIA || rng.random_bool(0.3) {
                arena.destroy(target)?;
            }
        }
        // Workers go idle or back to work.
        30..=59 => {
            if is_worker {
                arena.set_idle(target, rng.random_bool(0.5))?;
            }
        }
        // Capture.
        60..=67 => {
            if owner != PlayerId::GAIA {
                let to = PlayerId(rng.random_range(1..=settings.players));
                arena.set_owner(target, to)?;
            }
        }
        // Promotion keeps the entity under a new id.
        68..=74 => {
            if is_worker {
                let new_id = arena.allocate_id();
                arena.rename(target, new_id, Some(CHAMPION_TEMPLATE))?;
            }
        }
        // Lay or finish a house foundation.
        75..=87 => {
            let foundation = arena
                .entities()
                .find(|ent| ent.foundation_progress().is_some())
                .map(|ent| ent.id());
            match foundation {
                Some(id) => arena.set_foundation_progress(id, None)?,
                None if owner != PlayerId::GAIA => {
                    let id = arena.allocate_id();
                    let base = 200.0 * owner.0 as f32;
                    arena.spawn(
                        EntityRecord::new(id, owner, HOUSE_TEMPLATE)
                            .with_classes(&["Structure", "House"])
                            .at(base + 30.0, base - 30.0)
                            .as_foundation(0),
                    )?;
                }
                None => {}
            }
        }
        // Garrison or ungarrison.
        _ => {
            if is_worker {
                let position = match arena.record(target).and_then(|r| r.position()) {
                    Some(_) => None,
                    None => Some(FixedVec2::from_f32(200.0 * owner.0 as f32, 200.0 * owner.0 as f32)),
                };
                arena.set_position(target, position)?;
            }
        }
    }
    Ok(())
}

// ============================================================================
// Gatherer Agent
// ============================================================================

/// Sample strategy module: assigns idle workers to the nearest wood and keeps
/// per-role head counts.
#[derive(Debug, Clone)]
pub struct GathererAgent {
    player: PlayerId,
    pub assignments: u64,
    pub cycles: u64,
}

impl GathererAgent {
    pub fn new(player: PlayerId) -> Self {
        Self {
            player,
            assignments: 0,
            cycles: 0,
        }
    }
}

impl DecisionAgent for GathererAgent {
    fn player(&self) -> PlayerId {
        self.player
    }

    fn name(&self) -> &str {
        "gatherer"
    }

    fn on_cycle(&mut self, queries: &mut PlayerQueries<'_>) -> Result<(), AiError> {
        self.cycles += 1;
        let workers = queries.own_entities_by_class("Worker")?;
        let idle = queries.updating_collection("idle-workers", builtin::is_idle(), CollectionSource::Live(workers))?;
        let wood = queries.resource_supplies("wood")?;

        let idle_workers = queries.collection(idle)?.to_entity_array();
        for worker in idle_workers {
            if queries.metadata(worker, "role").is_some() {
                continue;
            }
            let Some(position) = queries.registry().get(worker).and_then(|ent| ent.position()) else {
                continue;
            };
            let Some(tree) = queries.nearest(wood, position, Some(1))?.values().next() else {
                break;
            };
            queries.set_metadata(worker, "role", Some(MetadataValue::from("gatherer")))?;
            queries.set_metadata(worker, "target", Some(MetadataValue::Int(i64::from(tree.0))))?;
            self.assignments += 1;
        }

        let gatherers = queries.count_own_entities_by_role("gatherer")?;
        let houses = queries.count_foundations_by_type(HOUSE_TEMPLATE)?;
        debug!(
            "Gatherer (player {}): {} gatherers, {} house foundations",
            self.player, gatherers, houses
        );
        Ok(())
    }
}
