//! Decision driver - runs the AI once per decision cycle on the fixed schedule.
//!
//! Each fixed tick:
//! - **Ingest**: the arena outbox and diplomacy changes become messages, entity
//!   messages are appended to the pending backlog, diplomacy-tagged collections
//!   of affected players are reset.
//! - **Decide**: if any agent is due, the whole backlog is propagated first and
//!   then every due agent runs against up-to-date collections. If a predicate
//!   fails, the failing collections are dropped and no agent runs that turn.

use bevy::prelude::*;
use peregrine_macros::profile;

use crate::ai::collections::{CacheTag, CollectionCache};
use crate::ai::config::AiConfig;
use crate::ai::diplomacy::Diplomacy;
use crate::ai::entity::PlayerId;
use crate::ai::error::AiError;
use crate::ai::events::{DiplomacyChanged, EntityEvent, EventBatch};
use crate::ai::propagator;
use crate::ai::queries::PlayerQueries;
use crate::ai::registry::EntityArena;

#[derive(SystemSet, Debug, Hash, PartialEq, Eq, Clone)]
pub enum AiSet {
    Ingest,
    Decide,
}

/// Fixed-tick counter for the AI.
#[derive(Resource, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecisionClock {
    pub turn: u64,
    pub cycles_run: u64,
}

/// Entity events received since the last decision cycle.
#[derive(Resource, Debug, Default)]
pub struct PendingEvents(pub EventBatch);

/// A strategy module driven by the decision loop.
pub trait DecisionAgent: Send + Sync + 'static {
    fn player(&self) -> PlayerId;

    fn name(&self) -> &str;

    /// Called once per due cycle, after every pending event has been applied.
    fn on_cycle(&mut self, queries: &mut PlayerQueries<'_>) -> Result<(), AiError>;
}

#[derive(Resource, Default)]
pub struct AiAgents {
    agents: Vec<Box<dyn DecisionAgent>>,
}

impl AiAgents {
    pub fn push(&mut self, agent: impl DecisionAgent) {
        info!("AiAgents: registered `{}` for player {}", agent.name(), agent.player());
        self.agents.push(Box::new(agent));
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

/// Whether `player`'s agent runs on `turn`.
pub fn is_due(config: &AiConfig, turn: u64, player: PlayerId) -> bool {
    let stagger = if config.stagger_by_player { u64::from(player.0) } else { 0 };
    (turn + stagger) % config.cycle_length() == 0
}

pub fn advance_clock(mut clock: ResMut<DecisionClock>) {
    clock.turn += 1;
}

/// Turn queued arena events and stance changes into messages.
pub fn forward_registry_events(
    mut arena: ResMut<EntityArena>,
    mut diplomacy: ResMut<Diplomacy>,
    mut entity_events: MessageWriter<EntityEvent>,
    mut diplomacy_events: MessageWriter<DiplomacyChanged>,
) {
    let batch = arena.drain_events();
    if !batch.is_empty() {
        entity_events.write_batch(batch.iter().cloned());
    }
    for player in diplomacy.drain_changes() {
        diplomacy_events.write(DiplomacyChanged { player });
    }
}

pub fn collect_entity_events(mut events: MessageReader<EntityEvent>, mut pending: ResMut<PendingEvents>) {
    pending.0.extend(events.read().cloned());
}

pub fn reset_diplomacy_collections(mut events: MessageReader<DiplomacyChanged>, mut cache: ResMut<CollectionCache>) {
    for event in events.read() {
        let reset = cache.reset_by_tag(&CacheTag::Diplomacy(event.player));
        if reset > 0 {
            debug!("Diplomacy changed for player {}: reset {} collections", event.player, reset);
        }
    }
}

#[profile(threshold_ms = 4, every = 64)]
pub fn run_decision_cycle(
    mut clock: ResMut<DecisionClock>,
    config: Res<AiConfig>,
    mut arena: ResMut<EntityArena>,
    mut cache: ResMut<CollectionCache>,
    diplomacy: Res<Diplomacy>,
    mut agents: ResMut<AiAgents>,
    mut pending: ResMut<PendingEvents>,
) {
    let turn = clock.turn;
    if !agents.agents.iter().any(|agent| is_due(&config, turn, agent.player())) {
        return;
    }

    let batch = pending.0.take();
    match propagator::apply_batch(cache.store_mut(), &*arena, &batch) {
        Ok(report) => {
            trace!("Decision cycle at turn {}: {:?}", turn, report);
            crate::profile_log!(
                clock,
                every = 64,
                "Propagated {} events ({} retests)",
                report.events,
                report.retests
            );
        }
        Err(e) => {
            error!("Decision cycle at turn {} skipped, failing collections dropped: {}", turn, e);
            return;
        }
    }

    for agent in agents.agents.iter_mut() {
        let player = agent.player();
        if !is_due(&config, turn, player) {
            continue;
        }
        let mut queries = PlayerQueries::new(player, &mut *arena, &mut *cache, &*diplomacy);
        if let Err(e) = agent.on_cycle(&mut queries) {
            error!("Agent `{}` (player {}) failed at turn {}: {}", agent.name(), player, turn, e);
        }
    }

    clock.cycles_run += 1;
    if config.stats_log_interval > 0 && clock.cycles_run % config.stats_log_interval == 0 {
        let stats = cache.store().stats();
        info!(
            "AI stats (turn {}): {} live collections, {} full scans, {} derived, {} retests ({} skipped), +{} -{} ~{}",
            turn,
            cache.store().live_count(),
            stats.full_scans,
            stats.derived_scans,
            stats.retests,
            stats.skipped_retests,
            stats.insertions,
            stats.removals,
            stats.renames
        );
    }
}
