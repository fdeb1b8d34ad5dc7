use bevy::prelude::*;

pub mod collections;
pub mod config;
pub mod diplomacy;
pub mod driver;
pub mod entity;
pub mod error;
pub mod events;
pub mod filter;
pub mod fixed_math;
pub mod persistence;
pub mod propagator;
pub mod queries;
pub mod registry;
pub mod skirmish;

use collections::CollectionCache;
use config::{AiConfig, AI_CONFIG_PATH};
use diplomacy::Diplomacy;
use driver::{AiAgents, AiSet, DecisionClock, PendingEvents};
use events::{DiplomacyChanged, EntityEvent};
use registry::EntityArena;

/// Wires the collection cache and the decision loop into an app.
pub struct AiPlugin {
    config: Option<AiConfig>,
    players: u8,
}

impl Default for AiPlugin {
    fn default() -> Self {
        Self { config: None, players: 2 }
    }
}

impl AiPlugin {
    /// Use `config` instead of reading `assets/ai_config.ron`.
    pub fn with_config(config: AiConfig) -> Self {
        Self {
            config: Some(config),
            ..Default::default()
        }
    }

    pub fn with_players(mut self, players: u8) -> Self {
        self.players = players;
        self
    }
}

impl Plugin for AiPlugin {
    fn build(&self, app: &mut App) {
        let config = self
            .config
            .clone()
            .unwrap_or_else(|| AiConfig::load_or_default(AI_CONFIG_PATH));

        app.insert_resource(Time::<Fixed>::from_hz(config.tick_hz()));
        app.insert_resource(CollectionCache::new(config.store_config()));
        app.insert_resource(config);
        app.init_resource::<EntityArena>();
        app.insert_resource(Diplomacy::new(self.players));
        app.init_resource::<DecisionClock>();
        app.init_resource::<PendingEvents>();
        app.init_resource::<AiAgents>();

        app.add_message::<EntityEvent>();
        app.add_message::<DiplomacyChanged>();

        app.configure_sets(FixedUpdate, (AiSet::Ingest, AiSet::Decide).chain());

        app.add_systems(
            FixedUpdate,
            (
                driver::advance_clock,
                driver::forward_registry_events,
                driver::collect_entity_events,
                driver::reset_diplomacy_collections,
            )
                .chain()
                .in_set(AiSet::Ingest),
        );
        app.add_systems(FixedUpdate, driver::run_decision_cycle.in_set(AiSet::Decide));
    }
}
