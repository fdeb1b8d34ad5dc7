use std::path::Path;

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::ai::collections::{StoreConfig, SweepConfig};

pub const AI_CONFIG_PATH: &str = "assets/ai_config.ron";

/// Static AI configuration loaded once at startup. These values change the order
/// and frequency of decisions, so they must not change mid-game.
#[derive(Resource, Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct AiConfig {
    // Scheduling
    pub tick_rate: f64,
    pub turns_per_cycle: u32,
    pub stagger_by_player: bool,

    // Collections
    pub selective_invalidation: bool,
    pub member_sweep_ratio: f32,
    pub member_sweep_min: usize,

    // Diagnostics (0 disables)
    pub stats_log_interval: u64,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            tick_rate: 30.0,
            turns_per_cycle: 8,
            stagger_by_player: true,
            selective_invalidation: false,
            member_sweep_ratio: 0.25,
            member_sweep_min: 32,
            stats_log_interval: 50,
        }
    }
}

impl AiConfig {
    /// Read `path`, falling back to defaults (with an error log) when it is
    /// missing or malformed.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(contents) => match ron::from_str::<AiConfig>(&contents) {
                Ok(config) => {
                    info!("Loaded AI config from {}", path.display());
                    config
                }
                Err(e) => {
                    error!("Failed to parse AI config: {}", e);
                    error!("Using default AiConfig");
                    Self::default()
                }
            },
            Err(e) => {
                error!("Failed to read {}: {}", path.display(), e);
                error!("Using default AiConfig");
                Self::default()
            }
        }
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            sweep: SweepConfig {
                ratio: self.member_sweep_ratio,
                min_tombstones: self.member_sweep_min,
            },
            selective_invalidation: self.selective_invalidation,
        }
    }

    /// Fixed tick rate in Hz. Zero, negative or non-finite rates fall back to the default.
    pub fn tick_hz(&self) -> f64 {
        if self.tick_rate.is_finite() && self.tick_rate > 0.0 {
            self.tick_rate
        } else {
            Self::default().tick_rate
        }
    }

    /// Cycle length, never zero.
    pub fn cycle_length(&self) -> u64 {
        u64::from(self.turns_per_cycle.max(1))
    }
}
