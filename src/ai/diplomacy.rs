//! Per-player diplomatic stances.
//!
//! Player 0 is Gaia. Every player is its own ally; other pairs start as enemies.
//! Stance changes are queued like entity events and turned into
//! [`DiplomacyChanged`](crate::ai::events::DiplomacyChanged) messages by the driver.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::ai::entity::PlayerId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Stance {
    Ally,
    Neutral,
    #[default]
    Enemy,
}

#[derive(Debug, Clone, Default)]
struct PlayerRelations {
    stances: Vec<Stance>,
    defeated: bool,
}

#[derive(Resource, Debug, Clone, Default)]
pub struct Diplomacy {
    players: Vec<PlayerRelations>,
    changed: Vec<PlayerId>,
}

impl Diplomacy {
    /// Gaia plus `players` regular players.
    pub fn new(players: u8) -> Self {
        let count = players as usize + 1;
        let players = (0..count)
            .map(|me| PlayerRelations {
                stances: (0..count)
                    .map(|other| if me == other { Stance::Ally } else { Stance::Enemy })
                    .collect(),
                defeated: false,
            })
            .collect();
        Self {
            players,
            changed: Vec::new(),
        }
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    /// Ids of the regular players (Gaia excluded).
    pub fn players(&self) -> impl Iterator<Item = PlayerId> + '_ {
        (1..self.players.len()).map(|i| PlayerId(i as u8))
    }

    pub fn stance(&self, player: PlayerId, other: PlayerId) -> Stance {
        self.players
            .get(player.index())
            .and_then(|relations| relations.stances.get(other.index()))
            .copied()
            .unwrap_or_default()
    }

    /// Set how `player` regards `other`. Returns false if nothing changed.
    pub fn set_stance(&mut self, player: PlayerId, other: PlayerId, stance: Stance) -> bool {
        if player == other {
            return false;
        }
        self.ensure(player.max(other));
        let slot = &mut self.players[player.index()].stances[other.index()];
        if *slot == stance {
            return false;
        }
        *slot = stance;
        info!("Diplomacy: player {} now regards player {} as {:?}", player, other, stance);
        self.mark_changed(player);
        true
    }

    pub fn set_defeated(&mut self, player: PlayerId) {
        self.ensure(player);
        let relations = &mut self.players[player.index()];
        if relations.defeated {
            return;
        }
        relations.defeated = true;
        info!("Diplomacy: player {} defeated", player);
        let everyone: Vec<PlayerId> = self.players().collect();
        for other in everyone {
            self.mark_changed(other);
        }
    }

    pub fn is_defeated(&self, player: PlayerId) -> bool {
        self.players.get(player.index()).is_some_and(|p| p.defeated)
    }

    pub fn is_ally(&self, player: PlayerId, other: PlayerId) -> bool {
        self.stance(player, other) == Stance::Ally
    }

    pub fn is_enemy(&self, player: PlayerId, other: PlayerId) -> bool {
        self.stance(player, other) == Stance::Enemy
    }

    pub fn is_neutral(&self, player: PlayerId, other: PlayerId) -> bool {
        self.stance(player, other) == Stance::Neutral
    }

    pub fn is_mutual_ally(&self, player: PlayerId, other: PlayerId) -> bool {
        self.is_ally(player, other) && self.is_ally(other, player)
    }

    /// Allies of `player`, itself included.
    pub fn allies(&self, player: PlayerId) -> Vec<PlayerId> {
        self.all_with(|other| self.is_ally(player, other))
    }

    pub fn exclusive_allies(&self, player: PlayerId) -> Vec<PlayerId> {
        self.all_with(|other| other != player && self.is_ally(player, other))
    }

    pub fn mutual_allies(&self, player: PlayerId) -> Vec<PlayerId> {
        self.all_with(|other| self.is_mutual_ally(player, other))
    }

    /// Enemies of `player`, Gaia included.
    pub fn enemies(&self, player: PlayerId) -> Vec<PlayerId> {
        self.all_with(|other| self.is_enemy(player, other))
    }

    pub fn neutrals(&self, player: PlayerId) -> Vec<PlayerId> {
        self.all_with(|other| self.is_neutral(player, other))
    }

    /// Whether `player` has an undefeated ally other than itself.
    pub fn has_allies(&self, player: PlayerId) -> bool {
        self.players()
            .any(|other| other != player && self.is_ally(player, other) && !self.is_defeated(other))
    }

    /// Whether `player` has an undefeated enemy, Gaia not counted.
    pub fn has_enemies(&self, player: PlayerId) -> bool {
        self.players()
            .any(|other| self.is_enemy(player, other) && !self.is_defeated(other))
    }

    /// Players whose stances changed since the last call.
    pub fn drain_changes(&mut self) -> Vec<PlayerId> {
        std::mem::take(&mut self.changed)
    }

    fn all_with(&self, mut pred: impl FnMut(PlayerId) -> bool) -> Vec<PlayerId> {
        (0..self.players.len())
            .map(|i| PlayerId(i as u8))
            .filter(|&other| pred(other))
            .collect()
    }

    fn mark_changed(&mut self, player: PlayerId) {
        if !self.changed.contains(&player) {
            self.changed.push(player);
        }
    }

    fn ensure(&mut self, player: PlayerId) {
        let count = player.index() + 1;
        if self.players.len() >= count {
            return;
        }
        let old = std::mem::replace(self, Self::new(player.0));
        for (me, relations) in old.players.into_iter().enumerate() {
            self.players[me].defeated = relations.defeated;
            for (other, stance) in relations.stances.into_iter().enumerate() {
                self.players[me].stances[other] = stance;
            }
        }
        self.changed = old.changed;
    }
}
