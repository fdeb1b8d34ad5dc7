//! Entity lifecycle events consumed by the AI once per decision cycle.
//!
//! The simulation emits these as Bevy messages; the driver accumulates them into
//! an [`EventBatch`] backlog which the propagator applies in order.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::ai::entity::{EntityId, PlayerId};

// ============================================================================
// Entity Events
// ============================================================================

#[derive(Message, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityEvent {
    Create { entity: EntityId },
    Destroy { entity: EntityId },
    OwnershipChanged { entity: EntityId, from: PlayerId, to: PlayerId },
    /// A component value changed, e.g. `UnitAI` / `["idle"]`.
    ValueModification { entity: EntityId, component: String, value_names: Vec<String> },
    /// The entity continues under a new id (promotion, upgrade).
    EntityRenamed { entity: EntityId, new_entity: EntityId },
}

impl EntityEvent {
    /// The entity id this event refers to (the old id for renames).
    pub fn entity(&self) -> EntityId {
        match self {
            EntityEvent::Create { entity }
            | EntityEvent::Destroy { entity }
            | EntityEvent::OwnershipChanged { entity, .. }
            | EntityEvent::ValueModification { entity, .. }
            | EntityEvent::EntityRenamed { entity, .. } => *entity,
        }
    }
}

// ============================================================================
// Diplomacy Events
// ============================================================================

/// A player's stance towards someone changed. Collections tagged with that
/// player's diplomacy scope are reset before the next decision.
#[derive(Message, Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiplomacyChanged {
    pub player: PlayerId,
}

// ============================================================================
// Event Batch
// ============================================================================

/// Ordered batch of entity events delivered for one decision cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventBatch {
    events: Vec<EntityEvent>,
}

impl EventBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: EntityEvent) {
        self.events.push(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EntityEvent> {
        self.events.iter()
    }

    /// Move the whole backlog out, leaving an empty batch behind.
    pub fn take(&mut self) -> EventBatch {
        std::mem::take(self)
    }
}

impl Extend<EntityEvent> for EventBatch {
    fn extend<I: IntoIterator<Item = EntityEvent>>(&mut self, iter: I) {
        self.events.extend(iter);
    }
}

impl FromIterator<EntityEvent> for EventBatch {
    fn from_iter<I: IntoIterator<Item = EntityEvent>>(iter: I) -> Self {
        Self { events: iter.into_iter().collect() }
    }
}
