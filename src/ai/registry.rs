//! Entity registry: the AI's read capability over all simulation entities.
//!
//! [`EntityRegistry`] is the seam the query layer reads through. [`EntityArena`]
//! is the in-process implementation: records addressed by integer id, iterated
//! in insertion order, whose mutators play the role of the external command
//! layer and queue the matching [`EntityEvent`]s in an outbox.

use bevy::prelude::*;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::ai::entity::{EntityId, EntityView, MetadataValue, PlayerId, ResourceType};
use crate::ai::error::RegistryError;
use crate::ai::events::{EntityEvent, EventBatch};
use crate::ai::fixed_math::FixedVec2;

pub trait EntityRegistry {
    /// Lookup by id. Unknown ids are a benign miss.
    fn get(&self, id: EntityId) -> Option<&dyn EntityView>;

    /// All entities in a deterministic order.
    fn entities(&self) -> Box<dyn Iterator<Item = &dyn EntityView> + '_>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// Entity Record
// ============================================================================

/// Plain entity data as the arena stores it.
#[derive(Debug, Clone)]
pub struct EntityRecord {
    id: EntityId,
    owner: PlayerId,
    template: String,
    classes: SmallVec<[String; 4]>,
    metadata: FxHashMap<(PlayerId, String), MetadataValue>,
    position: Option<FixedVec2>,
    idle: bool,
    garrison_max: u32,
    training_queue: bool,
    attack_classes: SmallVec<[String; 2]>,
    foundation_progress: Option<u8>,
    defensive_fire: bool,
    dropsite_for: SmallVec<[String; 2]>,
    treasure: bool,
    supply_max: u32,
    supply_type: Option<ResourceType>,
    huntable: bool,
    unit_motion: bool,
}

impl EntityRecord {
    pub fn new(id: EntityId, owner: PlayerId, template: impl Into<String>) -> Self {
        Self {
            id,
            owner,
            template: template.into(),
            classes: SmallVec::new(),
            metadata: FxHashMap::default(),
            position: Some(FixedVec2::ZERO),
            idle: false,
            garrison_max: 0,
            training_queue: false,
            attack_classes: SmallVec::new(),
            foundation_progress: None,
            defensive_fire: false,
            dropsite_for: SmallVec::new(),
            treasure: false,
            supply_max: 0,
            supply_type: None,
            huntable: true,
            unit_motion: false,
        }
    }

    pub fn with_classes(mut self, classes: &[&str]) -> Self {
        self.classes.extend(classes.iter().map(|c| c.to_string()));
        self
    }

    pub fn at(mut self, x: f32, y: f32) -> Self {
        self.position = Some(FixedVec2::from_f32(x, y));
        self
    }

    pub fn garrisoned(mut self) -> Self {
        self.position = None;
        self
    }

    pub fn idle(mut self, idle: bool) -> Self {
        self.idle = idle;
        self
    }

    pub fn with_garrison_capacity(mut self, max: u32) -> Self {
        self.garrison_max = max;
        self
    }

    pub fn with_training_queue(mut self) -> Self {
        self.training_queue = true;
        self
    }

    pub fn with_attack_classes(mut self, classes: &[&str]) -> Self {
        self.attack_classes.extend(classes.iter().map(|c| c.to_string()));
        self
    }

    pub fn as_foundation(mut self, progress: u8) -> Self {
        self.foundation_progress = Some(progress);
        self
    }

    pub fn with_defensive_fire(mut self) -> Self {
        self.defensive_fire = true;
        self
    }

    pub fn dropsite_for(mut self, resources: &[&str]) -> Self {
        self.dropsite_for.extend(resources.iter().map(|r| r.to_string()));
        self
    }

    pub fn as_treasure(mut self) -> Self {
        self.treasure = true;
        self
    }

    pub fn with_supply(mut self, max: u32, kind: ResourceType) -> Self {
        self.supply_max = max;
        self.supply_type = Some(kind);
        self
    }

    /// Too dangerous to hunt (e.g. elephants, lions).
    pub fn dangerous(mut self) -> Self {
        self.huntable = false;
        self
    }

    pub fn with_unit_motion(mut self) -> Self {
        self.unit_motion = true;
        self
    }

    pub fn with_metadata(mut self, player: PlayerId, key: &str, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert((player, key.to_string()), value.into());
        self
    }
}

impl EntityView for EntityRecord {
    fn id(&self) -> EntityId {
        self.id
    }

    fn owner(&self) -> PlayerId {
        self.owner
    }

    fn template_name(&self) -> &str {
        &self.template
    }

    fn has_class(&self, class: &str) -> bool {
        self.classes.iter().any(|c| c == class)
    }

    fn metadata(&self, player: PlayerId, key: &str) -> Option<&MetadataValue> {
        self.metadata.get(&(player, key.to_string()))
    }

    fn position(&self) -> Option<FixedVec2> {
        self.position
    }

    fn is_idle(&self) -> bool {
        self.idle
    }

    fn garrison_max(&self) -> u32 {
        self.garrison_max
    }

    fn has_training_queue(&self) -> bool {
        self.training_queue
    }

    fn can_attack_class(&self, class: &str) -> bool {
        self.attack_classes.iter().any(|c| c == class)
    }

    fn classes(&self) -> &[String] {
        &self.classes
    }

    fn foundation_progress(&self) -> Option<u8> {
        self.foundation_progress
    }

    fn has_defensive_fire(&self) -> bool {
        self.defensive_fire
    }

    fn is_resource_dropsite(&self, resource: Option<&str>) -> bool {
        match resource {
            Some(resource) => self.dropsite_for.iter().any(|r| r == resource),
            None => !self.dropsite_for.is_empty(),
        }
    }

    fn is_treasure(&self) -> bool {
        self.treasure
    }

    fn resource_supply_max(&self) -> u32 {
        self.supply_max
    }

    fn resource_supply_type(&self) -> Option<&ResourceType> {
        self.supply_type.as_ref()
    }

    fn is_huntable(&self) -> bool {
        self.huntable
    }

    fn has_unit_motion(&self) -> bool {
        self.unit_motion
    }
}

// ============================================================================
// Entity Arena
// ============================================================================

/// Arena of entity records addressed by integer id.
///
/// Slots are never reused while live, so iteration follows spawn order. Holes
/// left by destroyed entities are compacted once they outnumber live records.
#[derive(Resource, Default)]
pub struct EntityArena {
    slots: Vec<Option<EntityRecord>>,
    index: FxHashMap<EntityId, usize>,
    holes: usize,
    next_id: u32,
    outbox: Vec<EntityEvent>,
}

impl EntityArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh id above every id handed out so far.
    pub fn allocate_id(&mut self) -> EntityId {
        self.next_id += 1;
        EntityId(self.next_id)
    }

    pub fn record(&self, id: EntityId) -> Option<&EntityRecord> {
        self.index.get(&id).and_then(|&slot| self.slots[slot].as_ref())
    }

    fn record_mut(&mut self, id: EntityId) -> Result<&mut EntityRecord, RegistryError> {
        let slot = *self.index.get(&id).ok_or(RegistryError::NotFound(id))?;
        self.slots[slot].as_mut().ok_or(RegistryError::NotFound(id))
    }

    pub fn spawn(&mut self, record: EntityRecord) -> Result<EntityId, RegistryError> {
        let id = record.id;
        if self.index.contains_key(&id) {
            return Err(RegistryError::DuplicateId(id));
        }
        self.next_id = self.next_id.max(id.0);
        self.index.insert(id, self.slots.len());
        self.slots.push(Some(record));
        self.outbox.push(EntityEvent::Create { entity: id });
        Ok(id)
    }

    pub fn destroy(&mut self, id: EntityId) -> Result<EntityRecord, RegistryError> {
        let slot = self.index.remove(&id).ok_or(RegistryError::NotFound(id))?;
        let record = self.slots[slot].take().ok_or(RegistryError::NotFound(id))?;
        self.holes += 1;
        self.outbox.push(EntityEvent::Destroy { entity: id });
        self.compact_if_sparse();
        Ok(record)
    }

    pub fn set_owner(&mut self, id: EntityId, to: PlayerId) -> Result<(), RegistryError> {
        let record = self.record_mut(id)?;
        let from = record.owner;
        if from == to {
            return Ok(());
        }
        record.owner = to;
        self.outbox.push(EntityEvent::OwnershipChanged { entity: id, from, to });
        Ok(())
    }

    pub fn set_idle(&mut self, id: EntityId, idle: bool) -> Result<(), RegistryError> {
        let record = self.record_mut(id)?;
        if record.idle == idle {
            return Ok(());
        }
        record.idle = idle;
        self.push_modification(id, "UnitAI", "idle");
        Ok(())
    }

    pub fn set_training_queue(&mut self, id: EntityId, enabled: bool) -> Result<(), RegistryError> {
        self.record_mut(id)?.training_queue = enabled;
        self.push_modification(id, "ProductionQueue", "trainingQueue");
        Ok(())
    }

    /// `None` completes the foundation.
    pub fn set_foundation_progress(&mut self, id: EntityId, progress: Option<u8>) -> Result<(), RegistryError> {
        self.record_mut(id)?.foundation_progress = progress;
        self.push_modification(id, "Foundation", "progress");
        Ok(())
    }

    /// Movement is silent; entering or leaving the world (garrisoning) is an event.
    pub fn set_position(&mut self, id: EntityId, position: Option<FixedVec2>) -> Result<(), RegistryError> {
        let record = self.record_mut(id)?;
        let transition = record.position.is_some() != position.is_some();
        record.position = position;
        if transition {
            self.push_modification(id, "Position", "position");
        }
        Ok(())
    }

    /// AI-private metadata. The simulation emits no event for it, so the writer must
    /// refresh its collections itself.
    pub fn set_metadata(
        &mut self,
        player: PlayerId,
        id: EntityId,
        key: &str,
        value: Option<MetadataValue>,
    ) -> Result<(), RegistryError> {
        let record = self.record_mut(id)?;
        match value {
            Some(value) => {
                record.metadata.insert((player, key.to_string()), value);
            }
            None => {
                record.metadata.remove(&(player, key.to_string()));
            }
        }
        Ok(())
    }

    /// Continue entity `old` under `new` (promotion). The record keeps its slot,
    /// so iteration order is unchanged.
    pub fn rename(&mut self, old: EntityId, new: EntityId, template: Option<&str>) -> Result<(), RegistryError> {
        if self.index.contains_key(&new) {
            return Err(RegistryError::DuplicateId(new));
        }
        let slot = self.index.remove(&old).ok_or(RegistryError::NotFound(old))?;
        let record = self.slots[slot].as_mut().ok_or(RegistryError::NotFound(old))?;
        record.id = new;
        if let Some(template) = template {
            record.template = template.to_string();
        }
        self.index.insert(new, slot);
        self.next_id = self.next_id.max(new.0);
        self.outbox.push(EntityEvent::EntityRenamed { entity: old, new_entity: new });
        Ok(())
    }

    /// Hand the queued events to the caller (the decision driver).
    pub fn drain_events(&mut self) -> EventBatch {
        self.outbox.drain(..).collect()
    }

    fn push_modification(&mut self, id: EntityId, component: &str, value: &str) {
        self.outbox.push(EntityEvent::ValueModification {
            entity: id,
            component: component.to_string(),
            value_names: vec![value.to_string()],
        });
    }

    fn compact_if_sparse(&mut self) {
        if self.holes < 64 || self.holes * 2 < self.slots.len() {
            return;
        }
        self.slots.retain(Option::is_some);
        self.index.clear();
        for (slot, record) in self.slots.iter().enumerate() {
            if let Some(record) = record {
                self.index.insert(record.id, slot);
            }
        }
        debug!("EntityArena: compacted {} holes ({} live)", self.holes, self.slots.len());
        self.holes = 0;
    }
}

impl EntityRegistry for EntityArena {
    fn get(&self, id: EntityId) -> Option<&dyn EntityView> {
        self.record(id).map(|r| r as &dyn EntityView)
    }

    fn entities(&self) -> Box<dyn Iterator<Item = &dyn EntityView> + '_> {
        Box::new(self.slots.iter().flatten().map(|r| r as &dyn EntityView))
    }

    fn len(&self) -> usize {
        self.index.len()
    }
}
