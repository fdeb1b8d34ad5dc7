//! Read-only view of simulation entities as seen by the AI.
//!
//! The AI never mutates entities through these handles. Everything here is an
//! accessor; mutation goes through the command layer (see [`crate::ai::registry`]).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ai::fixed_math::FixedVec2;

/// Stable integer identity of a simulation entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub u32);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Player slot. Player 0 is gaia.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlayerId(pub u8);

impl PlayerId {
    pub const GAIA: Self = Self(0);

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Value stored in per-player entity metadata (roles, plan ids, base ids...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetadataValue {
    Int(i64),
    Text(String),
    Flag(bool),
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        MetadataValue::Int(value)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        MetadataValue::Flag(value)
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::Text(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        MetadataValue::Text(value)
    }
}

/// Resource supply type, e.g. `food.meat` is generic `food`, specific `meat`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceType {
    pub generic: String,
    pub specific: String,
}

impl ResourceType {
    pub fn new(generic: impl Into<String>, specific: impl Into<String>) -> Self {
        Self { generic: generic.into(), specific: specific.into() }
    }
}

/// Read capability over one entity.
///
/// Only the first block of methods is required. The gameplay accessors default to
/// "not applicable" so registries that do not model a concept simply never match
/// filters built on it.
pub trait EntityView {
    fn id(&self) -> EntityId;
    fn owner(&self) -> PlayerId;
    fn template_name(&self) -> &str;
    fn has_class(&self, class: &str) -> bool;
    fn metadata(&self, player: PlayerId, key: &str) -> Option<&MetadataValue>;
    /// `None` while the entity has no world position (garrisoned, in transit).
    fn position(&self) -> Option<FixedVec2>;

    fn has_classes(&self, classes: &[&str]) -> bool {
        classes.iter().all(|class| self.has_class(class))
    }

    fn classes(&self) -> &[String] {
        &[]
    }

    fn is_idle(&self) -> bool {
        false
    }

    fn garrison_max(&self) -> u32 {
        0
    }

    /// Whether the entity owns a production (training) queue.
    fn has_training_queue(&self) -> bool {
        false
    }

    fn can_attack_class(&self, _class: &str) -> bool {
        false
    }

    /// Construction progress in percent; `None` once the structure is built.
    fn foundation_progress(&self) -> Option<u8> {
        None
    }

    fn has_defensive_fire(&self) -> bool {
        false
    }

    /// Dropsite check; `None` asks whether it accepts any resource at all.
    fn is_resource_dropsite(&self, _resource: Option<&str>) -> bool {
        false
    }

    fn is_treasure(&self) -> bool {
        false
    }

    fn resource_supply_max(&self) -> u32 {
        0
    }

    fn resource_supply_type(&self) -> Option<&ResourceType> {
        None
    }

    /// False for targets too dangerous or too hard to hunt; plain supplies are huntable.
    fn is_huntable(&self) -> bool {
        true
    }

    fn has_unit_motion(&self) -> bool {
        false
    }
}
