//! Serialisable description of built-in filters.
//!
//! Closures cannot be saved, so cached collections built from built-in filters
//! remember the [`FilterSpec`] they came from. The cache manifest stores these
//! to rebuild the same keys after a load.

use serde::{Deserialize, Serialize};

use crate::ai::entity::{EntityId, MetadataValue, PlayerId};

use super::{builtin, Filter};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterSpec {
    ByType(String),
    ByClass(String),
    ByClasses(Vec<String>),
    ByMetadata { player: PlayerId, key: String, value: MetadataValue },
    ByHasMetadata { player: PlayerId, key: String },
    ByOwner(PlayerId),
    ByNotOwner(PlayerId),
    ByOwners(Vec<PlayerId>),
    ByCanGarrison,
    ByTrainingQueue,
    ByCanAttackClass(String),
    /// The target's classes are captured when the filter is built.
    ByCanAttackTarget { target: EntityId, classes: Vec<String> },
    IsGarrisoned,
    IsIdle,
    IsFoundation,
    IsBuilt,
    HasDefensiveFire,
    IsDropsite(Option<String>),
    IsTreasure,
    ByResource(String),
    IsHuntable,
    IsFishable,
    And(Box<FilterSpec>, Box<FilterSpec>),
    Or(Box<FilterSpec>, Box<FilterSpec>),
    Not(Box<FilterSpec>),
}

impl FilterSpec {
    /// Rebuild the live filter this spec describes.
    pub fn to_filter(&self) -> Filter {
        match self {
            FilterSpec::ByType(template) => builtin::by_type(template),
            FilterSpec::ByClass(class) => builtin::by_class(class),
            FilterSpec::ByClasses(classes) => {
                let classes: Vec<&str> = classes.iter().map(String::as_str).collect();
                builtin::by_classes(&classes)
            }
            FilterSpec::ByMetadata { player, key, value } => builtin::by_metadata(*player, key, value.clone()),
            FilterSpec::ByHasMetadata { player, key } => builtin::by_has_metadata(*player, key),
            FilterSpec::ByOwner(owner) => builtin::by_owner(*owner),
            FilterSpec::ByNotOwner(owner) => builtin::by_not_owner(*owner),
            FilterSpec::ByOwners(owners) => builtin::by_owners(owners),
            FilterSpec::ByCanGarrison => builtin::by_can_garrison(),
            FilterSpec::ByTrainingQueue => builtin::by_training_queue(),
            FilterSpec::ByCanAttackClass(class) => builtin::by_can_attack_class(class),
            FilterSpec::ByCanAttackTarget { target, classes } => builtin::can_attack_classes_of(*target, classes.clone()),
            FilterSpec::IsGarrisoned => builtin::is_garrisoned(),
            FilterSpec::IsIdle => builtin::is_idle(),
            FilterSpec::IsFoundation => builtin::is_foundation(),
            FilterSpec::IsBuilt => builtin::is_built(),
            FilterSpec::HasDefensiveFire => builtin::has_defensive_fire(),
            FilterSpec::IsDropsite(resource) => builtin::is_dropsite(resource.as_deref()),
            FilterSpec::IsTreasure => builtin::is_treasure(),
            FilterSpec::ByResource(generic) => builtin::by_resource(generic),
            FilterSpec::IsHuntable => builtin::is_huntable(),
            FilterSpec::IsFishable => builtin::is_fishable(),
            FilterSpec::And(lhs, rhs) => lhs.to_filter().and(rhs.to_filter()),
            FilterSpec::Or(lhs, rhs) => lhs.to_filter().or(rhs.to_filter()),
            FilterSpec::Not(inner) => inner.to_filter().negate(),
        }
    }
}
