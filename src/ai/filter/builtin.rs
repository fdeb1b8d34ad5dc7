//! Built-in entity filters.
//!
//! Each constructor reads only the named entity property and declares it in
//! `dependent_props` when the property can change during a game (owner, idle
//! state, metadata, production queue). Template, class and supply properties are
//! treated as static for the lifetime of an entity id.

use crate::ai::entity::{EntityId, EntityView, MetadataValue, PlayerId};

use super::{Filter, FilterSpec};

/// Floating treasures are unreachable for land gatherers.
const UNREACHABLE_TREASURES: [&str; 2] = ["gaia/treasure/shipwreck_debris", "gaia/treasure/shipwreck"];

pub fn by_type(template: &str) -> Filter {
    let template = template.to_string();
    let spec = FilterSpec::ByType(template.clone());
    Filter::new(format!("type={template}"), &[], move |ent| ent.template_name() == template)
        .with_spec(spec)
}

pub fn by_class(class: &str) -> Filter {
    let class = class.to_string();
    let spec = FilterSpec::ByClass(class.clone());
    Filter::new(format!("class={class}"), &[], move |ent| ent.has_class(&class)).with_spec(spec)
}

pub fn by_classes(classes: &[&str]) -> Filter {
    let owned: Vec<String> = classes.iter().map(|c| c.to_string()).collect();
    let spec = FilterSpec::ByClasses(owned.clone());
    Filter::new(format!("classes={}", owned.join("+")), &[], move |ent| {
        owned.iter().all(|class| ent.has_class(class))
    })
    .with_spec(spec)
}

pub fn by_metadata(player: PlayerId, key: &str, value: impl Into<MetadataValue>) -> Filter {
    let key = key.to_string();
    let value = value.into();
    let prop = format!("metadata.{key}");
    let spec = FilterSpec::ByMetadata { player, key: key.clone(), value: value.clone() };
    Filter::new(format!("metadata[{player}].{key}={value:?}"), &[prop.as_str()], move |ent| {
        ent.metadata(player, &key) == Some(&value)
    })
    .with_spec(spec)
}

pub fn by_has_metadata(player: PlayerId, key: &str) -> Filter {
    let key = key.to_string();
    let prop = format!("metadata.{key}");
    let spec = FilterSpec::ByHasMetadata { player, key: key.clone() };
    Filter::new(format!("metadata[{player}].{key}?"), &[prop.as_str()], move |ent| {
        ent.metadata(player, &key).is_some()
    })
    .with_spec(spec)
}

pub fn by_owner(owner: PlayerId) -> Filter {
    Filter::new(format!("owner={owner}"), &["owner"], move |ent| ent.owner() == owner)
        .with_spec(FilterSpec::ByOwner(owner))
}

pub fn by_not_owner(owner: PlayerId) -> Filter {
    Filter::new(format!("owner!={owner}"), &["owner"], move |ent| ent.owner() != owner)
        .with_spec(FilterSpec::ByNotOwner(owner))
}

pub fn by_owners(owners: &[PlayerId]) -> Filter {
    let owners = owners.to_vec();
    let spec = FilterSpec::ByOwners(owners.clone());
    Filter::new(format!("owner in {owners:?}"), &["owner"], move |ent| owners.contains(&ent.owner()))
        .with_spec(spec)
}

pub fn by_can_garrison() -> Filter {
    Filter::new("can_garrison", &[], |ent| ent.garrison_max() > 0).with_spec(FilterSpec::ByCanGarrison)
}

pub fn by_training_queue() -> Filter {
    Filter::new("training_queue", &["trainingQueue"], |ent| ent.has_training_queue())
        .with_spec(FilterSpec::ByTrainingQueue)
}

pub fn by_can_attack_class(class: &str) -> Filter {
    let class = class.to_string();
    let spec = FilterSpec::ByCanAttackClass(class.clone());
    Filter::new(format!("can_attack={class}"), &[], move |ent| ent.can_attack_class(&class)).with_spec(spec)
}

/// Entities able to attack `target`, judged by the target's classes as they are now.
pub fn by_can_attack_target(target: &dyn EntityView) -> Filter {
    can_attack_classes_of(target.id(), target.classes().to_vec())
}

pub(super) fn can_attack_classes_of(target: EntityId, classes: Vec<String>) -> Filter {
    let spec = FilterSpec::ByCanAttackTarget {
        target,
        classes: classes.clone(),
    };
    Filter::new(format!("can_attack_target={target}"), &[], move |ent| {
        classes.iter().any(|class| ent.can_attack_class(class))
    })
    .with_spec(spec)
}

/// Entities without a world position, i.e. garrisoned or otherwise in transit.
pub fn is_garrisoned() -> Filter {
    Filter::new("garrisoned", &[], |ent| ent.position().is_none()).with_spec(FilterSpec::IsGarrisoned)
}

pub fn is_idle() -> Filter {
    Filter::new("idle", &["idle"], |ent| ent.is_idle()).with_spec(FilterSpec::IsIdle)
}

pub fn is_foundation() -> Filter {
    Filter::new("foundation", &[], |ent| ent.foundation_progress().is_some())
        .with_spec(FilterSpec::IsFoundation)
}

pub fn is_built() -> Filter {
    Filter::new("built", &[], |ent| ent.foundation_progress().is_none()).with_spec(FilterSpec::IsBuilt)
}

pub fn has_defensive_fire() -> Filter {
    Filter::new("defensive_fire", &[], |ent| ent.has_defensive_fire()).with_spec(FilterSpec::HasDefensiveFire)
}

/// Dropsites for `resource`, or for any resource when `None`.
pub fn is_dropsite(resource: Option<&str>) -> Filter {
    let resource = resource.map(str::to_string);
    let spec = FilterSpec::IsDropsite(resource.clone());
    let label = format!("dropsite={}", resource.as_deref().unwrap_or("*"));
    Filter::new(label, &[], move |ent| ent.is_resource_dropsite(resource.as_deref())).with_spec(spec)
}

pub fn is_treasure() -> Filter {
    Filter::new("treasure", &[], |ent| {
        ent.is_treasure() && !UNREACHABLE_TREASURES.contains(&ent.template_name())
    })
    .with_spec(FilterSpec::IsTreasure)
}

/// Gatherable supplies of a generic resource type, skipping sea creatures and
/// targets too dangerous to hunt.
pub fn by_resource(generic: &str) -> Filter {
    let generic = generic.to_string();
    let spec = FilterSpec::ByResource(generic.clone());
    Filter::new(format!("resource={generic}"), &[], move |ent| {
        if ent.resource_supply_max() == 0 {
            return false;
        }
        let Some(kind) = ent.resource_supply_type() else { return false };
        if !ent.is_huntable() || ent.has_class("SeaCreature") {
            return false;
        }
        kind.generic == generic
    })
    .with_spec(spec)
}

pub fn is_huntable() -> Filter {
    Filter::new("huntable", &[], |ent| hunt_target(ent)).with_spec(FilterSpec::IsHuntable)
}

/// Static sea creatures with supply left; moving ones (whales) are skipped.
pub fn is_fishable() -> Filter {
    Filter::new("fishable", &[], |ent| {
        !ent.has_unit_motion() && ent.has_class("SeaCreature") && ent.resource_supply_max() > 0
    })
    .with_spec(FilterSpec::IsFishable)
}

fn hunt_target(ent: &dyn EntityView) -> bool {
    ent.has_class("Animal")
        && ent.resource_supply_max() > 0
        && ent.is_huntable()
        && !ent.has_class("SeaCreature")
}
