//! Update Propagator: applies one batch of entity events to every live collection.
//!
//! Events are applied in batch order and predicates read the registry as it is
//! after the whole batch, so the final membership of each collection equals a
//! fresh scan of its source. The propagator is the only writer of live members.
//!
//! A predicate failure does not stop the batch. The collection that failed is
//! skipped for the rest of the batch and destroyed at the end, every other
//! collection receives every event, and the first failure is returned.

use bevy::prelude::*;

use crate::ai::collections::{CollectionId, CollectionStats, CollectionStore, MembershipChange};
use crate::ai::entity::EntityId;
use crate::ai::error::CollectionError;
use crate::ai::events::{EntityEvent, EventBatch};
use crate::ai::registry::EntityRegistry;

/// What one call to [`apply_batch`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PropagationReport {
    pub events: usize,
    pub retests: u64,
    pub skipped: u64,
    pub added: u64,
    pub removed: u64,
    pub renamed: u64,
}

impl PropagationReport {
    fn record(&mut self, change: MembershipChange) {
        match change {
            MembershipChange::Added => self.added += 1,
            MembershipChange::Removed => self.removed += 1,
            MembershipChange::Unchanged => {}
        }
    }
}

/// Collections whose predicate failed during the current batch.
#[derive(Debug, Default)]
struct Failures {
    failed: Vec<CollectionId>,
    first: Option<CollectionError>,
}

impl Failures {
    fn record(&mut self, id: CollectionId, error: CollectionError) {
        self.failed.push(id);
        self.first.get_or_insert(error);
    }

    fn contains(&self, id: CollectionId) -> bool {
        self.failed.contains(&id)
    }
}

pub fn apply_batch(
    store: &mut CollectionStore,
    registry: &dyn EntityRegistry,
    batch: &EventBatch,
) -> Result<PropagationReport, CollectionError> {
    let selective = store.config().selective_invalidation;
    let mut report = PropagationReport {
        events: batch.len(),
        ..Default::default()
    };
    let mut failures = Failures::default();

    for event in batch.iter() {
        match event {
            EntityEvent::Create { entity } => {
                retest(store, registry, *entity, None, &mut report, &mut failures);
            }
            EntityEvent::Destroy { entity } => {
                for collection in store.live_mut() {
                    if collection.remove_id(*entity) {
                        report.removed += 1;
                    }
                }
            }
            EntityEvent::OwnershipChanged { entity, .. } => {
                let property = selective.then_some("owner");
                retest(store, registry, *entity, property, &mut report, &mut failures);
            }
            EntityEvent::ValueModification { entity, .. } => {
                retest(store, registry, *entity, None, &mut report, &mut failures);
            }
            EntityEvent::EntityRenamed { entity, new_entity } => {
                for collection in store.live_mut() {
                    if collection.migrate(*entity, *new_entity) {
                        report.renamed += 1;
                    }
                }
                retest(store, registry, *new_entity, None, &mut report, &mut failures);
            }
        }
    }

    accumulate(&mut store.stats, &report);
    if let Some(error) = failures.first {
        store.drop_failed(&failures.failed, &error);
        return Err(error);
    }
    if report.added + report.removed + report.renamed > 0 {
        debug!(
            "Propagator: {} events, {} retests ({} skipped), +{} -{} ~{}",
            report.events, report.retests, report.skipped, report.added, report.removed, report.renamed
        );
    }
    Ok(report)
}

fn retest(
    store: &mut CollectionStore,
    registry: &dyn EntityRegistry,
    entity: EntityId,
    property: Option<&str>,
    report: &mut PropagationReport,
    failures: &mut Failures,
) {
    for (id, collection) in store.live_entries_mut() {
        if failures.contains(id) {
            continue;
        }
        if let Some(property) = property {
            if !collection.depends_on(property) {
                report.skipped += 1;
                continue;
            }
        }
        match collection.refresh(registry, entity) {
            Ok(change) => {
                report.retests += 1;
                report.record(change);
            }
            Err(e) => failures.record(id, e),
        }
    }
}

fn accumulate(stats: &mut CollectionStats, report: &PropagationReport) {
    stats.retests += report.retests;
    stats.skipped_retests += report.skipped;
    stats.insertions += report.added;
    stats.removals += report.removed;
    stats.renames += report.renamed;
}
