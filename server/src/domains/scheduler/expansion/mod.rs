//! Expansion stage: turns templates into candidate instances and routes
//! accepted ones into the capability sub-batches that drive the persistence
//! layer's post-insert copies.

pub mod group;
pub mod monthly;
pub mod pipeline;
pub mod recurrence;
pub mod weekly;

pub use monthly::expand_monthly;
pub use weekly::expand_weekly;

use crate::domains::scheduler::models::{Instance, TemplateId};

/// The four routing buckets a materialized instance can land in. `group`
/// carries the owning template id alongside each instance because group
/// processing needs to look up sibling templates sharing the same
/// `group_id`.
#[derive(Debug, Default)]
pub struct SubBatches {
    pub bulk_only: Vec<Instance>,
    pub bulk_scan_areas: Vec<Instance>,
    pub bulk_claims: Vec<Instance>,
    pub group: Vec<(TemplateId, Instance)>,
}

impl SubBatches {
    pub fn extend(&mut self, other: SubBatches) {
        self.bulk_only.extend(other.bulk_only);
        self.bulk_scan_areas.extend(other.bulk_scan_areas);
        self.bulk_claims.extend(other.bulk_claims);
        self.group.extend(other.group);
    }
}
