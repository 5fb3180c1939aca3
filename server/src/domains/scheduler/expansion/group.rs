//! Group-schedule handling.
//!
//! Multiple templates can share a `group_id`; their instances must carry a
//! common group identity. Only one template per group - the lowest
//! `template_id` - is dispatched through the day/month candidate loop; once
//! it commits, every other active template in the same group gets its own
//! instance emitted here, at the same interval, still subject to the usual
//! dedup/overlap checks.

use chrono::NaiveDate;
use uuid::Uuid;

use crate::domains::scheduler::expansion::pipeline::{evaluate_candidate, CandidateOutcome};
use crate::domains::scheduler::indexes::{DedupIndex, OverlapIndex};
use crate::domains::scheduler::models::audit::RecurrenceKindTag;
use crate::domains::scheduler::models::{AuditRow, ConflictRow, Instance, Template};

use super::pipeline::Candidate;

pub fn is_group_representative(template: &Template, all: &[Template]) -> bool {
    if !template.has_group() {
        return true;
    }
    let group_id = template.group_id;
    all.iter()
        .filter(|t| t.is_active && t.group_id == group_id)
        .map(|t| t.template_id)
        .min()
        .map_or(true, |min_id| min_id == template.template_id)
}

fn group_siblings<'a>(template: &Template, all: &'a [Template]) -> Vec<&'a Template> {
    all.iter()
        .filter(|t| t.is_active && t.group_id == template.group_id && t.template_id != template.template_id)
        .collect()
}

pub struct SiblingResult {
    pub instances: Vec<(crate::domains::scheduler::models::TemplateId, Instance)>,
    pub audit_rows: Vec<AuditRow>,
    pub conflict_rows: Vec<ConflictRow>,
}

/// Emits one instance per sibling template sharing the representative's
/// `group_id`, using the representative's already-committed interval.
pub fn emit_group_siblings(
    representative_instance: &Instance,
    representative: &Template,
    all_templates: &[Template],
    target_date: NaiveDate,
    kind: RecurrenceKindTag,
    dedup: &mut DedupIndex,
    overlap: &mut OverlapIndex,
    run_id: Uuid,
) -> SiblingResult {
    let mut instances = Vec::new();
    let mut audit_rows = Vec::new();
    let mut conflict_rows = Vec::new();

    for sibling in group_siblings(representative, all_templates) {
        let candidate = Candidate {
            template_id: sibling.template_id,
            client_id: sibling.client_id,
            employee_id: sibling.employee_id,
            company_id: sibling.company_id,
            group_id: sibling.group_id,
            schedule_kind: sibling.schedule_kind,
            start_ts: representative_instance.start_ts,
            end_ts: representative_instance.end_ts,
            kind,
            target_date,
        };

        let pattern = match kind {
            RecurrenceKindTag::Weekly => "weekly-group",
            RecurrenceKindTag::Monthly => "monthly-group",
        };
        let result = evaluate_candidate(&candidate, dedup, overlap, run_id, pattern);
        audit_rows.push(result.audit);

        match result.outcome {
            CandidateOutcome::Created(instance) => instances.push((sibling.template_id, instance)),
            CandidateOutcome::Overlap(conflict) => conflict_rows.push(conflict),
            CandidateOutcome::Duplicate => {}
        }
    }

    SiblingResult {
        instances,
        audit_rows,
        conflict_rows,
    }
}
