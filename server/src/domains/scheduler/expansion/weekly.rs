//! Weekly / multi-week expansion.

use std::collections::{HashMap, HashSet};

use chrono::{Datelike, Duration, NaiveDate};
use uuid::Uuid;

use crate::domains::scheduler::expansion::group::{emit_group_siblings, is_group_representative};
use crate::domains::scheduler::expansion::pipeline::{build_candidate, evaluate_candidate, CandidateOutcome};
use crate::domains::scheduler::expansion::recurrence::{weekly_valid_dates, WeeklyAnchor};
use crate::domains::scheduler::models::audit::RecurrenceKindTag;
use crate::domains::scheduler::models::{AuditRow, ConflictRow, Instance, Template, TemplateId};
use crate::domains::scheduler::repository::Snapshot;

use super::SubBatches;

pub struct WeeklyExpansionOutput {
    pub sub_batches: SubBatches,
    pub audit_rows: Vec<AuditRow>,
    pub conflict_rows: Vec<ConflictRow>,
    /// Last date an instance was committed this run, per multi-week
    /// template - input to finalization's tracking-row advance.
    pub multi_week_advanced: HashMap<TemplateId, NaiveDate>,
}

fn resolve_anchor(template: &Template, snapshot: &Snapshot, today: NaiveDate) -> WeeklyAnchor {
    let tracking = snapshot.tracking.get(&template.template_id);
    let last_instance = snapshot.last_instance_date.get(&template.template_id).copied();
    let last_historical = snapshot.last_historical_match.get(&template.template_id).copied();

    if template.last_run.is_none() {
        return WeeklyAnchor::never_ran(template.start_date, today);
    }
    if let Some(t) = tracking {
        if t.edit_mode {
            return WeeklyAnchor::edit_mode(t.next_date, today);
        }
    }
    if last_instance.is_none() {
        return WeeklyAnchor::ran_before_no_instances_remain(template.start_date);
    }
    if let (Some(historical), Some(instance_date)) = (last_historical, last_instance) {
        return WeeklyAnchor::normal(historical, instance_date);
    }
    if let (Some(t), Some(instance_date)) = (tracking, last_instance) {
        return WeeklyAnchor::fallback(t.next_date, instance_date);
    }
    // No tracking row and no historical match despite a last_run and an
    // existing instance: fall back to treating the template as if it never
    // ran, the most conservative option available.
    WeeklyAnchor::never_ran(template.start_date, today)
}

pub fn expand_weekly(
    snapshot: &mut Snapshot,
    today: NaiveDate,
    advance_days: i64,
    run_id: Uuid,
) -> WeeklyExpansionOutput {
    let mut sub_batches = SubBatches::default();
    let mut audit_rows = Vec::new();
    let mut conflict_rows = Vec::new();
    let mut multi_week_advanced: HashMap<TemplateId, NaiveDate> = HashMap::new();

    let templates = snapshot.weekly_templates.clone();

    // Precompute the multi-week valid-date set once per multi-week template,
    // outside the day loop.
    let mut valid_dates: HashMap<TemplateId, HashSet<NaiveDate>> = HashMap::new();
    for template in templates.iter().filter(|t| t.week_stride > 1) {
        let anchor = resolve_anchor(template, snapshot, today);
        let dates = weekly_valid_dates(anchor, template.week_stride, template.days, today, advance_days);
        valid_dates.insert(template.template_id, dates);
    }

    let window_end = today + Duration::days(advance_days);
    let mut d = today;
    while d <= window_end {
        for template in &templates {
            if !template.eligible_for_weekly(today) {
                continue;
            }
            if !is_group_representative(template, &templates) {
                continue;
            }
            if !template.days.contains(d.weekday()) {
                continue;
            }
            if template.end_date.map_or(false, |end| end < d) {
                continue;
            }
            if template.week_stride > 1 {
                let valid = valid_dates.get(&template.template_id).map_or(false, |s| s.contains(&d));
                if !valid {
                    continue;
                }
            }

            let candidate = build_candidate(template, d, RecurrenceKindTag::Weekly);
            let result = evaluate_candidate(&candidate, &mut snapshot.dedup, &mut snapshot.overlap, run_id, "weekly");
            audit_rows.push(result.audit);

            match result.outcome {
                CandidateOutcome::Created(instance) => {
                    if template.week_stride > 1 {
                        multi_week_advanced
                            .entry(template.template_id)
                            .and_modify(|existing| {
                                if d > *existing {
                                    *existing = d;
                                }
                            })
                            .or_insert(d);
                    }
                    if template.has_group() {
                        let siblings = emit_group_siblings(
                            &instance,
                            template,
                            &templates,
                            d,
                            RecurrenceKindTag::Weekly,
                            &mut snapshot.dedup,
                            &mut snapshot.overlap,
                            run_id,
                        );
                        audit_rows.extend(siblings.audit_rows);
                        conflict_rows.extend(siblings.conflict_rows);
                        sub_batches.group.push((template.template_id, instance));
                        sub_batches.group.extend(siblings.instances);
                    } else {
                        route_instance(&mut sub_batches, template, instance);
                    }
                }
                CandidateOutcome::Overlap(conflict) => conflict_rows.push(conflict),
                CandidateOutcome::Duplicate => {}
            }
        }
        d += Duration::days(1);
    }

    WeeklyExpansionOutput {
        sub_batches,
        audit_rows,
        conflict_rows,
        multi_week_advanced,
    }
}

pub(super) fn route_instance(sub_batches: &mut SubBatches, template: &Template, instance: Instance) {
    if template.has_group() {
        sub_batches.group.push((template.template_id, instance));
    } else if template.has_claims {
        sub_batches.bulk_claims.push(instance);
    } else if template.has_scan_areas {
        sub_batches.bulk_scan_areas.push(instance);
    } else {
        sub_batches.bulk_only.push(instance);
    }
}
