//! Monthly expansion - walks the lookahead window one calendar month at a
//! time and materializes the configured nth-weekday occurrence for each
//! eligible template.

use chrono::{Datelike, NaiveDate, Weekday};
use uuid::Uuid;

use crate::domains::scheduler::expansion::group::{emit_group_siblings, is_group_representative};
use crate::domains::scheduler::expansion::pipeline::{build_candidate, evaluate_candidate, CandidateOutcome};
use crate::domains::scheduler::expansion::recurrence::{first_day_of_next_month, nth_weekday};
use crate::domains::scheduler::expansion::weekly::route_instance;
use crate::domains::scheduler::models::audit::RecurrenceKindTag;
use crate::domains::scheduler::models::{AuditRow, ConflictRow, Template};
use crate::domains::scheduler::repository::Snapshot;

use super::SubBatches;

pub struct MonthlyExpansionOutput {
    pub sub_batches: SubBatches,
    pub audit_rows: Vec<AuditRow>,
    pub conflict_rows: Vec<ConflictRow>,
}

/// Translates the template's flagged `days` bit into the single weekday a
/// monthly template targets. A monthly template with zero or more than one
/// day flagged is a validation error; when more than one bit is set this
/// takes the first flagged day deterministically rather than rejecting.
fn target_weekday(template: &Template) -> Option<Weekday> {
    [
        Weekday::Sun,
        Weekday::Mon,
        Weekday::Tue,
        Weekday::Wed,
        Weekday::Thu,
        Weekday::Fri,
        Weekday::Sat,
    ]
    .into_iter()
    .find(|dow| template.days.contains(*dow))
}

pub fn expand_monthly(
    snapshot: &mut Snapshot,
    today: NaiveDate,
    months_ahead: i64,
    run_id: Uuid,
) -> MonthlyExpansionOutput {
    let mut sub_batches = SubBatches::default();
    let mut audit_rows = Vec::new();
    let mut conflict_rows = Vec::new();

    let templates = snapshot.monthly_templates.clone();
    let mut month_start = NaiveDate::from_ymd_opt(today.year(), today.month(), 1).expect("valid calendar month");

    for _ in 0..months_ahead.max(0) {
        let month_last_day = super::recurrence::last_day_of_month(month_start);

        for template in &templates {
            if !template.eligible_for_monthly(month_last_day) {
                continue;
            }
            if !is_group_representative(template, &templates) {
                continue;
            }

            let Some(dow) = target_weekday(template) else {
                audit_rows.push(AuditRow {
                    run_id,
                    run_date: month_start,
                    template_id: template.template_id,
                    instance_id: None,
                    employee_id: template.employee_id,
                    client_id: template.client_id,
                    start_ts: month_start.and_hms_opt(0, 0, 0).unwrap().and_utc(),
                    end_ts: month_start.and_hms_opt(0, 0, 0).unwrap().and_utc(),
                    outcome: crate::domains::scheduler::models::audit::AuditOutcome::Error,
                    error_desc: Some("monthly template has no day-of-week flag set".to_string()),
                    kind: RecurrenceKindTag::Monthly,
                    pattern: "monthly".to_string(),
                });
                continue;
            };

            let n = template.nth_weekday.unwrap_or(3).max(0) as u32;
            let Some(target_date) = nth_weekday(month_start, dow, n) else {
                continue;
            };
            if target_date < template.start_date {
                continue;
            }
            if template.end_date.map_or(false, |end| end < target_date) {
                continue;
            }

            let candidate = build_candidate(template, target_date, RecurrenceKindTag::Monthly);
            let result = evaluate_candidate(&candidate, &mut snapshot.dedup, &mut snapshot.overlap, run_id, "monthly");
            audit_rows.push(result.audit);

            match result.outcome {
                CandidateOutcome::Created(instance) => {
                    if template.has_group() {
                        let siblings = emit_group_siblings(
                            &instance,
                            template,
                            &templates,
                            target_date,
                            RecurrenceKindTag::Monthly,
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

        month_start = first_day_of_next_month(month_start);
    }

    MonthlyExpansionOutput {
        sub_batches,
        audit_rows,
        conflict_rows,
    }
}
