//! Per-candidate expansion pipeline. Day-of-week / Nth-weekday / effectivity
//! / multi-week filtering happen in `weekly.rs` and `monthly.rs` before a
//! `Candidate` ever reaches here; this module only does the duplicate
//! probe, the overlap probe, and commit.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use uuid::Uuid;

use crate::domains::scheduler::indexes::{DedupIndex, OverlapIndex};
use crate::domains::scheduler::models::audit::RecurrenceKindTag;
use crate::domains::scheduler::models::template::ScheduleKind;
use crate::domains::scheduler::models::{AuditRow, ClientId, CompanyId, ConflictRow, EmployeeId, GroupId, Instance, Template, TemplateId};

#[derive(Debug, Clone)]
pub struct Candidate {
    pub template_id: TemplateId,
    pub client_id: ClientId,
    pub employee_id: EmployeeId,
    pub company_id: CompanyId,
    pub group_id: Option<GroupId>,
    pub schedule_kind: ScheduleKind,
    pub start_ts: DateTime<Utc>,
    pub end_ts: DateTime<Utc>,
    pub kind: RecurrenceKindTag,
    pub target_date: NaiveDate,
}

pub enum CandidateOutcome {
    Created(Instance),
    Duplicate,
    Overlap(ConflictRow),
}

/// Builds the absolute-time candidate for a (template, date) pair:
/// `end_ts = start_ts + day_span*86400 + (time_out - time_in)`. Times are
/// combined as naive local-wall-clock values; the session time zone
/// config option governs how an operator interprets these, the engine
/// itself stores everything as UTC.
pub fn build_candidate(template: &Template, target_date: NaiveDate, kind: RecurrenceKindTag) -> Candidate {
    let start_naive = NaiveDateTime::new(target_date, template.time_in);
    let start_ts = start_naive.and_utc();
    let end_ts = start_ts + chrono::Duration::seconds(template.duration_seconds());

    Candidate {
        template_id: template.template_id,
        client_id: template.client_id,
        employee_id: template.employee_id,
        company_id: template.company_id,
        group_id: template.group_id,
        schedule_kind: template.schedule_kind,
        start_ts,
        end_ts,
        kind,
        target_date,
    }
}

pub struct EvaluationResult {
    pub outcome: CandidateOutcome,
    pub audit: AuditRow,
}

/// Duplicate probe, overlap probe, commit. The dedup/overlap indexes are
/// mutated on commit so later candidates in the same run see this one -
/// intra-run conflicts are caught, not just conflicts against history.
pub fn evaluate_candidate(
    candidate: &Candidate,
    dedup: &mut DedupIndex,
    overlap: &mut OverlapIndex,
    run_id: Uuid,
    pattern: &str,
) -> EvaluationResult {
    let mut instance = Instance::builder()
        .template_id(candidate.template_id)
        .client_id(candidate.client_id)
        .employee_id(candidate.employee_id)
        .company_id(candidate.company_id)
        .start_ts(candidate.start_ts)
        .end_ts(candidate.end_ts)
        .note(Instance::note_for(candidate.kind).to_string())
        .build();
    instance.group_id = candidate.group_id;

    let is_open_claim = candidate.schedule_kind.is_open_claim();

    let base_audit = AuditRow {
        run_id,
        run_date: candidate.target_date,
        template_id: candidate.template_id,
        instance_id: None,
        employee_id: candidate.employee_id,
        client_id: candidate.client_id,
        start_ts: candidate.start_ts,
        end_ts: candidate.end_ts,
        outcome: crate::domains::scheduler::models::audit::AuditOutcome::Created,
        error_desc: None,
        kind: candidate.kind,
        pattern: pattern.to_string(),
    };

    if dedup.is_duplicate(&instance, is_open_claim) {
        return EvaluationResult {
            outcome: CandidateOutcome::Duplicate,
            audit: AuditRow {
                outcome: crate::domains::scheduler::models::audit::AuditOutcome::Duplicate,
                ..base_audit
            },
        };
    }

    if let Some(existing) = overlap.probe(candidate.employee_id, candidate.client_id, candidate.start_ts, candidate.end_ts) {
        let conflict = ConflictRow {
            run_id,
            template_id: candidate.template_id,
            employee_id: candidate.employee_id,
            blocked_client_id: candidate.client_id,
            blocked_start_ts: candidate.start_ts,
            blocked_end_ts: candidate.end_ts,
            existing_instance_id: existing.instance_id,
            existing_client_id: existing.client_id,
            existing_start_ts: existing.start,
            existing_end_ts: existing.end,
        };
        return EvaluationResult {
            outcome: CandidateOutcome::Overlap(conflict),
            audit: AuditRow {
                outcome: crate::domains::scheduler::models::audit::AuditOutcome::Overlap,
                ..base_audit
            },
        };
    }

    dedup.register(&instance);
    overlap.register(
        candidate.employee_id,
        candidate.start_ts,
        candidate.end_ts,
        candidate.client_id,
        instance.id,
        candidate.template_id,
    );

    EvaluationResult {
        outcome: CandidateOutcome::Created(instance.clone()),
        audit: AuditRow {
            instance_id: Some(instance.id),
            ..base_audit
        },
    }
}
