//! Audit row and conflict row - one per candidate evaluated during a run.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ClientId, EmployeeId, TemplateId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditOutcome {
    Created,
    Duplicate,
    Overlap,
    Error,
}

impl AuditOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Duplicate => "duplicate",
            Self::Overlap => "overlap",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecurrenceKindTag {
    Weekly,
    Monthly,
}

impl RecurrenceKindTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRow {
    pub run_id: Uuid,
    pub run_date: NaiveDate,
    pub template_id: TemplateId,
    pub instance_id: Option<Uuid>,
    pub employee_id: EmployeeId,
    pub client_id: ClientId,
    pub start_ts: DateTime<Utc>,
    pub end_ts: DateTime<Utc>,
    pub outcome: AuditOutcome,
    pub error_desc: Option<String>,
    pub kind: RecurrenceKindTag,
    pub pattern: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictRow {
    pub run_id: Uuid,
    pub template_id: TemplateId,
    pub employee_id: EmployeeId,
    pub blocked_client_id: ClientId,
    pub blocked_start_ts: DateTime<Utc>,
    pub blocked_end_ts: DateTime<Utc>,
    pub existing_instance_id: Uuid,
    pub existing_client_id: ClientId,
    pub existing_start_ts: DateTime<Utc>,
    pub existing_end_ts: DateTime<Utc>,
}
