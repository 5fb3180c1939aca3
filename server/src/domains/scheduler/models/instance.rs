//! Instance model - a dated, absolute-time shift derived from a template by
//! one engine run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use typed_builder::TypedBuilder;
use uuid::Uuid;

use super::{ClientId, CompanyId, EmployeeId, GroupId, TemplateId};

/// Minute-resolution dedup key. Two instances with the same (client,
/// employee, start minute, end minute) are the same slot - see
/// `indexes::dedup` for `K_std`/`K_open`.
pub type DedupMinute = i64;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct Instance {
    #[builder(default = Uuid::new_v4())]
    pub id: Uuid,

    pub template_id: TemplateId,
    pub client_id: ClientId,
    pub employee_id: EmployeeId,
    pub company_id: CompanyId,
    #[builder(default, setter(strip_option))]
    pub group_id: Option<GroupId>,

    pub start_ts: DateTime<Utc>,
    pub end_ts: DateTime<Utc>,

    #[builder(default, setter(strip_option))]
    pub external_timecard_ref: Option<String>,
    #[builder(default, setter(strip_option))]
    pub actual_start_ts: Option<DateTime<Utc>>,
    #[builder(default, setter(strip_option))]
    pub actual_end_ts: Option<DateTime<Utc>>,

    #[builder(default = true)]
    pub is_active: bool,
    pub note: String,

    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
    #[builder(default = Utc::now())]
    pub updated_at: DateTime<Utc>,
}

impl Instance {
    /// `K_std` = (client_id, employee_id, start_ts_minute, end_ts_minute).
    pub fn k_std(&self) -> (ClientId, EmployeeId, DedupMinute, DedupMinute) {
        (
            self.client_id,
            self.employee_id,
            minute_bucket(self.start_ts),
            minute_bucket(self.end_ts),
        )
    }

    /// `K_open` = (template_id, client_id, employee_id, start_ts_minute,
    /// end_ts_minute) - narrows by template so multiple open-claim templates
    /// can coexist at the same slot.
    pub fn k_open(&self) -> (TemplateId, ClientId, EmployeeId, DedupMinute, DedupMinute) {
        (
            self.template_id,
            self.client_id,
            self.employee_id,
            minute_bucket(self.start_ts),
            minute_bucket(self.end_ts),
        )
    }

    /// Whether retracting this instance would violate the non-retraction
    /// invariant - it has a linked external timecard.
    pub fn is_externally_linked(&self) -> bool {
        self.external_timecard_ref
            .as_ref()
            .map_or(false, |r| !r.is_empty())
    }

    pub fn note_for(kind: super::RecurrenceKindTag) -> &'static str {
        match kind {
            super::RecurrenceKindTag::Weekly => "Scheduled Event",
            super::RecurrenceKindTag::Monthly => "Schedule Event Monthly",
        }
    }
}

fn minute_bucket(ts: DateTime<Utc>) -> i64 {
    ts.timestamp() / 60
}
