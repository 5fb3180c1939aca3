//! Template model - the recurrence specification a run expands.
//!
//! Templates are external and read-mostly: the engine never creates or
//! mutates one except to advance `last_run` during finalization or clear
//! `is_reset` during cleanup. Sentinel end-dates (`0001-01-01`) are
//! normalized to `None` at the repository boundary (`repository::snapshot`)
//! so nothing downstream ever compares against the sentinel.

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use super::{ClientId, CompanyId, EmployeeId, GroupId, TemplateId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecurringKind {
    Weekly,
    Monthly,
}

impl RecurringKind {
    pub fn from_db(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "WEEKLY" => Some(Self::Weekly),
            "MONTHLY" => Some(Self::Monthly),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScheduleKind {
    Individual = 0,
    OpenClaim = 1,
    SelectClaim = 2,
    Team = 3,
}

impl ScheduleKind {
    pub fn from_db(v: i16) -> Option<Self> {
        match v {
            0 => Some(Self::Individual),
            1 => Some(Self::OpenClaim),
            2 => Some(Self::SelectClaim),
            3 => Some(Self::Team),
            _ => None,
        }
    }

    /// Whether a template of this kind dedupes by template id in addition
    /// to client/employee/time, letting multiple open-claim templates
    /// coexist at an identical slot rather than colliding on the standard
    /// key. Orthogonal to group routing, which only checks `group_id`.
    pub fn is_open_claim(self) -> bool {
        matches!(self, Self::OpenClaim)
    }
}

/// Day-of-week flag set, `D ⊆ {Sun..Sat}`, stored as a 7-bit mask with bit 0
/// = Sunday, matching the `chrono::Weekday` numbering used throughout the
/// recurrence math in `expansion::recurrence`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DaySet(pub u8);

impl DaySet {
    pub fn from_bits(bits: i16) -> Self {
        Self((bits & 0x7f) as u8)
    }

    pub fn contains(&self, weekday: chrono::Weekday) -> bool {
        let idx = weekday.num_days_from_sunday();
        (self.0 >> idx) & 1 == 1
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    pub template_id: TemplateId,

    // Recurrence
    pub recurring_kind: RecurringKind,
    pub week_stride: i32,
    pub nth_weekday: Option<i16>,
    pub days: DaySet,

    // Effectivity
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub last_run: Option<NaiveDate>,

    // Timing
    pub time_in: NaiveTime,
    pub time_out: NaiveTime,
    pub day_span: i32,

    // Assignment
    pub client_id: ClientId,
    pub employee_id: EmployeeId,
    pub company_id: CompanyId,
    pub group_id: Option<GroupId>,
    pub schedule_kind: ScheduleKind,

    // Flags
    pub is_active: bool,
    pub is_reset: bool,

    // Capability flags, loaded separately in the full snapshot but cached
    // here once the loader has the capability sets so expansion can route
    // without a second lookup.
    pub has_scan_areas: bool,
    pub has_claims: bool,

    /// Opaque carry-over attributes (alerting/rounding/restriction settings)
    /// the engine copies but never interprets.
    pub extra: Option<serde_json::Value>,
}

impl Template {
    /// Overnight shift: `time_out <= time_in`.
    pub fn is_overnight(&self) -> bool {
        self.time_out <= self.time_in
    }

    /// Duration of a single instance in seconds, accounting for `day_span`
    /// and overnight wraparound: `end_ts = start_ts + day_span*86400 +
    /// (time_out - time_in)`.
    pub fn duration_seconds(&self) -> i64 {
        let day_span_secs = (self.day_span as i64) * 86_400;
        let time_diff = (self.time_out - self.time_in).num_seconds();
        let time_diff = if self.is_overnight() {
            time_diff + 86_400
        } else {
            time_diff
        };
        day_span_secs + time_diff
    }

    /// Weekly eligibility: active, effective, and not already run today.
    pub fn eligible_for_weekly(&self, today: NaiveDate) -> bool {
        self.is_active
            && self.start_date <= today
            && self.end_date.map_or(true, |end| end >= today)
            && self.last_run.map_or(true, |lr| lr < today)
    }

    /// Monthly eligibility: active, effective, and not already run for the
    /// month ending at `month_last_day`.
    pub fn eligible_for_monthly(&self, month_last_day: NaiveDate) -> bool {
        self.is_active
            && self.start_date <= month_last_day
            && self
                .end_date
                .map_or(true, |end| end >= month_last_day)
            && self.last_run.map_or(true, |lr| lr <= month_last_day)
    }

    pub fn has_group(&self) -> bool {
        self.group_id.map_or(false, |g| g > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_template() -> Template {
        Template {
            template_id: 1,
            recurring_kind: RecurringKind::Weekly,
            week_stride: 1,
            nth_weekday: None,
            days: DaySet::from_bits(0b0000010), // Monday
            start_date: NaiveDate::from_ymd_opt(2026, 1, 5).unwrap(),
            end_date: None,
            last_run: None,
            time_in: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            time_out: NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
            day_span: 0,
            client_id: 9,
            employee_id: 100,
            company_id: 1,
            group_id: None,
            schedule_kind: ScheduleKind::Individual,
            is_active: true,
            is_reset: false,
            has_scan_areas: false,
            has_claims: false,
            extra: None,
        }
    }

    #[test]
    fn day_set_contains_only_flagged_days() {
        let days = DaySet::from_bits(0b0000010); // Monday
        assert!(days.contains(chrono::Weekday::Mon));
        assert!(!days.contains(chrono::Weekday::Tue));
    }

    #[test]
    fn overnight_shift_detected_when_time_out_before_time_in() {
        let mut t = base_template();
        t.time_in = NaiveTime::from_hms_opt(22, 0, 0).unwrap();
        t.time_out = NaiveTime::from_hms_opt(6, 0, 0).unwrap();
        assert!(t.is_overnight());
        assert_eq!(t.duration_seconds(), 8 * 3600);
    }

    #[test]
    fn day_shift_duration_is_simple_difference() {
        let t = base_template();
        assert_eq!(t.duration_seconds(), 4 * 3600);
    }

    #[test]
    fn eligible_for_weekly_requires_last_run_before_today() {
        let mut t = base_template();
        let today = NaiveDate::from_ymd_opt(2026, 1, 12).unwrap();
        assert!(t.eligible_for_weekly(today));
        t.last_run = Some(today);
        assert!(!t.eligible_for_weekly(today));
        t.last_run = Some(today.pred_opt().unwrap());
        assert!(t.eligible_for_weekly(today));
    }

    #[test]
    fn eligible_for_weekly_respects_absent_end_date() {
        let t = base_template();
        let far_future = NaiveDate::from_ymd_opt(2099, 1, 1).unwrap();
        assert!(t.eligible_for_weekly(far_future));
    }

    #[test]
    fn inactive_template_is_never_eligible() {
        let mut t = base_template();
        t.is_active = false;
        assert!(!t.eligible_for_weekly(t.start_date));
    }

    #[test]
    fn has_group_is_false_for_zero_or_absent_group_id() {
        let mut t = base_template();
        assert!(!t.has_group());
        t.group_id = Some(0);
        assert!(!t.has_group());
        t.group_id = Some(5);
        assert!(t.has_group());
    }
}
