//! Per-employee overlap index.
//!
//! Key = employee_id; value = intervals sorted ascending by start, so `probe`
//! can terminate early once `existing.start >= end`. `employee_id = 0` is
//! never inserted (unassigned shifts can't overlap with anything).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domains::scheduler::models::{ClientId, EmployeeId, TemplateId};

#[derive(Debug, Clone)]
pub struct Interval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub client_id: ClientId,
    pub instance_id: Uuid,
    pub template_id: TemplateId,
}

#[derive(Debug, Default)]
pub struct OverlapIndex {
    by_employee: HashMap<EmployeeId, Vec<Interval>>,
}

impl OverlapIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an interval, keeping the employee's list sorted by start. Used
    /// both to pre-load existing instances and to record instances accepted
    /// during the current run, so intra-run conflicts are also caught.
    pub fn register(
        &mut self,
        employee_id: EmployeeId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        client_id: ClientId,
        instance_id: Uuid,
        template_id: TemplateId,
    ) {
        if employee_id == 0 {
            return;
        }
        let list = self.by_employee.entry(employee_id).or_default();
        let pos = list.partition_point(|iv| iv.start <= start);
        list.insert(
            pos,
            Interval {
                start,
                end,
                client_id,
                instance_id,
                template_id,
            },
        );
    }

    /// Returns the first colliding interval at a *different* client_id, if
    /// any. Same-client overlap is not reported here - it's absorbed by
    /// dedup, since the dedup key includes client_id and time.
    pub fn probe(
        &self,
        employee_id: EmployeeId,
        client_id: ClientId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Option<&Interval> {
        if employee_id == 0 {
            return None;
        }
        let list = self.by_employee.get(&employee_id)?;
        for existing in list {
            if existing.start >= end {
                break;
            }
            let overlaps = start < existing.end && end > existing.start;
            if overlaps && existing.client_id != client_id {
                return Some(existing);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn different_client_overlap_is_detected() {
        let mut index = OverlapIndex::new();
        index.register(50, ts(1_000), ts(2_000), 1, Uuid::new_v4(), 10);
        let hit = index.probe(50, 2, ts(1_500), ts(2_500));
        assert!(hit.is_some());
    }

    #[test]
    fn same_client_overlap_is_not_reported() {
        let mut index = OverlapIndex::new();
        index.register(50, ts(1_000), ts(2_000), 1, Uuid::new_v4(), 10);
        let hit = index.probe(50, 1, ts(1_500), ts(2_500));
        assert!(hit.is_none());
    }

    #[test]
    fn back_to_back_shifts_do_not_overlap() {
        let mut index = OverlapIndex::new();
        index.register(50, ts(1_000), ts(2_000), 1, Uuid::new_v4(), 10);
        // starts exactly when the previous ends
        let hit = index.probe(50, 2, ts(2_000), ts(3_000));
        assert!(hit.is_none());
    }

    #[test]
    fn unassigned_employee_never_registers_or_probes() {
        let mut index = OverlapIndex::new();
        index.register(0, ts(1_000), ts(2_000), 1, Uuid::new_v4(), 10);
        assert!(index.by_employee.is_empty());
        assert!(index.probe(0, 2, ts(1_000), ts(2_000)).is_none());
    }

    #[test]
    fn probe_terminates_early_past_the_target_end() {
        let mut index = OverlapIndex::new();
        for i in 0..5 {
            let base = i * 10_000;
            index.register(
                50,
                ts(base),
                ts(base + 1_000),
                1,
                Uuid::new_v4(),
                i as i64,
            );
        }
        // A window that lands entirely before the third interval's start
        // must not match any interval starting after it.
        let hit = index.probe(50, 2, ts(500), ts(900));
        assert!(hit.is_none());
    }
}
