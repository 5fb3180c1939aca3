//! In-memory duplicate index.
//!
//! Replaces a per-candidate `COUNT(*)` probe with O(1) set membership. Loaded
//! once from existing instances in the run's lookahead window, then mutated
//! as the run commits new candidates so intra-run duplicates are also
//! caught.

use std::collections::HashSet;

use crate::domains::scheduler::models::instance::{DedupMinute, Instance};
use crate::domains::scheduler::models::{ClientId, EmployeeId, TemplateId};

type StdKey = (ClientId, EmployeeId, DedupMinute, DedupMinute);
type OpenKey = (TemplateId, ClientId, EmployeeId, DedupMinute, DedupMinute);

/// Owns `K_std` and `K_open`. One instance per run; never shared across
/// runs.
#[derive(Debug, Default)]
pub struct DedupIndex {
    std_keys: HashSet<StdKey>,
    open_keys: HashSet<OpenKey>,
}

impl DedupIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_std(&mut self, key: StdKey) {
        self.std_keys.insert(key);
    }

    pub fn insert_open(&mut self, key: OpenKey) {
        self.open_keys.insert(key);
    }

    pub fn contains_std(&self, key: &StdKey) -> bool {
        self.std_keys.contains(key)
    }

    pub fn contains_open(&self, key: &OpenKey) -> bool {
        self.open_keys.contains(key)
    }

    /// Register a committed instance into both relevant sets.
    pub fn register(&mut self, instance: &Instance) {
        self.insert_std(instance.k_std());
        self.insert_open(instance.k_open());
    }

    /// Probe by the schedule-kind-appropriate key.
    pub fn is_duplicate(&self, instance: &Instance, is_open_claim: bool) -> bool {
        if is_open_claim {
            self.contains_open(&instance.k_open())
        } else {
            self.contains_std(&instance.k_std())
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn instance(template_id: i64, employee: i64, client: i64) -> Instance {
        Instance::builder()
            .template_id(template_id)
            .client_id(client)
            .employee_id(employee)
            .company_id(1i64)
            .start_ts(Utc.timestamp_opt(1_700_000_000, 0).unwrap())
            .end_ts(Utc.timestamp_opt(1_700_003_600, 0).unwrap())
            .note("Scheduled Event".to_string())
            .build()
    }

    #[test]
    fn std_probe_hits_after_register() {
        let mut index = DedupIndex::new();
        let i = instance(1, 100, 9);
        assert!(!index.is_duplicate(&i, false));
        index.register(&i);
        assert!(index.is_duplicate(&i, false));
    }

    #[test]
    fn open_claim_templates_coexist_at_same_slot() {
        let mut index = DedupIndex::new();
        let a = instance(5, 0, 9);
        let b = instance(6, 0, 9);
        index.register(&a);
        // Different template_id under OPEN_CLAIM means it's not a duplicate.
        assert!(!index.is_duplicate(&b, true));
        // But it IS a duplicate of itself, re-run.
        assert!(index.is_duplicate(&a, true));
    }

    #[test]
    fn std_key_is_shared_regardless_of_template_for_non_open_claim() {
        let mut index = DedupIndex::new();
        let a = instance(5, 100, 9);
        let mut b = instance(6, 100, 9);
        b.start_ts = a.start_ts;
        b.end_ts = a.end_ts;
        index.register(&a);
        assert!(index.is_duplicate(&b, false));
    }
}
