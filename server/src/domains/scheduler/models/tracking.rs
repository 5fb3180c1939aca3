//! Tracking row - one per multi-week template, carrying the walk anchor
//! across runs.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::TemplateId;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TrackingRow {
    pub template_id: TemplateId,
    pub next_date: NaiveDate,
    pub changed_this_run: bool,
    pub edit_mode: bool,
}

impl TrackingRow {
    pub fn new(template_id: TemplateId, next_date: NaiveDate) -> Self {
        Self {
            template_id,
            next_date,
            changed_this_run: false,
            edit_mode: false,
        }
    }
}
