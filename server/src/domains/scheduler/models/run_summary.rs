//! Run summary - one row per engine run, also the HTTP control-plane's
//! `POST /scheduler/run` response body.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Blocked,
    Cancelled,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Blocked => "blocked",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct RunSummary {
    #[builder(default = Uuid::new_v4())]
    pub run_id: Uuid,
    #[builder(default = Utc::now())]
    pub started_at: DateTime<Utc>,
    #[builder(default, setter(strip_option))]
    pub completed_at: Option<DateTime<Utc>>,
    #[builder(default, setter(strip_option))]
    pub duration_s: Option<f64>,
    #[builder(default = RunStatus::Running)]
    pub status: RunStatus,
    #[builder(default = 0)]
    pub created_count: i64,
    #[builder(default = 0)]
    pub duplicate_count: i64,
    #[builder(default = 0)]
    pub overlap_count: i64,
    #[builder(default = 0)]
    pub error_count: i64,
    #[builder(default, setter(strip_option))]
    pub error: Option<String>,
}

impl RunSummary {
    pub fn finish(&mut self, status: RunStatus, error: Option<String>) {
        let now = Utc::now();
        self.completed_at = Some(now);
        self.duration_s = Some((now - self.started_at).num_milliseconds() as f64 / 1000.0);
        self.status = status;
        self.error = error;
    }
}
