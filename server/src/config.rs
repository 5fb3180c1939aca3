use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;

/// Engine configuration loaded from environment variables.
///
/// Every field here is a tunable for one stage of the run pipeline; defaults
/// are chosen to be safe for a first deployment against an existing, already
/// populated schedule.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub database_url: String,
    pub http_port: u16,
    pub api_key: Option<String>,

    pub advance_days: i64,
    pub monthly_months_ahead: i64,
    pub delete_batch_size: i64,
    pub insert_batch_size: i64,
    pub sleep_between_batches_ms: u64,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub history_retention_days: i64,
    pub audit_retention_days: i64,
    pub session_time_zone: String,
}

impl SchedulerConfig {
    /// Load configuration from environment variables, applying documented
    /// defaults for anything unset.
    pub fn from_env() -> Result<Self> {
        let _ = dotenv();

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            http_port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("PORT must be a valid number")?,
            api_key: env::var("SCHEDULER_API_KEY").ok(),

            advance_days: env_i64("SCHEDULER_ADVANCE_DAYS", 45)?,
            monthly_months_ahead: env_i64("SCHEDULER_MONTHLY_MONTHS_AHEAD", 3)?,
            delete_batch_size: env_i64("SCHEDULER_DELETE_BATCH_SIZE", 5000)?,
            insert_batch_size: env_i64("SCHEDULER_INSERT_BATCH_SIZE", 1000)?,
            sleep_between_batches_ms: env_i64("SCHEDULER_SLEEP_BETWEEN_BATCHES_MS", 100)? as u64,
            max_retries: env_i64("SCHEDULER_MAX_RETRIES", 5)? as u32,
            retry_base_delay_ms: env_i64("SCHEDULER_RETRY_BASE_DELAY_MS", 200)? as u64,
            history_retention_days: env_i64("SCHEDULER_HISTORY_RETENTION_DAYS", 120)?,
            audit_retention_days: env_i64("SCHEDULER_AUDIT_RETENTION_DAYS", 3)?,
            session_time_zone: env::var("SCHEDULER_SESSION_TIME_ZONE")
                .unwrap_or_else(|_| "US/Eastern".to_string()),
        })
    }
}

fn env_i64(name: &str, default: i64) -> Result<i64> {
    match env::var(name) {
        Ok(v) => v.parse().with_context(|| format!("{name} must be a valid integer")),
        Err(_) => Ok(default),
    }
}
