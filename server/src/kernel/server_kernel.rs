//! ServerKernel - core infrastructure with all dependencies.
//!
//! Holds the database pool and the configuration every run needs. Kept
//! deliberately thin: the engine owns its own per-run state (dedup sets,
//! overlap index, audit buffers), the kernel only owns what outlives a run.

use sqlx::PgPool;

use crate::config::SchedulerConfig;

/// Dependencies shared by every run of the engine and by the HTTP surface.
#[derive(Clone)]
pub struct ServerKernel {
    pub db_pool: PgPool,
    pub config: SchedulerConfig,
}

impl ServerKernel {
    pub fn new(db_pool: PgPool, config: SchedulerConfig) -> Self {
        Self { db_pool, config }
    }
}
