//! Shift materialization engine.
//!
//! Expands recurring shift templates into dated, concrete shift instances in
//! Postgres. See `domains::scheduler` for the engine itself; `server` exposes
//! an HTTP control plane over the same engine.

pub mod config;
pub mod domains;
pub mod kernel;
pub mod server;

pub use config::SchedulerConfig;
pub use domains::scheduler::engine::SchedulerEngine;
pub use domains::scheduler::error::EngineError;
