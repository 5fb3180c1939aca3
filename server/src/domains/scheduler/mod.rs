pub mod engine;
pub mod error;
pub mod expansion;
pub mod indexes;
pub mod models;
pub mod repository;
pub mod session;

pub use engine::SchedulerEngine;
pub use error::EngineError;
