//! Database access for the engine. One module per stage of the pipeline:
//! `snapshot` loads, `cleanup` retracts, `finalize` advances and flushes.
//! No ORM - hand-written SQL with `query_as`/`FromRow`.

pub mod cleanup;
pub mod finalize;
pub mod snapshot;
pub mod write;

pub use cleanup::{run_cleanup, CleanupReport};
pub use finalize::finalize_run;
pub use snapshot::Snapshot;
pub use write::persist_sub_batches;
