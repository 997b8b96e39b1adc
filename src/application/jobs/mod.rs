//! Background work: the deferred global purge and the session sweep.
//!
//! The purge goes through the Postgres-backed queue so an admin request
//! returns immediately while the sweep over every stored page runs in a
//! worker. The session sweep is cron-driven and never touches the queue.

mod context;
mod purge;
mod sessions;

pub use context::{JobWorkerContext, job_failed};
pub use purge::{PurgeAllJobPayload, enqueue_purge_all, process_purge_all_job};
pub use sessions::{
    SessionSweepContext, SessionSweepJob, process_session_sweep_job, session_sweep_schedule,
};
