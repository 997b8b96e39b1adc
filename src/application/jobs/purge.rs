use apalis::prelude::{Data, Error as ApalisError};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::application::repos::{JobQueue, RepoError};
use crate::domain::types::JobType;

use super::context::{JobWorkerContext, job_failed};

/// Payload of the deferred global purge. The purge itself takes no
/// parameters; the reason only shows up in worker logs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PurgeAllJobPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Enqueue a global purge. Fire-and-forget; returns the job id.
pub async fn enqueue_purge_all(
    jobs: &dyn JobQueue,
    reason: Option<String>,
) -> Result<String, RepoError> {
    let payload = serde_json::to_value(PurgeAllJobPayload { reason })
        .map_err(|err| RepoError::from_persistence(err.to_string()))?;
    jobs.enqueue(JobType::PurgeAll, payload).await
}

pub async fn process_purge_all_job(
    payload: PurgeAllJobPayload,
    context: Data<JobWorkerContext>,
) -> Result<(), ApalisError> {
    info!(
        target = "application::jobs::process_purge_all_job",
        reason = payload.reason.as_deref().unwrap_or("unspecified"),
        "Running deferred global cache purge"
    );
    context.invalidation.purge_all().await.map_err(job_failed)
}
