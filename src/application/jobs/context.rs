use std::sync::Arc;

use apalis::prelude::Error as ApalisError;

use crate::cache::InvalidationEngine;

/// Shared context handed to queue-backed job workers.
#[derive(Clone)]
pub struct JobWorkerContext {
    pub invalidation: Arc<InvalidationEngine>,
}

/// Wrap a worker failure in the error shape apalis records.
pub fn job_failed<E>(err: E) -> ApalisError
where
    E: std::error::Error + Send + Sync + 'static,
{
    ApalisError::Failed(Arc::new(Box::new(err)))
}
