//! Poison recovery for the cache's interior mutex.

use std::sync::{Mutex, MutexGuard};

use tracing::warn;

/// Cached state stays valid when another holder panics, so a poisoned
/// mutex is recovered rather than propagated.
pub(crate) trait RecoverPoison<T> {
    fn lock_recovering(&self, during: &'static str) -> MutexGuard<'_, T>;
}

impl<T> RecoverPoison<T> for Mutex<T> {
    fn lock_recovering(&self, during: &'static str) -> MutexGuard<'_, T> {
        self.lock().unwrap_or_else(|poisoned| {
            warn!(during, "Recovered a poisoned cache lock");
            poisoned.into_inner()
        })
    }
}
