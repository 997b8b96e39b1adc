//! Cache configuration.

use std::num::NonZeroUsize;

use serde::Deserialize;

const DEFAULT_ENTRY_LIMIT: usize = 256;
const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

/// Cache configuration from `quaderno.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Enable the anonymous-content cache.
    pub enabled: bool,
    /// Maximum number of cached entries before LRU eviction.
    pub entry_limit: usize,
    /// Entries with bodies larger than this are never stored.
    pub max_body_bytes: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            entry_limit: DEFAULT_ENTRY_LIMIT,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl CacheConfig {
    /// Entry limit as `NonZeroUsize`, clamping to 1 if zero.
    pub fn entry_limit_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.entry_limit).unwrap_or(NonZeroUsize::MIN)
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            entry_limit: settings.entry_limit,
            max_body_bytes: settings.max_body_bytes,
        }
    }
}
