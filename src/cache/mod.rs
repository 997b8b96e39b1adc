//! Anonymous-content cache.
//!
//! Rendered responses for signed-out visitors are kept under stable string
//! keys (`Page:<title>`, `Index:`, ...) and served without touching storage
//! until an edit purges them. Signed-in visitors always bypass the cache,
//! both on read and on write, so personalised chrome never leaks between
//! visitors.
//!
//! ## Configuration
//!
//! Cache behavior is controlled via `quaderno.toml`:
//!
//! ```toml
//! [cache]
//! enabled = true
//! entry_limit = 256
//! max_body_bytes = 1048576
//! ```

mod config;
mod invalidation;
mod keys;
mod lock;
mod resolver;
mod store;

pub use config::CacheConfig;
pub use invalidation::InvalidationEngine;
pub use keys::CacheKey;
pub use resolver::ContentResolver;
pub use store::{CacheStore, CachedContent, MemoryCacheStore};
