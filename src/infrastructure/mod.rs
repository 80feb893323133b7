//! Infrastructure Layer
//!
//! Cross-cutting components shared by the application services.

pub mod address_cache;
pub mod lru;
pub mod shutdown;

pub use address_cache::{AddressCache, CacheEntry, DEFAULT_CACHE_CAPACITY, DEFAULT_CACHE_TTL};
pub use lru::{LruCache, Weighted};
pub use shutdown::shutdown_signal;
