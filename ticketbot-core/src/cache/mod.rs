// File: src/cache/mod.rs

pub mod keyed_locks;
pub mod rate_limiter;

pub use keyed_locks::KeyedLocks;
pub use rate_limiter::{RateLimitPolicy, RateLimiter, DEFAULT_RETENTION};
