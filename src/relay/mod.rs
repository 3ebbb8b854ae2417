//! Request admission: cache, credential pool, and the serial scheduler

pub mod cache;
pub mod pool;
pub mod scheduler;

pub use cache::{CacheKey, ResultCache};
pub use pool::{Credential, CredentialPool, PoolStatus};
pub use scheduler::{PendingRequest, Readiness, Scheduler};
