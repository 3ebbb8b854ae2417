//! Quota accounting: sliding windows, monthly volume budget, durable ledger

pub mod ledger;
pub mod rate_limiter;
pub mod unit_limiter;

pub use ledger::{CredentialQuota, LedgerSnapshot, QuotaLedger, VolumeQuota};
pub use rate_limiter::{LimiterVerdict, RateLimiter};
pub use unit_limiter::{UnitLimiter, UnitVerdict};
