//! Priority-ordered credential pool for the request-count provider

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::quota::{CredentialQuota, RateLimiter};
use crate::providers::TranslationBackend;

/// One key's worth of independently-tracked capacity
#[derive(Debug)]
pub struct Credential {
    pub name: String,
    pub limiter: RateLimiter,
    pub backend: Arc<dyn TranslationBackend>,
}

/// Pool-level availability, used for early rejection before any call
#[derive(Debug, Clone, Copy)]
pub struct PoolStatus {
    /// True iff at least one credential is allowed
    pub allowed: bool,
    pub total_short_remaining: usize,
    pub total_long_remaining: usize,
    /// Minimum, across exhausted credentials, of time until the short
    /// window frees
    pub min_wait: Option<Duration>,
    /// True when every exhausted credential is bound by its long window,
    /// so waiting out the short window would not help
    pub daily_bound: bool,
}

/// Fixed priority order, first-available-wins. Earlier credentials are
/// preferred so later ones stay fully available as overflow for bursts,
/// which also keeps selection deterministic.
#[derive(Debug, Default)]
pub struct CredentialPool {
    credentials: Vec<Credential>,
}

impl CredentialPool {
    pub fn new(credentials: Vec<Credential>) -> Self {
        Self { credentials }
    }

    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }

    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    pub fn credential(&self, index: usize) -> &Credential {
        &self.credentials[index]
    }

    /// First credential whose limiter allows one more request, skipping
    /// `skip` when rotating away from a credential that just failed
    pub fn select_available_at(
        &mut self,
        now: DateTime<Utc>,
        skip: Option<usize>,
    ) -> Option<usize> {
        for (index, credential) in self.credentials.iter_mut().enumerate() {
            if Some(index) == skip {
                continue;
            }
            if credential.limiter.check_at(now).allowed {
                debug!(credential = %credential.name, "selected credential");
                return Some(index);
            }
        }
        None
    }

    /// Record one request against a credential's quota
    pub fn record_at(&mut self, index: usize, now: DateTime<Utc>) {
        self.credentials[index].limiter.record_at(now);
    }

    /// Aggregate availability across the whole pool
    pub fn aggregate_status_at(&mut self, now: DateTime<Utc>) -> PoolStatus {
        let mut allowed = false;
        let mut total_short_remaining = 0;
        let mut total_long_remaining = 0;
        let mut min_wait: Option<Duration> = None;
        let mut daily_bound = !self.credentials.is_empty();

        for credential in &mut self.credentials {
            let verdict = credential.limiter.check_at(now);
            total_short_remaining += verdict.short_remaining;
            total_long_remaining += verdict.long_remaining;

            if verdict.allowed {
                allowed = true;
                daily_bound = false;
            } else {
                if !verdict
                    .limiting
                    .map(|scope| scope.is_daily())
                    .unwrap_or(false)
                {
                    daily_bound = false;
                }
                let wait = verdict.short_reset_in;
                min_wait = Some(min_wait.map_or(wait, |w| w.min(wait)));
            }
        }

        PoolStatus {
            allowed,
            total_short_remaining,
            total_long_remaining,
            min_wait: if allowed { None } else { min_wait },
            daily_bound: !allowed && daily_bound,
        }
    }

    /// Durable view of every credential's windows, keyed by name
    pub fn snapshot(&self) -> std::collections::BTreeMap<String, CredentialQuota> {
        self.credentials
            .iter()
            .map(|c| (c.name.clone(), c.limiter.snapshot()))
            .collect()
    }

    /// Merge stored window state into matching credentials, dropping events
    /// that expired while the process was down
    pub fn restore(
        &mut self,
        snapshot: &std::collections::BTreeMap<String, CredentialQuota>,
        now: DateTime<Utc>,
    ) {
        for credential in &mut self.credentials {
            if let Some(stored) = snapshot.get(&credential.name) {
                credential.limiter.restore(stored, now);
            }
        }
    }
}
