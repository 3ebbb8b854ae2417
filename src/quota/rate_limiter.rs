//! Sliding-window request-count limiter, one instance per credential

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::core::errors::QuotaScope;
use crate::quota::ledger::CredentialQuota;

/// Verdict returned by [`RateLimiter::check`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimiterVerdict {
    pub allowed: bool,
    /// The binding window when not allowed; long window takes precedence
    /// because the short window frees regardless
    pub limiting: Option<QuotaScope>,
    pub short_remaining: usize,
    pub long_remaining: usize,
    /// Time until the oldest short-window event expires, zero if empty
    pub short_reset_in: Duration,
    /// Time until the oldest long-window event expires, zero if empty
    pub long_reset_in: Duration,
}

/// Two nested sliding windows of consumption timestamps
///
/// Timestamps older than the window boundary are pruned lazily on the next
/// check, so storage is bounded by the limits themselves: once a list reaches
/// its limit no more events are recorded until older ones expire.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    short_limit: usize,
    short_window: chrono::Duration,
    long_limit: usize,
    long_window: chrono::Duration,
    short_events: Vec<DateTime<Utc>>,
    long_events: Vec<DateTime<Utc>>,
}

impl RateLimiter {
    pub fn new(
        short_limit: usize,
        short_window: Duration,
        long_limit: usize,
        long_window: Duration,
    ) -> Self {
        Self {
            short_limit,
            short_window: chrono::Duration::from_std(short_window)
                .unwrap_or_else(|_| chrono::Duration::seconds(60)),
            long_limit,
            long_window: chrono::Duration::from_std(long_window)
                .unwrap_or_else(|_| chrono::Duration::hours(24)),
            short_events: Vec::new(),
            long_events: Vec::new(),
        }
    }

    /// Is one more unit of work allowed right now
    pub fn check(&mut self) -> LimiterVerdict {
        self.check_at(Utc::now())
    }

    /// Record one unit of consumption in both windows
    pub fn record(&mut self) {
        self.record_at(Utc::now());
    }

    /// Clock-injectable variant of [`check`](Self::check)
    pub fn check_at(&mut self, now: DateTime<Utc>) -> LimiterVerdict {
        self.prune(now);

        let short_ok = self.short_events.len() < self.short_limit;
        let long_ok = self.long_events.len() < self.long_limit;
        let allowed = short_ok && long_ok;

        let limiting = if allowed {
            None
        } else if !long_ok {
            Some(QuotaScope::LongWindow)
        } else {
            Some(QuotaScope::ShortWindow)
        };

        LimiterVerdict {
            allowed,
            limiting,
            short_remaining: self.short_limit.saturating_sub(self.short_events.len()),
            long_remaining: self.long_limit.saturating_sub(self.long_events.len()),
            short_reset_in: reset_in(&self.short_events, self.short_window, now),
            long_reset_in: reset_in(&self.long_events, self.long_window, now),
        }
    }

    /// Clock-injectable variant of [`record`](Self::record)
    pub fn record_at(&mut self, now: DateTime<Utc>) {
        self.short_events.push(now);
        self.long_events.push(now);
    }

    /// Drop events that have slid out of their window
    fn prune(&mut self, now: DateTime<Utc>) {
        let short_cutoff = now - self.short_window;
        let long_cutoff = now - self.long_window;
        self.short_events.retain(|t| *t > short_cutoff);
        self.long_events.retain(|t| *t > long_cutoff);
    }

    /// Durable view of the live event lists
    pub fn snapshot(&self) -> CredentialQuota {
        CredentialQuota {
            short_events: self.short_events.clone(),
            long_events: self.long_events.clone(),
        }
    }

    /// Merge a stored snapshot, dropping events that expired while down
    pub fn restore(&mut self, snapshot: &CredentialQuota, now: DateTime<Utc>) {
        self.short_events = snapshot.short_events.clone();
        self.long_events = snapshot.long_events.clone();
        self.prune(now);
    }
}

fn reset_in(
    events: &[DateTime<Utc>],
    window: chrono::Duration,
    now: DateTime<Utc>,
) -> Duration {
    match events.first() {
        Some(oldest) => (window - (now - *oldest)).to_std().unwrap_or(Duration::ZERO),
        None => Duration::ZERO,
    }
}
