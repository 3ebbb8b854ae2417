//! Calendar-month character budget for the volume-billed provider

use std::time::Duration;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use tracing::info;

use crate::quota::ledger::VolumeQuota;

/// Verdict returned by [`UnitLimiter::check`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitVerdict {
    pub allowed: bool,
    pub remaining: usize,
    pub used: usize,
    /// Time until the budget resets at the next calendar-month boundary
    pub reset_in: Duration,
}

/// Consumed-units tracker with calendar-month reset
///
/// Separate from [`RateLimiter`](crate::quota::rate_limiter::RateLimiter)
/// because this quota is billed by input size, not call count, and resets on
/// the wall-clock month boundary rather than a rolling window.
#[derive(Debug, Clone)]
pub struct UnitLimiter {
    monthly_limit: usize,
    used: usize,
    month_start: NaiveDate,
}

impl UnitLimiter {
    pub fn new(monthly_limit: usize) -> Self {
        Self {
            monthly_limit,
            used: 0,
            month_start: month_start_of(Utc::now()),
        }
    }

    /// Would consuming `units` stay within this month's budget
    pub fn check(&mut self, units: usize) -> UnitVerdict {
        self.check_at(units, Utc::now())
    }

    /// Record `units` of consumption
    pub fn record(&mut self, units: usize) {
        self.record_at(units, Utc::now());
    }

    /// Clock-injectable variant of [`check`](Self::check)
    pub fn check_at(&mut self, units: usize, now: DateTime<Utc>) -> UnitVerdict {
        self.roll_over_if_needed(now);
        UnitVerdict {
            allowed: self.used + units <= self.monthly_limit,
            remaining: self.monthly_limit.saturating_sub(self.used),
            used: self.used,
            reset_in: reset_in(self.month_start, now),
        }
    }

    /// Clock-injectable variant of [`record`](Self::record)
    pub fn record_at(&mut self, units: usize, now: DateTime<Utc>) {
        self.roll_over_if_needed(now);
        self.used = self.used.saturating_add(units);
    }

    fn roll_over_if_needed(&mut self, now: DateTime<Utc>) {
        let current = month_start_of(now);
        if current != self.month_start {
            info!(
                month = %current,
                carried = self.used,
                "monthly quota rolled over"
            );
            self.used = 0;
            self.month_start = current;
        }
    }

    /// Durable view of this month's consumption
    pub fn snapshot(&self) -> VolumeQuota {
        VolumeQuota {
            used: self.used,
            month_start: self.month_start,
        }
    }

    /// Adopt a stored snapshot verbatim; a stale epoch is cleared by the
    /// rollover on the next check
    pub fn restore(&mut self, snapshot: &VolumeQuota) {
        self.used = snapshot.used;
        self.month_start = snapshot.month_start;
    }
}

fn month_start_of(now: DateTime<Utc>) -> NaiveDate {
    let today = now.date_naive();
    today.with_day(1).unwrap_or(today)
}

fn next_month_start(month_start: NaiveDate) -> NaiveDate {
    let (year, month) = (month_start.year(), month_start.month());
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    };
    next.unwrap_or(month_start)
}

/// Time from `now` until the next calendar-month boundary
fn reset_in(month_start: NaiveDate, now: DateTime<Utc>) -> Duration {
    let boundary = next_month_start(month_start)
        .and_hms_opt(0, 0, 0)
        .map(|ndt| ndt.and_utc());
    match boundary {
        Some(boundary) => (boundary - now).to_std().unwrap_or(Duration::ZERO),
        None => Duration::ZERO,
    }
}
