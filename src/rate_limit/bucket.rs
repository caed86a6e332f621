//! Fixed-Window Counters and Tenant Buckets
//!
//! A [`WindowCounter`] counts admissions inside a fixed window. The window
//! boundary is not driven by a timer: every evaluation first calls
//! [`WindowCounter::roll_over`], which zeroes the count once the window has
//! elapsed since the last reset.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::action::ActionType;

/// Observable state of a counter relative to its effective limit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CounterState {
    /// Nothing counted in the current window
    Fresh,
    /// Some admissions counted, headroom left
    Active,
    /// Effective limit reached; further checks deny until rollover
    Saturated,
}

/// Fixed-window admission counter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowCounter {
    count: u32,
    last_reset: DateTime<Utc>,
}

impl WindowCounter {
    /// Create a fresh counter whose window starts at `now`
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            count: 0,
            last_reset: now,
        }
    }

    /// Admissions counted in the current window
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Start of the current window
    pub fn last_reset(&self) -> DateTime<Utc> {
        self.last_reset
    }

    /// Whether the window has strictly elapsed at `now`
    pub fn is_expired(&self, now: DateTime<Utc>, window: TimeDelta) -> bool {
        now.signed_duration_since(self.last_reset) > window
    }

    /// Reset the counter if its window has elapsed
    ///
    /// Returns `true` when a reset happened.
    pub fn roll_over(&mut self, now: DateTime<Utc>, window: TimeDelta) -> bool {
        if self.is_expired(now, window) {
            self.count = 0;
            self.last_reset = now;
            true
        } else {
            false
        }
    }

    /// Whether another admission would exceed `effective_limit`
    pub fn is_saturated(&self, effective_limit: u32) -> bool {
        self.count >= effective_limit
    }

    /// Count one admission, returning the new count
    pub fn increment(&mut self) -> u32 {
        self.count = self.count.saturating_add(1);
        self.count
    }

    /// When the current window ends
    pub fn reset_time(&self, window: TimeDelta) -> DateTime<Utc> {
        self.last_reset
            .checked_add_signed(window)
            .unwrap_or(self.last_reset)
    }

    /// Whole seconds until the window ends, rounded up, never negative
    pub fn retry_after_secs(&self, now: DateTime<Utc>, window: TimeDelta) -> u64 {
        let millis = self
            .reset_time(window)
            .signed_duration_since(now)
            .num_milliseconds();
        if millis <= 0 {
            0
        } else {
            (millis as u64).div_ceil(1000)
        }
    }

    /// Classify the counter against an effective limit
    pub fn state(&self, effective_limit: u32) -> CounterState {
        if self.is_saturated(effective_limit) {
            CounterState::Saturated
        } else if self.count == 0 {
            CounterState::Fresh
        } else {
            CounterState::Active
        }
    }
}

/// Per-tenant quota state: one global counter plus lazily created per-action counters
#[derive(Debug, Clone)]
pub struct TenantBucket {
    pub(crate) global: WindowCounter,
    pub(crate) actions: HashMap<ActionType, WindowCounter>,
    pub(crate) last_seen: DateTime<Utc>,
}

impl TenantBucket {
    /// Create an empty bucket first seen at `now`
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            global: WindowCounter::new(now),
            actions: HashMap::new(),
            last_seen: now,
        }
    }

    /// The tenant-wide counter
    pub fn global(&self) -> &WindowCounter {
        &self.global
    }

    /// Counter for `action`, if it has been used
    pub fn action(&self, action: ActionType) -> Option<&WindowCounter> {
        self.actions.get(&action)
    }

    /// Iterate over materialized action counters
    pub fn actions(&self) -> impl Iterator<Item = (&ActionType, &WindowCounter)> {
        self.actions.iter()
    }

    /// Last time the tenant made any admission check
    pub fn last_seen(&self) -> DateTime<Utc> {
        self.last_seen
    }

    /// Fetch or lazily create the counter for `action`
    pub(crate) fn action_counter_mut(
        &mut self,
        action: ActionType,
        now: DateTime<Utc>,
    ) -> &mut WindowCounter {
        self.actions
            .entry(action)
            .or_insert_with(|| WindowCounter::new(now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn test_counter_starts_fresh() {
        let counter = WindowCounter::new(t0());
        assert_eq!(counter.count(), 0);
        assert_eq!(counter.state(5), CounterState::Fresh);
    }

    #[test]
    fn test_counter_saturates() {
        let mut counter = WindowCounter::new(t0());
        counter.increment();
        assert_eq!(counter.state(2), CounterState::Active);
        counter.increment();
        assert_eq!(counter.state(2), CounterState::Saturated);
        assert!(counter.is_saturated(2));
    }

    #[test]
    fn test_rollover_only_after_window_strictly_elapsed() {
        let window = TimeDelta::seconds(60);
        let mut counter = WindowCounter::new(t0());
        counter.increment();

        assert!(!counter.roll_over(t0() + TimeDelta::seconds(60), window));
        assert_eq!(counter.count(), 1);

        let later = t0() + TimeDelta::milliseconds(60_001);
        assert!(counter.roll_over(later, window));
        assert_eq!(counter.count(), 0);
        assert_eq!(counter.last_reset(), later);
    }

    #[test]
    fn test_retry_after_rounds_up() {
        let window = TimeDelta::seconds(60);
        let counter = WindowCounter::new(t0());
        let now = t0() + TimeDelta::milliseconds(10_500);
        assert_eq!(counter.retry_after_secs(now, window), 50);
        assert_eq!(counter.reset_time(window), t0() + window);
    }

    #[test]
    fn test_retry_after_never_negative() {
        let window = TimeDelta::seconds(1);
        let counter = WindowCounter::new(t0());
        assert_eq!(counter.retry_after_secs(t0() + TimeDelta::seconds(5), window), 0);
    }

    #[test]
    fn test_action_counters_are_lazy() {
        let mut bucket = TenantBucket::new(t0());
        assert!(bucket.action(ActionType::Payment).is_none());

        bucket.action_counter_mut(ActionType::Payment, t0()).increment();
        assert_eq!(bucket.action(ActionType::Payment).map(|c| c.count()), Some(1));
        assert_eq!(bucket.actions().count(), 1);
    }
}
