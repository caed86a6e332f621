//! Stale Bucket Reclaimer
//!
//! Bounds registry memory to recently active tenants and IPs. Eviction is
//! based on inactivity only, never on counts.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::manager::RateLimitManager;
use super::store::RegistryState;

/// Entries evicted by one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReclaimReport {
    /// Tenant buckets idle for more than three windows
    pub tenants: usize,

    /// Action counters not reset for more than two windows, on surviving tenants
    pub action_counters: usize,

    /// IP counters not reset for more than two windows
    pub ips: usize,
}

impl ReclaimReport {
    /// Total entries evicted
    pub fn total(&self) -> usize {
        self.tenants + self.action_counters + self.ips
    }
}

/// Evict stale entries from a locked registry
///
/// Touches nothing but the registry; callers record metrics once the lock
/// is released.
pub fn sweep(state: &mut RegistryState, now: DateTime<Utc>, window: TimeDelta) -> ReclaimReport {
    let tenant_ttl = window * 3;
    let counter_ttl = window * 2;
    let mut report = ReclaimReport::default();

    let tenants_before = state.tenants.len();
    state
        .tenants
        .retain(|_, bucket| now.signed_duration_since(bucket.last_seen) <= tenant_ttl);
    report.tenants = tenants_before - state.tenants.len();

    for bucket in state.tenants.values_mut() {
        let before = bucket.actions.len();
        bucket
            .actions
            .retain(|_, counter| now.signed_duration_since(counter.last_reset()) <= counter_ttl);
        report.action_counters += before - bucket.actions.len();
    }

    let ips_before = state.ips.len();
    state
        .ips
        .retain(|_, counter| now.signed_duration_since(counter.last_reset()) <= counter_ttl);
    report.ips = ips_before - state.ips.len();

    report
}

/// Start the periodic sweep
///
/// Runs every `cleanup_interval` until the returned handle is aborted.
pub fn spawn_reclaimer(manager: RateLimitManager) -> JoinHandle<()> {
    let period = manager.config().cleanup_interval();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        // The first tick completes immediately
        interval.tick().await;

        loop {
            interval.tick().await;

            let report = manager.sweep();
            if report.total() > 0 {
                info!(
                    tenants = report.tenants,
                    action_counters = report.action_counters,
                    ips = report.ips,
                    "Reclaimed stale rate limit buckets"
                );
            } else {
                debug!("Rate limit sweep found nothing to reclaim");
            }
        }
    })
}
