//! Bucket Registry
//!
//! In-memory storage for tenant buckets and per-IP counters. Both maps live
//! behind a single exclusive lock; every admission check and every sweep
//! holds it for its whole critical section.

use chrono::{DateTime, TimeDelta, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::bucket::{TenantBucket, WindowCounter};

/// Mutable registry contents, only reachable through [`BucketRegistry::lock`]
#[derive(Debug, Default)]
pub struct RegistryState {
    /// Tenant id -> bucket. Never contains the empty tenant id.
    pub(crate) tenants: HashMap<String, TenantBucket>,

    /// Client IP -> counter for callers without a tenant
    pub(crate) ips: HashMap<String, WindowCounter>,
}

impl RegistryState {
    /// Fetch or create the bucket for `tenant_id` and mark it seen at `now`
    ///
    /// A bucket idle for more than two windows is replaced with a fresh one.
    pub(crate) fn tenant_bucket_mut(
        &mut self,
        tenant_id: &str,
        now: DateTime<Utc>,
        window: TimeDelta,
    ) -> &mut TenantBucket {
        let stale_after = window * 2;
        let bucket = self
            .tenants
            .entry(tenant_id.to_string())
            .or_insert_with(|| TenantBucket::new(now));

        if now.signed_duration_since(bucket.last_seen) > stale_after {
            tracing::debug!(tenant_id = %tenant_id, "Recreating stale tenant bucket");
            *bucket = TenantBucket::new(now);
        }

        bucket.last_seen = now;
        bucket
    }

    /// Fetch or create the counter for an unauthenticated client IP
    pub(crate) fn ip_counter_mut(&mut self, client_ip: &str, now: DateTime<Utc>) -> &mut WindowCounter {
        self.ips
            .entry(client_ip.to_string())
            .or_insert_with(|| WindowCounter::new(now))
    }

    /// Get a tenant bucket if it exists
    pub fn tenant(&self, tenant_id: &str) -> Option<&TenantBucket> {
        self.tenants.get(tenant_id)
    }

    /// Get an IP counter if it exists
    pub fn ip(&self, client_ip: &str) -> Option<&WindowCounter> {
        self.ips.get(client_ip)
    }

    /// Remove a tenant bucket
    pub(crate) fn remove_tenant(&mut self, tenant_id: &str) -> Option<TenantBucket> {
        self.tenants.remove(tenant_id)
    }

    /// Number of tracked tenants
    pub fn tenant_count(&self) -> usize {
        self.tenants.len()
    }

    /// Number of tracked client IPs
    pub fn ip_count(&self) -> usize {
        self.ips.len()
    }

    /// Number of materialized per-action counters across all tenants
    pub fn action_counter_count(&self) -> usize {
        self.tenants.values().map(|b| b.actions.len()).sum()
    }
}

/// Process-local registry shared by the decision engine and the reclaimer
#[derive(Debug, Default)]
pub struct BucketRegistry {
    state: Mutex<RegistryState>,
}

impl BucketRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the registry lock
    ///
    /// A poisoned lock is recovered: the maps hold plain counters, so a
    /// panicking holder cannot leave them structurally inconsistent.
    pub fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of tracked tenants
    pub fn tenant_count(&self) -> usize {
        self.lock().tenant_count()
    }

    /// Number of tracked client IPs
    pub fn ip_count(&self) -> usize {
        self.lock().ip_count()
    }

    /// Drop every bucket
    pub fn clear(&self) {
        let mut state = self.lock();
        state.tenants.clear();
        state.ips.clear();
    }
}
