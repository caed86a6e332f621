//! Usage Introspection
//!
//! Read-only snapshots of quota state for operational dashboards. Capturing a
//! snapshot never mutates a counter: a counter whose window has already
//! elapsed is reported as unused, but is only actually reset by the next
//! admission check.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::action::ActionType;
use super::bucket::{TenantBucket, WindowCounter};
use super::config::{RateLimitConfig, TenantLimits};
use super::manager::RateLimitManager;
use super::policy::action_limit;

/// Whether a tenant has any quota state in memory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageStatus {
    /// A bucket exists for the tenant
    Active,
    /// No bucket: never seen, or reclaimed after inactivity
    NoActivity,
}

/// Snapshot of one tenant's usage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantUsage {
    /// Tenant identifier
    pub tenant_id: String,

    /// Activity status
    pub status: UsageStatus,

    /// Tenant-wide counter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global: Option<GlobalUsage>,

    /// Materialized per-action counters; untouched actions are absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actions: Option<BTreeMap<ActionType, ActionUsage>>,

    /// Last admission check for the tenant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<DateTime<Utc>>,
}

/// Global counter usage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalUsage {
    pub limit: u32,
    pub used: u32,
    pub remaining: u32,
    pub reset_time: DateTime<Utc>,
}

/// Per-action counter usage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionUsage {
    pub limit: u32,
    pub used: u32,
    pub remaining: u32,
    pub last_reset: DateTime<Utc>,
    pub next_reset: DateTime<Utc>,
}

impl TenantUsage {
    /// Snapshot for a tenant with no bucket
    pub fn no_activity(tenant_id: &str) -> Self {
        Self {
            tenant_id: tenant_id.to_string(),
            status: UsageStatus::NoActivity,
            global: None,
            actions: None,
            last_seen: None,
        }
    }

    /// Build a snapshot from a tenant's bucket, if any
    pub fn capture(
        tenant_id: &str,
        bucket: Option<&TenantBucket>,
        limits: &TenantLimits,
        now: DateTime<Utc>,
        window: TimeDelta,
    ) -> Self {
        let Some(bucket) = bucket else {
            return Self::no_activity(tenant_id);
        };

        let global_used = effective_count(bucket.global(), now, window);
        let global = GlobalUsage {
            limit: limits.global,
            used: global_used,
            remaining: limits.global.saturating_sub(global_used),
            reset_time: bucket.global().reset_time(window),
        };

        let actions = bucket
            .actions()
            .map(|(action, counter)| {
                let limit = action_limit(*action, limits);
                let used = effective_count(counter, now, window);
                let usage = ActionUsage {
                    limit,
                    used,
                    remaining: limit.saturating_sub(used),
                    last_reset: counter.last_reset(),
                    next_reset: counter.reset_time(window),
                };
                (*action, usage)
            })
            .collect();

        Self {
            tenant_id: tenant_id.to_string(),
            status: UsageStatus::Active,
            global: Some(global),
            actions: Some(actions),
            last_seen: Some(bucket.last_seen()),
        }
    }
}

fn effective_count(counter: &WindowCounter, now: DateTime<Utc>, window: TimeDelta) -> u32 {
    if counter.is_expired(now, window) {
        0
    } else {
        counter.count()
    }
}

/// Registry-wide counts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrySummary {
    /// Tenant buckets in memory
    pub tracked_tenants: usize,

    /// Unauthenticated client IP counters in memory
    pub tracked_ips: usize,

    /// Per-action counters across all tenants
    pub action_counters: usize,

    /// Fixed window length in seconds
    pub window_secs: u64,

    /// Burst allowance added to tenant limits
    pub burst_allowance: u32,
}

/// Dashboard data for the admin interface
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardData {
    /// Timestamp of data generation
    pub timestamp: DateTime<Utc>,

    /// Registry summary
    pub summary: RegistrySummary,

    /// Configuration in effect
    pub config: RateLimitConfig,
}

impl DashboardData {
    /// Build dashboard data from the manager's current state
    pub fn build(manager: &RateLimitManager) -> Self {
        Self {
            timestamp: Utc::now(),
            summary: manager.summary(),
            config: manager.config().clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn test_no_activity_omits_usage_fields() {
        let manager = RateLimitManager::default_config();
        let usage = manager.stats("ghost");
        assert_eq!(usage.status, UsageStatus::NoActivity);

        let json = serde_json::to_value(&usage).unwrap();
        assert_eq!(json["tenant_id"], "ghost");
        assert_eq!(json["status"], "no_activity");
        assert!(json.get("global").is_none());
        assert!(json.get("actions").is_none());
    }

    #[test]
    fn test_breakdown_lists_only_used_actions() {
        let manager = RateLimitManager::default_config();
        manager.allow_at("acme", ActionType::Payment, "", t0());
        manager.allow_at("acme", ActionType::Payment, "", t0());
        manager.allow_at("acme", ActionType::Auth, "", t0());

        let usage = manager.stats_at("acme", t0() + TimeDelta::seconds(10));
        assert_eq!(usage.status, UsageStatus::Active);

        let global = usage.global.unwrap();
        assert_eq!(global.used, 3);
        assert_eq!(global.remaining, 97);
        assert_eq!(global.reset_time, t0() + TimeDelta::seconds(60));

        let actions = usage.actions.unwrap();
        assert_eq!(actions.len(), 2);
        let payment = &actions[&ActionType::Payment];
        assert_eq!(payment.limit, 50);
        assert_eq!(payment.used, 2);
        assert_eq!(payment.remaining, 48);
        assert_eq!(payment.last_reset, t0());
        assert_eq!(payment.next_reset, t0() + TimeDelta::seconds(60));
        assert_eq!(actions[&ActionType::Auth].limit, 50);
        assert!(!actions.contains_key(&ActionType::Refund));
    }

    #[test]
    fn test_expired_counters_read_as_unused_without_mutation() {
        let manager = RateLimitManager::default_config();
        manager.allow_at("acme", ActionType::Refund, "", t0());

        let later = t0() + TimeDelta::seconds(90);
        let usage = manager.stats_at("acme", later);
        assert_eq!(usage.global.as_ref().unwrap().used, 0);
        let refund = &usage.actions.as_ref().unwrap()[&ActionType::Refund];
        assert_eq!(refund.used, 0);
        assert_eq!(refund.last_reset, t0());

        let state = manager.registry().lock();
        assert_eq!(state.tenant("acme").unwrap().global().count(), 1);
    }

    #[test]
    fn test_usage_serializes_action_keys_lowercase() {
        let manager = RateLimitManager::default_config();
        manager.allow_at("acme", ActionType::Status, "", t0());
        let json = serde_json::to_value(manager.stats_at("acme", t0())).unwrap();
        assert_eq!(json["status"], "active");
        assert_eq!(json["actions"]["status"]["used"], 1);
    }

    #[test]
    fn test_dashboard_build() {
        let manager = RateLimitManager::default_config();
        manager.allow("acme", ActionType::Payment, "10.0.0.1");

        let dashboard = DashboardData::build(&manager);
        assert_eq!(dashboard.summary.tracked_tenants, 1);
        assert_eq!(dashboard.config.tenant_payment_rate, 50);
        assert!(dashboard.timestamp.timestamp() > 0);
    }
}
