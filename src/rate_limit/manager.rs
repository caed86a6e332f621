//! Rate Limit Manager
//!
//! The admission decision engine. Every call to [`RateLimitManager::allow`]
//! terminates in a [`RateLimitDecision`]; denial is a normal outcome.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use super::action::ActionType;
use super::bucket::WindowCounter;
use super::config::{RateLimitConfig, DEFAULT_WINDOW_SECS};
use super::dashboard::{RegistrySummary, TenantUsage};
use super::policy::{action_limit, PolicyResolver};
use super::reclaimer::{self, ReclaimReport};
use super::store::{BucketRegistry, RegistryState};
use crate::metrics;

/// Result of an admission check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitDecision {
    /// Whether the request may proceed
    pub allowed: bool,

    /// Limit of the counter that decided (burst allowance excluded)
    pub limit: u32,

    /// Admissions left before the limit, never negative
    pub remaining: u32,

    /// End of the deciding counter's window
    pub reset_time: DateTime<Utc>,

    /// Seconds until the deciding counter resets (0 when allowed)
    pub retry_after_secs: u64,

    /// Action the decision was made for
    pub action: ActionType,

    /// Tenant the decision applies to, empty for unauthenticated callers
    pub tenant_id: String,
}

impl RateLimitDecision {
    /// Create an allowed decision
    pub fn allowed(
        tenant_id: &str,
        action: ActionType,
        limit: u32,
        remaining: u32,
        reset_time: DateTime<Utc>,
    ) -> Self {
        Self {
            allowed: true,
            limit,
            remaining,
            reset_time,
            retry_after_secs: 0,
            action,
            tenant_id: tenant_id.to_string(),
        }
    }

    /// Create a denied decision from the counter that refused admission
    pub fn denied(
        tenant_id: &str,
        action: ActionType,
        limit: u32,
        counter: &WindowCounter,
        now: DateTime<Utc>,
        window: TimeDelta,
    ) -> Self {
        Self {
            allowed: false,
            limit,
            remaining: 0,
            reset_time: counter.reset_time(window),
            retry_after_secs: counter.retry_after_secs(now, window),
            action,
            tenant_id: tenant_id.to_string(),
        }
    }

    /// Reset time as Unix epoch seconds
    pub fn reset_epoch_secs(&self) -> i64 {
        self.reset_time.timestamp()
    }

    /// Human-readable denial message
    pub fn message(&self) -> String {
        if self.tenant_id.is_empty() {
            format!(
                "Rate limit exceeded for {} requests. Retry after {} seconds.",
                self.action, self.retry_after_secs
            )
        } else {
            format!(
                "Rate limit exceeded for tenant {} on {} actions. Retry after {} seconds.",
                self.tenant_id, self.action, self.retry_after_secs
            )
        }
    }
}

/// Rate limit manager
///
/// Cheap to clone; clones share the same registry.
#[derive(Debug, Clone)]
pub struct RateLimitManager {
    /// Configuration
    config: Arc<RateLimitConfig>,

    /// Limit resolution
    policy: Arc<PolicyResolver>,

    /// Tenant and IP buckets
    registry: Arc<BucketRegistry>,

    /// Fixed window length
    window: TimeDelta,
}

impl RateLimitManager {
    /// Create a new rate limit manager
    pub fn new(config: RateLimitConfig) -> Self {
        Self::with_registry(config, Arc::new(BucketRegistry::new()))
    }

    /// Create a manager over an existing registry
    pub fn with_registry(config: RateLimitConfig, registry: Arc<BucketRegistry>) -> Self {
        let window = TimeDelta::from_std(config.window())
            .unwrap_or_else(|_| TimeDelta::seconds(DEFAULT_WINDOW_SECS as i64));
        Self {
            policy: Arc::new(PolicyResolver::new(&config)),
            config: Arc::new(config),
            registry,
            window,
        }
    }

    /// Create with default configuration
    pub fn default_config() -> Self {
        Self::new(RateLimitConfig::default())
    }

    /// Create a disabled rate limit manager (for testing)
    pub fn disabled() -> Self {
        Self::new(RateLimitConfig::disabled())
    }

    /// Decide whether a request may proceed
    ///
    /// An empty `tenant_id` routes to the per-IP unauthenticated path.
    pub fn allow(&self, tenant_id: &str, action: ActionType, client_ip: &str) -> RateLimitDecision {
        self.allow_at(tenant_id, action, client_ip, Utc::now())
    }

    /// Decide whether a request may proceed as of `now`
    pub fn allow_at(
        &self,
        tenant_id: &str,
        action: ActionType,
        client_ip: &str,
        now: DateTime<Utc>,
    ) -> RateLimitDecision {
        let started = Instant::now();

        let decision = {
            let mut state = self.registry.lock();
            if tenant_id.is_empty() {
                self.allow_unauthenticated(&mut state, client_ip, now)
            } else {
                self.allow_tenant(&mut state, tenant_id, action, now)
            }
        };

        metrics::ADMISSION_CHECK_DURATION_SECONDS.observe(started.elapsed().as_secs_f64());
        metrics::record_decision(&decision);

        if decision.allowed {
            debug!(
                tenant_id = %decision.tenant_id,
                action = %decision.action,
                remaining = decision.remaining,
                "Request admitted"
            );
        } else {
            warn!(
                tenant_id = %decision.tenant_id,
                action = %decision.action,
                client_ip = %client_ip,
                limit = decision.limit,
                retry_after_secs = decision.retry_after_secs,
                "Rate limit exceeded"
            );
        }

        decision
    }

    /// Tenant path: global counter first, then the action counter
    fn allow_tenant(
        &self,
        state: &mut RegistryState,
        tenant_id: &str,
        action: ActionType,
        now: DateTime<Utc>,
    ) -> RateLimitDecision {
        let action = match action {
            ActionType::Unauthenticated => ActionType::Global,
            other => other,
        };
        let window = self.window;
        let burst = self.config.burst_allowance;
        let limits = self.policy.resolve(tenant_id);
        let bucket = state.tenant_bucket_mut(tenant_id, now, window);

        bucket.global.roll_over(now, window);
        if bucket.global.is_saturated(limits.global.saturating_add(burst)) {
            return RateLimitDecision::denied(
                tenant_id,
                ActionType::Global,
                limits.global,
                &bucket.global,
                now,
                window,
            );
        }

        let limit = action_limit(action, &limits);
        let counter = bucket.action_counter_mut(action, now);
        counter.roll_over(now, window);
        if counter.is_saturated(limit.saturating_add(burst)) {
            return RateLimitDecision::denied(tenant_id, action, limit, counter, now, window);
        }

        let count = counter.increment();
        let reset_time = counter.reset_time(window);
        bucket.global.increment();

        RateLimitDecision::allowed(
            tenant_id,
            action,
            limit,
            limit.saturating_sub(count),
            reset_time,
        )
    }

    /// Unauthenticated path: flat per-IP counter, no burst allowance
    fn allow_unauthenticated(
        &self,
        state: &mut RegistryState,
        client_ip: &str,
        now: DateTime<Utc>,
    ) -> RateLimitDecision {
        let window = self.window;
        let limit = self.config.unauthenticated_rate;
        let counter = state.ip_counter_mut(client_ip, now);

        counter.roll_over(now, window);
        if counter.is_saturated(limit) {
            return RateLimitDecision::denied(
                "",
                ActionType::Unauthenticated,
                limit,
                counter,
                now,
                window,
            );
        }

        let count = counter.increment();
        RateLimitDecision::allowed(
            "",
            ActionType::Unauthenticated,
            limit,
            limit.saturating_sub(count),
            counter.reset_time(window),
        )
    }

    /// Usage snapshot for one tenant
    pub fn stats(&self, tenant_id: &str) -> TenantUsage {
        self.stats_at(tenant_id, Utc::now())
    }

    /// Usage snapshot for one tenant as of `now`
    pub fn stats_at(&self, tenant_id: &str, now: DateTime<Utc>) -> TenantUsage {
        let limits = self.policy.resolve(tenant_id);
        let state = self.registry.lock();
        TenantUsage::capture(
            tenant_id,
            state.tenant(tenant_id),
            &limits,
            now,
            self.window,
        )
    }

    /// Registry-wide counts for dashboards
    pub fn summary(&self) -> RegistrySummary {
        let state = self.registry.lock();
        RegistrySummary {
            tracked_tenants: state.tenant_count(),
            tracked_ips: state.ip_count(),
            action_counters: state.action_counter_count(),
            window_secs: self.config.window().as_secs(),
            burst_allowance: self.config.burst_allowance,
        }
    }

    /// Drop a tenant's bucket so its next request starts fresh
    pub fn reset_tenant(&self, tenant_id: &str) -> bool {
        let removed = self.registry.lock().remove_tenant(tenant_id).is_some();
        if removed {
            tracing::info!(tenant_id = %tenant_id, "Tenant quota state reset");
        }
        removed
    }

    /// Evict stale entries now
    pub fn sweep(&self) -> ReclaimReport {
        self.sweep_at(Utc::now())
    }

    /// Evict entries that are stale as of `now`
    pub fn sweep_at(&self, now: DateTime<Utc>) -> ReclaimReport {
        let report = {
            let mut state = self.registry.lock();
            reclaimer::sweep(&mut state, now, self.window)
        };
        metrics::record_reclaim(&report);
        report
    }

    /// Whether admission checks are enforced
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Get current configuration
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Get the bucket registry
    pub fn registry(&self) -> &Arc<BucketRegistry> {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit::config::TenantLimitOverride;

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn small_config() -> RateLimitConfig {
        RateLimitConfig {
            tenant_global_rate: 2,
            tenant_payment_rate: 1,
            burst_allowance: 1,
            window_secs: 1,
            ..RateLimitConfig::default()
        }
    }

    #[test]
    fn test_manager_creation() {
        let manager = RateLimitManager::default_config();
        assert!(manager.is_enabled());
        assert_eq!(manager.config().tenant_global_rate, 100);
    }

    #[test]
    fn test_disabled_manager() {
        let manager = RateLimitManager::disabled();
        assert!(!manager.is_enabled());
    }

    #[test]
    fn test_payment_burst_scenario() {
        let manager = RateLimitManager::new(small_config());

        let first = manager.allow_at("acme", ActionType::Payment, "10.0.0.1", t0());
        assert!(first.allowed);
        assert_eq!(first.remaining, 0);
        assert_eq!(first.limit, 1);
        assert_eq!(first.tenant_id, "acme");

        let second = manager.allow_at("acme", ActionType::Payment, "10.0.0.1", t0());
        assert!(second.allowed, "second call is admitted by the burst allowance");
        assert_eq!(second.remaining, 0);

        let third = manager.allow_at("acme", ActionType::Payment, "10.0.0.1", t0());
        assert!(!third.allowed);
        assert_eq!(third.action, ActionType::Payment);
        assert_eq!(third.retry_after_secs, 1);

        let later = t0() + TimeDelta::milliseconds(1_100);
        let fourth = manager.allow_at("acme", ActionType::Payment, "10.0.0.1", later);
        assert!(fourth.allowed);
        assert_eq!(fourth.remaining, 0);
        assert_eq!(fourth.reset_time, later + TimeDelta::seconds(1));
    }

    #[test]
    fn test_fixed_window_boundary_admits_two_windows_back_to_back() {
        let manager = RateLimitManager::new(RateLimitConfig {
            tenant_payment_rate: 2,
            burst_allowance: 1,
            window_secs: 60,
            ..RateLimitConfig::default()
        });
        let pay = |at: DateTime<Utc>| manager.allow_at("acme", ActionType::Payment, "", at).allowed;
        let secs = |s: i64| t0() + TimeDelta::seconds(s);

        // Window opens at t0; limit + burst = 3
        assert!(pay(t0()));
        assert!(pay(secs(59)));
        assert!(pay(secs(59)));
        assert!(!pay(secs(59)));

        // Elapsed must strictly exceed the window
        assert!(!pay(secs(60)));

        // One second later the counter starts over from the request time
        assert!(pay(secs(61)));
        assert!(pay(secs(61)));
        assert!(pay(secs(61)));
        assert!(!pay(secs(61)));

        // Five admissions between t0 + 59s and t0 + 61s
        let actions = manager.stats_at("acme", secs(61)).actions.unwrap();
        assert_eq!(actions[&ActionType::Payment].used, 3);

        // The next window is anchored at t0 + 61s, not t0 + 120s
        assert!(!pay(secs(121)));
        assert!(pay(secs(122)));
    }

    #[test]
    fn test_remaining_counts_down_to_zero() {
        let config = RateLimitConfig {
            tenant_refund_rate: 5,
            burst_allowance: 2,
            ..RateLimitConfig::default()
        };
        let manager = RateLimitManager::new(config);

        let remaining: Vec<u32> = (0..7)
            .map(|_| manager.allow_at("acme", ActionType::Refund, "", t0()))
            .inspect(|d| assert!(d.allowed))
            .map(|d| d.remaining)
            .collect();
        assert_eq!(remaining, vec![4, 3, 2, 1, 0, 0, 0]);

        let denied = manager.allow_at("acme", ActionType::Refund, "", t0());
        assert!(!denied.allowed);
        assert_eq!(denied.remaining, 0);
    }

    #[test]
    fn test_global_check_precedes_action_check() {
        let config = RateLimitConfig {
            tenant_global_rate: 3,
            burst_allowance: 0,
            ..RateLimitConfig::default()
        };
        let manager = RateLimitManager::new(config);

        for _ in 0..3 {
            assert!(manager.allow_at("acme", ActionType::Payment, "", t0()).allowed);
        }

        let status = manager.allow_at("acme", ActionType::Status, "", t0());
        assert!(!status.allowed);
        assert_eq!(status.action, ActionType::Global);
        assert_eq!(status.limit, 3);

        // The denied status call never materialized a status counter
        let usage = manager.stats_at("acme", t0());
        assert!(usage.actions.unwrap().get(&ActionType::Status).is_none());
    }

    #[test]
    fn test_denied_action_does_not_consume_global() {
        let config = RateLimitConfig {
            tenant_global_rate: 10,
            tenant_payment_rate: 1,
            burst_allowance: 0,
            ..RateLimitConfig::default()
        };
        let manager = RateLimitManager::new(config);

        assert!(manager.allow_at("acme", ActionType::Payment, "", t0()).allowed);
        for _ in 0..5 {
            assert!(!manager.allow_at("acme", ActionType::Payment, "", t0()).allowed);
        }

        let usage = manager.stats_at("acme", t0());
        assert_eq!(usage.global.unwrap().used, 1);
    }

    #[test]
    fn test_premium_doubles_payment_allowance() {
        let mut config = RateLimitConfig {
            tenant_payment_rate: 1,
            burst_allowance: 0,
            ..RateLimitConfig::default()
        };
        config.premium_tenants.insert("gold".to_string());
        let manager = RateLimitManager::new(config);

        assert!(manager.allow_at("gold", ActionType::Payment, "", t0()).allowed);
        assert!(manager.allow_at("gold", ActionType::Payment, "", t0()).allowed);
        assert!(!manager.allow_at("gold", ActionType::Payment, "", t0()).allowed);

        assert!(manager.allow_at("basic", ActionType::Payment, "", t0()).allowed);
        assert!(!manager.allow_at("basic", ActionType::Payment, "", t0()).allowed);
    }

    #[test]
    fn test_tenant_override_applies() {
        let mut config = RateLimitConfig {
            burst_allowance: 0,
            ..RateLimitConfig::default()
        };
        config.tenant_overrides.insert(
            "tiny".to_string(),
            TenantLimitOverride {
                refund: Some(1),
                ..TenantLimitOverride::default()
            },
        );
        let manager = RateLimitManager::new(config);

        let first = manager.allow_at("tiny", ActionType::Refund, "", t0());
        assert!(first.allowed);
        assert_eq!(first.limit, 1);
        assert!(!manager.allow_at("tiny", ActionType::Refund, "", t0()).allowed);
    }

    #[test]
    fn test_action_windows_are_independent() {
        let config = RateLimitConfig {
            tenant_payment_rate: 1,
            burst_allowance: 0,
            window_secs: 60,
            ..RateLimitConfig::default()
        };
        let manager = RateLimitManager::new(config);

        assert!(manager.allow_at("acme", ActionType::Status, "", t0()).allowed);
        let t30 = t0() + TimeDelta::seconds(30);
        assert!(manager.allow_at("acme", ActionType::Payment, "", t30).allowed);

        // Global and status windows roll over; payment's window started 30s later
        let t61 = t0() + TimeDelta::seconds(61);
        let denied = manager.allow_at("acme", ActionType::Payment, "", t61);
        assert!(!denied.allowed);
        assert_eq!(denied.reset_time, t30 + TimeDelta::seconds(60));
        assert_eq!(denied.retry_after_secs, 29);
    }

    #[test]
    fn test_unauthenticated_has_no_burst() {
        let config = RateLimitConfig {
            unauthenticated_rate: 3,
            burst_allowance: 10,
            ..RateLimitConfig::default()
        };
        let manager = RateLimitManager::new(config);

        for expected in [2, 1, 0] {
            let decision = manager.allow_at("", ActionType::Payment, "203.0.113.7", t0());
            assert!(decision.allowed);
            assert_eq!(decision.remaining, expected);
            assert_eq!(decision.action, ActionType::Unauthenticated);
            assert!(decision.tenant_id.is_empty());
        }

        let denied = manager.allow_at("", ActionType::Payment, "203.0.113.7", t0());
        assert!(!denied.allowed);
        assert_eq!(denied.limit, 3);

        let other_ip = manager.allow_at("", ActionType::Payment, "203.0.113.8", t0());
        assert!(other_ip.allowed);
        assert_eq!(manager.registry().tenant_count(), 0);
    }

    #[test]
    fn test_authenticated_never_touches_ip_map() {
        let manager = RateLimitManager::default_config();
        manager.allow_at("acme", ActionType::Global, "198.51.100.1", t0());
        assert_eq!(manager.registry().ip_count(), 0);
        assert_eq!(manager.registry().tenant_count(), 1);
    }

    #[test]
    fn test_reset_tenant() {
        let manager = RateLimitManager::new(small_config());
        manager.allow_at("acme", ActionType::Payment, "", t0());
        manager.allow_at("acme", ActionType::Payment, "", t0());
        assert!(!manager.allow_at("acme", ActionType::Payment, "", t0()).allowed);

        assert!(manager.reset_tenant("acme"));
        assert!(!manager.reset_tenant("acme"));
        assert!(manager.allow_at("acme", ActionType::Payment, "", t0()).allowed);
    }

    #[test]
    fn test_denial_message() {
        let manager = RateLimitManager::new(small_config());
        for _ in 0..3 {
            manager.allow_at("acme", ActionType::Payment, "", t0());
        }
        let denied = manager.allow_at("acme", ActionType::Payment, "", t0());
        assert!(denied.message().contains("tenant acme"));
        assert!(denied.message().contains("payment"));

        let anonymous = RateLimitDecision {
            tenant_id: String::new(),
            action: ActionType::Unauthenticated,
            ..denied
        };
        assert!(!anonymous.message().contains("tenant"));
        assert!(anonymous.message().contains("unauthenticated"));
    }

    #[test]
    fn test_summary() {
        let manager = RateLimitManager::default_config();
        manager.allow_at("a", ActionType::Payment, "", t0());
        manager.allow_at("a", ActionType::Refund, "", t0());
        manager.allow_at("b", ActionType::Status, "", t0());
        manager.allow_at("", ActionType::Global, "10.0.0.1", t0());

        let summary = manager.summary();
        assert_eq!(summary.tracked_tenants, 2);
        assert_eq!(summary.tracked_ips, 1);
        assert_eq!(summary.action_counters, 3);
        assert_eq!(summary.window_secs, 60);
    }
}
