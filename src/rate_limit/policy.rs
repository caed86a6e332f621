//! Policy Resolution
//!
//! Computes the effective limits for a tenant: the configured override (or the
//! defaults), then the premium multiplier on top.

use std::collections::{HashMap, HashSet};

use super::action::ActionType;
use super::config::{RateLimitConfig, TenantLimitOverride, TenantLimits};

/// Resolves per-tenant limits from configuration
#[derive(Debug, Clone)]
pub struct PolicyResolver {
    defaults: TenantLimits,
    overrides: HashMap<String, TenantLimitOverride>,
    premium_tenants: HashSet<String>,
    premium_multiplier: f64,
}

impl PolicyResolver {
    /// Build a resolver from configuration
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            defaults: config.default_limits(),
            overrides: config.tenant_overrides.clone(),
            premium_tenants: config.premium_tenants.clone(),
            premium_multiplier: config.premium_multiplier,
        }
    }

    /// Effective limits for `tenant_id`
    ///
    /// Returns a fresh value; the resolver's configuration is never mutated.
    pub fn resolve(&self, tenant_id: &str) -> TenantLimits {
        let limits = match self.overrides.get(tenant_id) {
            Some(tenant_override) => tenant_override.apply(self.defaults),
            None => self.defaults,
        };

        if self.is_premium(tenant_id) {
            scale(limits, self.premium_multiplier)
        } else {
            limits
        }
    }

    /// Whether the tenant is flagged premium
    pub fn is_premium(&self, tenant_id: &str) -> bool {
        self.premium_tenants.contains(tenant_id)
    }
}

/// Limit for `action` drawn from a tenant's resolved limits
///
/// Auth gets half and Config a quarter of the global limit.
pub fn action_limit(action: ActionType, limits: &TenantLimits) -> u32 {
    match action {
        ActionType::Payment => limits.payment,
        ActionType::Refund => limits.refund,
        ActionType::Status => limits.status,
        ActionType::Auth => limits.global / 2,
        ActionType::Config => limits.global / 4,
        ActionType::Global | ActionType::Unauthenticated => limits.global,
    }
}

fn scale(limits: TenantLimits, multiplier: f64) -> TenantLimits {
    // `as` truncates toward zero and saturates at the integer bounds
    let apply = |value: u32| (f64::from(value) * multiplier) as u32;
    TenantLimits {
        global: apply(limits.global),
        payment: apply(limits.payment),
        refund: apply(limits.refund),
        status: apply(limits.status),
    }
}
