//! Rate Limit Configuration
//!
//! Per-minute quotas for tenants and unauthenticated callers, premium tiering,
//! burst tolerance and per-tenant overrides.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

use super::error::ConfigError;

/// Default rate limits (per window)
pub const DEFAULT_TENANT_GLOBAL_RATE: u32 = 100;
pub const DEFAULT_TENANT_PAYMENT_RATE: u32 = 50;
pub const DEFAULT_TENANT_REFUND_RATE: u32 = 20;
pub const DEFAULT_TENANT_STATUS_RATE: u32 = 200;
pub const DEFAULT_UNAUTHENTICATED_RATE: u32 = 10;
pub const DEFAULT_PREMIUM_MULTIPLIER: f64 = 2.0;
pub const DEFAULT_BURST_ALLOWANCE: u32 = 10;
pub const DEFAULT_WINDOW_SECS: u64 = 60;
pub const DEFAULT_CLEANUP_INTERVAL_SECS: u64 = 300;

/// Environment variable names
pub const ENV_ENABLED: &str = "RATE_LIMIT_ENABLED";
pub const ENV_TENANT_GLOBAL: &str = "RATE_LIMIT_TENANT_GLOBAL";
pub const ENV_TENANT_PAYMENT: &str = "RATE_LIMIT_TENANT_PAYMENT";
pub const ENV_TENANT_REFUND: &str = "RATE_LIMIT_TENANT_REFUND";
pub const ENV_TENANT_STATUS: &str = "RATE_LIMIT_TENANT_STATUS";
pub const ENV_UNAUTHENTICATED: &str = "RATE_LIMIT_UNAUTHENTICATED";
pub const ENV_PREMIUM_TENANTS: &str = "RATE_LIMIT_PREMIUM_TENANTS";
pub const ENV_PREMIUM_MULTIPLIER: &str = "RATE_LIMIT_PREMIUM_MULTIPLIER";
pub const ENV_BURST_ALLOWANCE: &str = "RATE_LIMIT_BURST_ALLOWANCE";
pub const ENV_TENANT_OVERRIDES: &str = "RATE_LIMIT_TENANT_OVERRIDES";
pub const ENV_WINDOW_SECS: &str = "RATE_LIMIT_WINDOW_SECS";
pub const ENV_CLEANUP_INTERVAL_SECS: &str = "RATE_LIMIT_CLEANUP_INTERVAL_SECS";

/// Rate limit configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting
    pub enabled: bool,

    /// Tenant-wide requests per window
    pub tenant_global_rate: u32,

    /// Payment creations per window
    pub tenant_payment_rate: u32,

    /// Refunds per window
    pub tenant_refund_rate: u32,

    /// Status lookups per window
    pub tenant_status_rate: u32,

    /// Requests per window for callers without a tenant, keyed by client IP
    pub unauthenticated_rate: u32,

    /// Tenants whose limits are scaled by `premium_multiplier`
    pub premium_tenants: HashSet<String>,

    /// Scale factor applied to premium tenants' limits
    pub premium_multiplier: f64,

    /// Added to every tenant limit check (not applied to unauthenticated callers)
    pub burst_allowance: u32,

    /// Per-tenant limit overrides
    pub tenant_overrides: HashMap<String, TenantLimitOverride>,

    /// Fixed window length in seconds
    pub window_secs: u64,

    /// Interval between stale-bucket sweeps in seconds
    pub cleanup_interval_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tenant_global_rate: DEFAULT_TENANT_GLOBAL_RATE,
            tenant_payment_rate: DEFAULT_TENANT_PAYMENT_RATE,
            tenant_refund_rate: DEFAULT_TENANT_REFUND_RATE,
            tenant_status_rate: DEFAULT_TENANT_STATUS_RATE,
            unauthenticated_rate: DEFAULT_UNAUTHENTICATED_RATE,
            premium_tenants: HashSet::new(),
            premium_multiplier: DEFAULT_PREMIUM_MULTIPLIER,
            burst_allowance: DEFAULT_BURST_ALLOWANCE,
            tenant_overrides: HashMap::new(),
            window_secs: DEFAULT_WINDOW_SECS,
            cleanup_interval_secs: DEFAULT_CLEANUP_INTERVAL_SECS,
        }
    }
}

impl RateLimitConfig {
    /// Create a new rate limit configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from environment variables
    ///
    /// Malformed values are logged and ignored; the default stays in effect.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env(|var| std::env::var(var).ok());
        config
    }

    /// Apply overrides from an arbitrary variable source
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = &lookup;

        if let Some(enabled) = fallback(parse_flag(lookup, ENV_ENABLED)) {
            self.enabled = enabled;
        }

        let rates = [
            (ENV_TENANT_GLOBAL, &mut self.tenant_global_rate),
            (ENV_TENANT_PAYMENT, &mut self.tenant_payment_rate),
            (ENV_TENANT_REFUND, &mut self.tenant_refund_rate),
            (ENV_TENANT_STATUS, &mut self.tenant_status_rate),
            (ENV_UNAUTHENTICATED, &mut self.unauthenticated_rate),
            (ENV_BURST_ALLOWANCE, &mut self.burst_allowance),
        ];
        for (var, slot) in rates {
            if let Some(value) = fallback(parse_integer::<u32, _>(lookup, var)) {
                *slot = value;
            }
        }

        if let Some(raw) = lookup(ENV_PREMIUM_TENANTS) {
            self.premium_tenants = raw
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect();
        }

        if let Some(multiplier) = fallback(parse_multiplier(lookup, ENV_PREMIUM_MULTIPLIER)) {
            self.premium_multiplier = multiplier;
        }

        if let Some(overrides) = fallback(parse_overrides(lookup, ENV_TENANT_OVERRIDES)) {
            self.tenant_overrides = overrides;
        }

        if let Some(secs) = fallback(parse_duration_secs(lookup, ENV_WINDOW_SECS)) {
            self.window_secs = secs;
        }

        if let Some(secs) = fallback(parse_duration_secs(lookup, ENV_CLEANUP_INTERVAL_SECS)) {
            self.cleanup_interval_secs = secs;
        }
    }

    /// Get the fixed window duration
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs.max(1))
    }

    /// Get the sweep interval
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs.max(1))
    }

    /// Limits in effect for tenants without an override
    pub fn default_limits(&self) -> TenantLimits {
        TenantLimits {
            global: self.tenant_global_rate,
            payment: self.tenant_payment_rate,
            refund: self.tenant_refund_rate,
            status: self.tenant_status_rate,
        }
    }

    /// Disable rate limiting (for testing)
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

/// Effective per-window limits for one tenant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantLimits {
    pub global: u32,
    pub payment: u32,
    pub refund: u32,
    pub status: u32,
}

/// Per-tenant limit override
///
/// Fields left unset keep the configured default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TenantLimitOverride {
    /// Global limit override
    pub global: Option<u32>,

    /// Payment limit override
    pub payment: Option<u32>,

    /// Refund limit override
    pub refund: Option<u32>,

    /// Status limit override
    pub status: Option<u32>,
}

impl TenantLimitOverride {
    /// Replace the given defaults with whatever this override sets
    pub fn apply(&self, defaults: TenantLimits) -> TenantLimits {
        TenantLimits {
            global: self.global.unwrap_or(defaults.global),
            payment: self.payment.unwrap_or(defaults.payment),
            refund: self.refund.unwrap_or(defaults.refund),
            status: self.status.unwrap_or(defaults.status),
        }
    }
}

fn fallback<T>(parsed: Result<Option<T>, ConfigError>) -> Option<T> {
    match parsed {
        Ok(value) => value,
        Err(e) => {
            warn!(error = %e, "Ignoring malformed rate limit setting, keeping default");
            None
        }
    }
}

fn parse_integer<T, F>(lookup: &F, var: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(var) else {
        return Ok(None);
    };
    raw.trim()
        .parse()
        .map(Some)
        .map_err(|_| ConfigError::InvalidInteger {
            var: var.to_string(),
            value: raw,
        })
}

fn parse_duration_secs<F>(lookup: &F, var: &str) -> Result<Option<u64>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match parse_integer::<u64, F>(lookup, var)? {
        Some(0) => Err(ConfigError::ZeroDuration {
            var: var.to_string(),
        }),
        other => Ok(other),
    }
}

fn parse_multiplier<F>(lookup: &F, var: &str) -> Result<Option<f64>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(var) else {
        return Ok(None);
    };
    match raw.trim().parse::<f64>() {
        Ok(value) if value.is_finite() && value > 0.0 => Ok(Some(value)),
        _ => Err(ConfigError::InvalidMultiplier {
            var: var.to_string(),
            value: raw,
        }),
    }
}

fn parse_flag<F>(lookup: &F, var: &str) -> Result<Option<bool>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(var) else {
        return Ok(None);
    };
    match raw.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(Some(true)),
        "false" | "0" | "no" | "off" => Ok(Some(false)),
        _ => Err(ConfigError::InvalidFlag {
            var: var.to_string(),
            value: raw,
        }),
    }
}

fn parse_overrides<F>(
    lookup: &F,
    var: &str,
) -> Result<Option<HashMap<String, TenantLimitOverride>>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(var) else {
        return Ok(None);
    };
    if raw.trim().is_empty() {
        return Ok(Some(HashMap::new()));
    }
    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|source| ConfigError::InvalidOverrides {
            var: var.to_string(),
            source,
        })
}
