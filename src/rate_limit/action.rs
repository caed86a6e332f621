//! Action Classification
//!
//! Maps an HTTP request (path, method) onto the coarse action category that
//! selects which per-tenant quota applies.
//!
//! # Classification Order
//!
//! Rules are evaluated top to bottom and the first match wins:
//!
//! 1. path contains `/auth/` → [`ActionType::Auth`]
//! 2. path contains `/config/` or `/set-env` → [`ActionType::Config`]
//! 3. path contains `/payments` and method is POST → [`ActionType::Payment`]
//! 4. path contains `/payments` and method is GET → [`ActionType::Status`]
//! 5. path contains `/refund` → [`ActionType::Refund`]
//! 6. path contains `/status` → [`ActionType::Status`]
//! 7. anything else → [`ActionType::Global`]

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Request category driving differentiated quotas
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    /// Any request without a more specific category
    Global,
    /// Payment creation
    Payment,
    /// Refund issuance
    Refund,
    /// Payment or transaction status lookups
    Status,
    /// Authenticated credential/token management
    Auth,
    /// Provider configuration and environment switching
    Config,
    /// Reported for callers without a tenant; never classified from a request
    Unauthenticated,
}

impl ActionType {
    /// Wire name used in headers, logs and JSON
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Global => "global",
            ActionType::Payment => "payment",
            ActionType::Refund => "refund",
            ActionType::Status => "status",
            ActionType::Auth => "auth",
            ActionType::Config => "config",
            ActionType::Unauthenticated => "unauthenticated",
        }
    }

    /// Classify a request by path and method
    ///
    /// # Examples
    ///
    /// ```
    /// use paygate_admission::rate_limit::ActionType;
    ///
    /// assert_eq!(ActionType::classify("/api/v1/payments", "POST"), ActionType::Payment);
    /// assert_eq!(ActionType::classify("/api/v1/payments/pay_123", "GET"), ActionType::Status);
    /// assert_eq!(ActionType::classify("/api/v1/tenants", "GET"), ActionType::Global);
    /// ```
    pub fn classify(path: &str, method: &str) -> ActionType {
        if path.contains("/auth/") {
            return ActionType::Auth;
        }

        if path.contains("/config/") || path.contains("/set-env") {
            return ActionType::Config;
        }

        if path.contains("/payments") {
            if method.eq_ignore_ascii_case("POST") {
                return ActionType::Payment;
            }
            if method.eq_ignore_ascii_case("GET") {
                return ActionType::Status;
            }
        }

        if path.contains("/refund") {
            return ActionType::Refund;
        }

        if path.contains("/status") {
            return ActionType::Status;
        }

        ActionType::Global
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionType {
    type Err = std::convert::Infallible;

    /// Unrecognized names resolve to [`ActionType::Global`]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "payment" => ActionType::Payment,
            "refund" => ActionType::Refund,
            "status" => ActionType::Status,
            "auth" => ActionType::Auth,
            "config" => ActionType::Config,
            "unauthenticated" => ActionType::Unauthenticated,
            _ => ActionType::Global,
        })
    }
}
