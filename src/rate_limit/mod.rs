//! Tenant Admission Control Module
//!
//! Decides, per request, whether a tenant (or an unauthenticated client IP)
//! may proceed, based on fixed-window quotas per action category.
//!
//! # Features
//!
//! - Tenant-wide global quota checked before the per-action quota
//! - Premium multiplier and per-tenant overrides
//! - Burst allowance on tenant checks
//! - Flat per-IP quota for callers without a tenant
//! - Periodic reclamation of idle buckets
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Rate Limit Manager                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────┐         │
//! │  │ Action      │  │ Policy      │  │ Reclaimer   │         │
//! │  │ Classifier  │  │ Resolver    │  │             │         │
//! │  └─────────────┘  └─────────────┘  └─────────────┘         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────────────────────────────────────┐   │
//! │  │        Bucket Registry (tenant buckets + IP map)     │   │
//! │  └─────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod action;
pub mod bucket;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod manager;
pub mod policy;
pub mod reclaimer;
pub mod store;

pub use action::ActionType;
pub use bucket::{CounterState, TenantBucket, WindowCounter};
pub use config::{RateLimitConfig, TenantLimitOverride, TenantLimits};
pub use dashboard::{DashboardData, RegistrySummary, TenantUsage, UsageStatus};
pub use error::ConfigError;
pub use manager::{RateLimitDecision, RateLimitManager};
pub use policy::{action_limit, PolicyResolver};
pub use reclaimer::{spawn_reclaimer, ReclaimReport};
pub use store::BucketRegistry;
