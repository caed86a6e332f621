//! PayGate Admission Library
//!
//! Per-tenant, per-action admission control for a multi-tenant payment
//! gateway: the decision engine, its axum middleware and the standalone
//! service that hosts it.

pub mod config;
pub mod metrics;
pub mod middleware;
pub mod rate_limit;
pub mod server;
