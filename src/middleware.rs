//! HTTP Admission Middleware
//!
//! Wraps the [`RateLimitManager`] for axum routers. Each request that is not on
//! the bypass list is classified, checked against its tenant's quotas (or its
//! client IP's quota when no tenant is attached) and annotated with
//! `X-RateLimit-*` headers. Denied requests never reach the inner service.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::debug;

use crate::rate_limit::{ActionType, RateLimitDecision, RateLimitManager};

pub const HEADER_LIMIT: &str = "x-ratelimit-limit";
pub const HEADER_REMAINING: &str = "x-ratelimit-remaining";
pub const HEADER_RESET: &str = "x-ratelimit-reset";
pub const HEADER_ACTION: &str = "x-ratelimit-action";
pub const HEADER_TENANT: &str = "x-ratelimit-tenant";

/// Header carrying the caller's tenant when no upstream layer has set [`TenantId`]
pub const HEADER_TENANT_ID: &str = "x-tenant-id";

/// Authenticated tenant of a request
///
/// Inserted into request extensions by the authentication layer. Requests
/// without it are limited per client IP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantId(pub String);

/// Paths that skip admission control entirely
#[derive(Debug, Clone, Default)]
pub struct BypassList {
    exact: HashSet<String>,
    prefixes: Vec<String>,
}

impl BypassList {
    /// Empty list: every request is checked
    pub fn empty() -> Self {
        Self::default()
    }

    /// Health, docs, static assets, auth entry points and public analytics
    pub fn with_defaults() -> Self {
        let mut list = Self::empty();
        for path in [
            "/health",
            "/ready",
            "/metrics",
            "/favicon.ico",
            "/api/v1/auth/login",
            "/api/v1/auth/register",
            "/api/v1/auth/refresh",
        ] {
            list = list.exact(path);
        }
        for prefix in [
            "/docs",
            "/swagger",
            "/static/",
            "/assets/",
            "/api/v1/analytics/public",
        ] {
            list = list.prefix(prefix);
        }
        list
    }

    /// Bypass a single path
    pub fn exact(mut self, path: impl Into<String>) -> Self {
        self.exact.insert(path.into());
        self
    }

    /// Bypass every path starting with `prefix`
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefixes.push(prefix.into());
        self
    }

    pub fn is_bypassed(&self, path: &str) -> bool {
        self.exact.contains(path) || self.prefixes.iter().any(|p| path.starts_with(p.as_str()))
    }
}

/// State for [`admission_middleware`]
#[derive(Debug, Clone)]
pub struct AdmissionState {
    pub manager: RateLimitManager,
    pub bypass: Arc<BypassList>,
}

impl AdmissionState {
    /// Admission state with the default bypass list
    pub fn new(manager: RateLimitManager) -> Self {
        Self::with_bypass(manager, BypassList::with_defaults())
    }

    pub fn with_bypass(manager: RateLimitManager, bypass: BypassList) -> Self {
        Self {
            manager,
            bypass: Arc::new(bypass),
        }
    }
}

/// Resolve the caller's address
///
/// First entry of `X-Forwarded-For`, then `X-Real-IP`, then the socket peer.
/// Empty when none is available.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(ip) = forwarded {
        return ip.to_string();
    }

    let real_ip = headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(ip) = real_ip {
        return ip.to_string();
    }

    peer.map(|addr| addr.ip().to_string()).unwrap_or_default()
}

/// Copy a decision onto response headers
pub fn apply_rate_limit_headers(headers: &mut HeaderMap, decision: &RateLimitDecision) {
    headers.insert(HeaderName::from_static(HEADER_LIMIT), HeaderValue::from(decision.limit));
    headers.insert(
        HeaderName::from_static(HEADER_REMAINING),
        HeaderValue::from(decision.remaining),
    );
    headers.insert(
        HeaderName::from_static(HEADER_RESET),
        HeaderValue::from(decision.reset_epoch_secs()),
    );
    headers.insert(
        HeaderName::from_static(HEADER_ACTION),
        HeaderValue::from_static(decision.action.as_str()),
    );

    if !decision.tenant_id.is_empty() {
        if let Ok(tenant) = HeaderValue::from_str(&decision.tenant_id) {
            headers.insert(HeaderName::from_static(HEADER_TENANT), tenant);
        }
    }
}

/// 429 response for a denied decision
pub fn rate_limited_response(decision: &RateLimitDecision) -> Response {
    let body = json!({
        "error": "rate_limit_exceeded",
        "message": decision.message(),
        "retry_after": decision.retry_after_secs,
    });

    let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
    let headers = response.headers_mut();
    apply_rate_limit_headers(headers, decision);
    headers.insert(header::RETRY_AFTER, HeaderValue::from(decision.retry_after_secs));
    response
}

/// Admission control middleware
///
/// Mount with `axum::middleware::from_fn_with_state`.
pub async fn admission_middleware(
    State(state): State<AdmissionState>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path();
    if !state.manager.is_enabled() || state.bypass.is_bypassed(path) {
        return next.run(request).await;
    }

    let action = ActionType::classify(path, request.method().as_str());
    let tenant_id = request
        .extensions()
        .get::<TenantId>()
        .map(|t| t.0.clone())
        .unwrap_or_default();
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0);
    let ip = client_ip(request.headers(), peer);

    let decision = state.manager.allow(&tenant_id, action, &ip);
    if !decision.allowed {
        return rate_limited_response(&decision);
    }

    let mut response = next.run(request).await;
    apply_rate_limit_headers(response.headers_mut(), &decision);
    response
}

/// Whether the `X-Tenant-ID` header identifies the caller
///
/// Only enable behind a proxy that authenticates callers and overwrites the
/// header; otherwise any client can pick a fresh tenant per request and
/// escape the per-IP limit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrustTenantHeader(pub bool);

/// Attach [`TenantId`] from the `X-Tenant-ID` header
///
/// Does nothing unless the header is trusted. Leaves an existing extension
/// untouched so a real authentication layer always wins.
pub async fn tenant_header_middleware(
    State(TrustTenantHeader(trusted)): State<TrustTenantHeader>,
    mut request: Request,
    next: Next,
) -> Response {
    if trusted && request.extensions().get::<TenantId>().is_none() {
        let tenant = request
            .headers()
            .get(HEADER_TENANT_ID)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string);
        if let Some(tenant) = tenant {
            debug!(tenant_id = %tenant, "Tenant resolved from header");
            request.extensions_mut().insert(TenantId(tenant));
        }
    }
    next.run(request).await
}
