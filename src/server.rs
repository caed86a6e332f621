// HTTP server for the admission service
//
// Serves the operational endpoints (/health, /metrics, token-gated rate limit
// admin) and puts every other route behind the admission middleware.

use anyhow::{Context, Result};
use axum::{
    extract::{Path, Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::metrics;
use crate::middleware::{
    admission_middleware, tenant_header_middleware, AdmissionState, BypassList, TrustTenantHeader,
};
use crate::rate_limit::{DashboardData, RateLimitManager, RegistrySummary, TenantUsage};

/// Router settings that are not part of the rate limit policy
#[derive(Debug, Clone)]
pub struct RouterOptions {
    pub bypass: BypassList,
    /// Bearer token for `/api/v1/ratelimit/*`; `None` disables those routes
    pub admin_token: Option<String>,
    pub trust_tenant_header: bool,
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self {
            bypass: BypassList::with_defaults(),
            admin_token: None,
            trust_tenant_header: false,
        }
    }
}

impl RouterOptions {
    pub fn from_config(server: &ServerConfig) -> Self {
        Self {
            admin_token: server.admin_token.clone(),
            trust_tenant_header: server.trust_tenant_header,
            ..Self::default()
        }
    }

    pub fn with_bypass(mut self, bypass: BypassList) -> Self {
        self.bypass = bypass;
        self
    }

    pub fn with_admin_token(mut self, token: impl Into<String>) -> Self {
        self.admin_token = Some(token.into());
        self
    }

    pub fn trust_tenant_header(mut self, trusted: bool) -> Self {
        self.trust_tenant_header = trusted;
        self
    }
}

/// Build the service router with default options
///
/// The admin API is closed and `X-Tenant-ID` is ignored.
pub fn router(manager: RateLimitManager) -> Router {
    router_with_options(manager, RouterOptions::default())
}

/// Build the service router
pub fn router_with_options(manager: RateLimitManager, options: RouterOptions) -> Router {
    let admission = AdmissionState::with_bypass(manager.clone(), options.bypass);
    let admin_token = AdminToken(options.admin_token.map(Arc::from));

    let admin = Router::new()
        .route("/api/v1/ratelimit/summary", get(summary_handler))
        .route("/api/v1/ratelimit/dashboard", get(dashboard_handler))
        .route("/api/v1/ratelimit/stats/{tenant_id}", get(stats_handler))
        .route("/api/v1/ratelimit/reset/{tenant_id}", post(reset_handler))
        .route_layer(middleware::from_fn_with_state(admin_token, require_admin_token));

    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .merge(admin)
        .fallback(admitted_handler)
        .with_state(manager)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(middleware::from_fn_with_state(
                    TrustTenantHeader(options.trust_tenant_header),
                    tenant_header_middleware,
                ))
                .layer(middleware::from_fn_with_state(admission, admission_middleware)),
        )
}

#[derive(Debug, Clone)]
struct AdminToken(Option<Arc<str>>);

/// Gate for the admin routes
///
/// 403 when no token is configured, 401 when the bearer token is missing or wrong.
async fn require_admin_token(
    State(AdminToken(expected)): State<AdminToken>,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected) = expected else {
        return (
            StatusCode::FORBIDDEN,
            Json(json!({ "error": "admin_api_disabled" })),
        )
            .into_response();
    };

    let presented = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim);

    match presented {
        Some(token) if token.as_bytes() == expected.as_bytes() => next.run(request).await,
        _ => {
            warn!(path = %request.uri().path(), "Rejected admin request");
            let mut response = (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "unauthorized" })),
            )
                .into_response();
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
            response
        }
    }
}

/// Serve `app` on `addr` until `shutdown` resolves
pub async fn serve<F>(addr: SocketAddr, app: Router, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind admission server on {}", addr))?;

    info!(
        "Admission service listening on {}",
        listener.local_addr().unwrap_or(addr)
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
    .context("Admission server error")?;

    Ok(())
}

/// Resolves on Ctrl-C
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    info!("Shutdown signal received");
}

/// Metrics endpoint handler
async fn metrics_handler(State(manager): State<RateLimitManager>) -> Response {
    metrics::record_registry_size(&manager.summary());
    match metrics::gather_metrics() {
        Ok(metrics_text) => (StatusCode::OK, metrics_text).into_response(),
        Err(e) => {
            error!("Failed to gather metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Error gathering metrics: {}", e),
            )
                .into_response()
        }
    }
}

/// Health check endpoint
async fn health_handler() -> impl IntoResponse {
    StatusCode::OK
}

async fn stats_handler(
    State(manager): State<RateLimitManager>,
    Path(tenant_id): Path<String>,
) -> Json<TenantUsage> {
    Json(manager.stats(&tenant_id))
}

async fn summary_handler(State(manager): State<RateLimitManager>) -> Json<RegistrySummary> {
    Json(manager.summary())
}

async fn dashboard_handler(State(manager): State<RateLimitManager>) -> Json<DashboardData> {
    Json(DashboardData::build(&manager))
}

async fn reset_handler(
    State(manager): State<RateLimitManager>,
    Path(tenant_id): Path<String>,
) -> Response {
    if manager.reset_tenant(&tenant_id) {
        (StatusCode::OK, Json(json!({ "tenant_id": tenant_id, "reset": true }))).into_response()
    } else {
        (
            StatusCode::NOT_FOUND,
            Json(json!({ "tenant_id": tenant_id, "reset": false })),
        )
            .into_response()
    }
}

/// Any route not handled above; reaching it means the request was admitted
async fn admitted_handler() -> Json<serde_json::Value> {
    Json(json!({ "status": "admitted" }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_server_stops_on_shutdown() {
        let app = router(RateLimitManager::default_config());
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let result = serve(addr, app, async {}).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_bind_failure_is_reported() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let taken = listener.local_addr().unwrap();
        let app = router(RateLimitManager::default_config());
        assert!(serve(taken, app, async {}).await.is_err());
    }

    #[test]
    fn test_router_options_from_config() {
        let server = ServerConfig {
            admin_token: Some("s3cret".to_string()),
            trust_tenant_header: true,
            ..ServerConfig::default()
        };
        let options = RouterOptions::from_config(&server);
        assert_eq!(options.admin_token.as_deref(), Some("s3cret"));
        assert!(options.trust_tenant_header);
        assert!(options.bypass.is_bypassed("/health"));

        let defaults = RouterOptions::default();
        assert!(defaults.admin_token.is_none());
        assert!(!defaults.trust_tenant_header);
    }
}
