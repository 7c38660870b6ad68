// Path: crates/gateway/src/http.rs
//! The axum HTTP surface.
//!
//! Routes: `POST /v1/execute` (the public request surface),
//! `GET /v1/health` (sanitized control snapshot plus coarse status),
//! `POST /v1/admin/control` (the narrow admin surface), and `/metrics`
//! from the telemetry crate. Caller identity comes from the
//! `x-artifex-caller` header, falling back to the peer address.

use crate::{Gateway, Submission};
use artifex_types::control::ControlPatch;
use artifex_types::error::{ControlError, ErrorCode, GatewayError, ResolveError, VmError};
use artifex_types::request::ExecutionRequest;
use axum::{
    extract::{ConnectInfo, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tower::{
    limit::ConcurrencyLimitLayer, load_shed::LoadShedLayer, timeout::TimeoutLayer, BoxError,
    ServiceBuilder,
};
use tower_http::{catch_panic::CatchPanicLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};

/// Header carrying the caller identity.
const CALLER_HEADER: &str = "x-artifex-caller";
/// Executions may legitimately run up to the 60 s timeout ceiling.
const HTTP_TIMEOUT: Duration = Duration::from_secs(75);

/// The error envelope for every failure response.
struct ApiError(GatewayError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = self.0;
        let status = status_for(&err);
        let mut response = (
            status,
            Json(serde_json::json!({
                "error": { "code": err.code(), "message": err.to_string() }
            })),
        )
            .into_response();
        if let GatewayError::RateLimited { retry_after_secs } = &err {
            if let Ok(value) = retry_after_secs.to_string().parse() {
                response.headers_mut().insert("retry-after", value);
            }
        }
        response
    }
}

fn status_for(err: &GatewayError) -> StatusCode {
    match err {
        GatewayError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        GatewayError::Disabled | GatewayError::Frozen => StatusCode::SERVICE_UNAVAILABLE,
        GatewayError::NotInCanary | GatewayError::PermissionDenied { .. } => StatusCode::FORBIDDEN,
        GatewayError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
        GatewayError::Resolve(e) => match e {
            ResolveError::NotFound(_) => StatusCode::NOT_FOUND,
            ResolveError::Identifier(artifex_types::error::CidError::Malformed(_)) => {
                StatusCode::BAD_REQUEST
            }
            ResolveError::Identifier(_) | ResolveError::SizeMismatch { .. } => {
                StatusCode::BAD_GATEWAY
            }
            ResolveError::NetworkTransient(_) | ResolveError::NetworkFatal(_) => {
                StatusCode::BAD_GATEWAY
            }
            ResolveError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        },
        GatewayError::Vm(VmError::TypeUnsupported(_)) => StatusCode::BAD_REQUEST,
        GatewayError::Vm(_) | GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn caller_identity(headers: &HeaderMap, addr: &SocketAddr) -> String {
    headers
        .get(CALLER_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| addr.ip().to_string())
}

async fn execute_handler(
    State(gateway): State<Arc<Gateway>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(request): Json<ExecutionRequest>,
) -> Result<Response, ApiError> {
    let caller = caller_identity(&headers, &addr);
    let result = gateway
        .submit(Submission { caller, request })
        .await
        .map_err(ApiError)?;
    Ok(Json(result).into_response())
}

async fn health_handler(State(gateway): State<Arc<Gateway>>) -> Response {
    Json(gateway.health()).into_response()
}

async fn control_handler(
    State(gateway): State<Arc<Gateway>>,
    Json(patch): Json<ControlPatch>,
) -> Result<Response, ApiError> {
    let updated = gateway.control().update(patch).map_err(|e| {
        ApiError(match e {
            ControlError::InvalidPatch(msg) => GatewayError::InvalidRequest(msg),
            other => GatewayError::Internal(other.to_string()),
        })
    })?;
    Ok(Json((*updated).clone()).into_response())
}

async fn map_middleware_error(err: BoxError) -> impl IntoResponse {
    if err.is::<tower::timeout::error::Elapsed>() {
        (
            StatusCode::REQUEST_TIMEOUT,
            Json(serde_json::json!({
                "error": { "code": "TIMEOUT", "message": "request timed out" }
            })),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "error": { "code": "OVERLOADED", "message": err.to_string() }
            })),
        )
    }
}

/// Builds the full router, including the telemetry `/metrics` route.
pub fn router(gateway: Arc<Gateway>, body_limit_kb: usize, concurrency: usize) -> Router {
    Router::new()
        .route("/v1/execute", post(execute_handler))
        .route("/v1/health", get(health_handler))
        .route("/v1/admin/control", post(control_handler))
        .with_state(gateway)
        .merge(artifex_telemetry::http::metrics_router())
        .layer(
            ServiceBuilder::new()
                .layer(axum::error_handling::HandleErrorLayer::new(
                    map_middleware_error,
                ))
                .layer(LoadShedLayer::new())
                .layer(ConcurrencyLimitLayer::new(concurrency))
                .layer(TimeoutLayer::new(HTTP_TIMEOUT)),
        )
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(body_limit_kb * 1024))
}

/// Serves the gateway until the shutdown channel flips.
pub async fn run_server(
    gateway: Arc<Gateway>,
    listen_addr: String,
    body_limit_kb: usize,
    concurrency: usize,
    mut shutdown_rx: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let app = router(gateway, body_limit_kb, concurrency);
    let addr: SocketAddr = listen_addr.parse()?;
    tracing::info!(target: "gateway", %addr, "gateway listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;

    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        shutdown_rx.changed().await.ok();
        tracing::info!(target: "gateway", "shutting down gracefully");
    });

    if let Err(e) = server.await {
        tracing::error!(target: "gateway", error = %e, "server error");
    }
    Ok(())
}
