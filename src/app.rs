use std::{net::SocketAddr, time::Duration};

use anyhow::Context;
use axum::{
    http::{HeaderValue, Method, Request, Response},
    middleware,
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{info, warn, Span};

use crate::{
    auth,
    config::AppConfig,
    security::{events, headers::with_security_headers, rate_limit},
    state::AppState,
    todos,
};

const REQUEST_ID_HEADER: &str = "x-request-id";

pub fn build_app(state: AppState) -> Router {
    let config = state.config.clone();

    let credential_routes = auth::router().route_layer(middleware::from_fn_with_state(
        state.clone(),
        rate_limit::throttle,
    ));

    let router = Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .merge(credential_routes)
        .merge(auth::me_router())
        .merge(todos::router())
        .with_state(state)
        .layer(middleware::from_fn(events::monitor));

    let request_id = axum::http::HeaderName::from_static(REQUEST_ID_HEADER);
    with_security_headers(router, config.environment.is_production())
        .layer(cors_layer(&config))
        .layer(PropagateRequestIdLayer::new(request_id.clone()))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &Request<_>| {
                    let request_id = req
                        .headers()
                        .get(REQUEST_ID_HEADER)
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("-");
                    tracing::info_span!(
                        "http_request",
                        method = %req.method(),
                        uri = %req.uri(),
                        request_id,
                        status = tracing::field::Empty,
                    )
                })
                .on_response(|res: &Response<_>, latency: Duration, span: &Span| {
                    let status = res.status();
                    span.record("status", tracing::field::display(status));
                    let latency_ms = latency.as_millis() as u64;
                    if status.is_server_error() {
                        tracing::error!(%status, latency_ms, "response");
                    } else {
                        tracing::info!(%status, latency_ms, "response");
                    }
                }),
        )
        .layer(SetRequestIdLayer::new(request_id, MakeRequestUuid))
}

/// Permissive outside production unless origins are configured.
fn cors_layer(config: &AppConfig) -> CorsLayer {
    if config.cors_origins.is_empty() {
        if config.environment.is_production() {
            warn!("CORS_ORIGINS not set in production; cross-origin requests are refused");
            return CorsLayer::new();
        }
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(origin = %o, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any)
}

async fn root() -> Json<Value> {
    Json(json!({ "message": "Welcome to the Todo API" }))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}

pub async fn serve(app: Router, addr: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    info!("listening on {}", listener.local_addr()?);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
        return;
    }
    info!("shutdown signal received");
}
