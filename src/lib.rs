//! Return-request HTTP service guarded by a per-client fixed-window rate limiter.

use anyhow::Result;
use axum::{
    middleware::from_fn,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer,
};

pub mod config;
pub mod docs;
pub mod error;
pub mod metrics;
pub mod middleware;
pub mod ratelimit;
pub mod routes;
pub mod store;

use config::AppConfig;
use middleware::{MiddlewareChain, RateLimitState};
use ratelimit::RateLimiter;
use store::ReturnStore;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub limiter: Arc<RateLimiter>,
    pub store: Arc<ReturnStore>,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        limiter: Arc<RateLimiter>,
        metrics: Option<PrometheusHandle>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            limiter,
            store: Arc::new(ReturnStore::new()),
            metrics,
        }
    }
}

/// Build the full application router.
///
/// The return endpoints sit behind the middleware chain (request logging, then
/// rate limiting), wrapped in request metrics. Health, metrics and docs are
/// served outside it.
pub fn create_app(state: AppState) -> Result<Router> {
    let config = state.config.clone();

    let api = Router::new()
        .route("/returns", post(routes::returns::create_return))
        .route("/returns/:id", get(routes::returns::get_return))
        .with_state(state.clone());

    let mut chain = MiddlewareChain::new();
    if config.logging.enabled {
        chain = chain.with(middleware::logging());
    }
    if config.rate_limiting.enabled {
        chain = chain.with(middleware::rate_limiting(RateLimitState::from_config(
            state.limiter.clone(),
            &config.rate_limiting,
        )?));
    }

    let ops = Router::new()
        .route("/health", get(routes::health::health))
        .route("/metrics", get(routes::health::metrics))
        .merge(docs::create_swagger_router())
        .with_state(state);

    let api = chain.wrap(api).layer(from_fn(middleware::track_metrics));

    Ok(api.merge(ops).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .layer(CompressionLayer::new())
            .layer(TimeoutLayer::new(Duration::from_secs(
                config.server.timeout_seconds,
            ))),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::ManualClock;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use axum::{
        body::Body,
        extract::ConnectInfo,
        http::{header, Method, Request, StatusCode},
    };
    use serde_json::Value;
    use std::net::SocketAddr;
    use tower::ServiceExt;

    fn test_app(limit: u32) -> (Router, AppState) {
        let mut config = AppConfig::default();
        config.rate_limiting.requests_per_window = limit;
        let limiter = Arc::new(RateLimiter::with_clock(
            limit,
            config.rate_limiting.window(),
            Arc::new(ManualClock::new()),
        ));
        let state = AppState::new(config, limiter, None);
        (create_app(state.clone()).unwrap(), state)
    }

    fn request(method: Method, uri: &str, body: Body) -> Request<Body> {
        let mut request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(body)
            .unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo("192.0.2.10:40000".parse::<SocketAddr>().unwrap()));
        request
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_create_and_fetch_return() {
        let (app, _state) = test_app(10);

        let response = app
            .clone()
            .oneshot(request(
                Method::POST,
                "/returns",
                Body::from(r#"{"orderId":"ORD-7"}"#),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let created = json_body(response).await;
        assert_eq!(created["orderId"], "ORD-7");

        let id = created["id"].as_str().unwrap();
        let response = app
            .clone()
            .oneshot(request(Method::GET, &format!("/returns/{id}"), Body::empty()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["orderId"], "ORD-7");
    }

    #[tokio::test]
    async fn test_invalid_payloads_rejected() {
        let (app, state) = test_app(10);

        for body in [r#"{"orderId":""}"#, r#"{"nope":1}"#, "not json"] {
            let response = app
                .clone()
                .oneshot(request(Method::POST, "/returns", Body::from(body)))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body: {body}");
            assert!(json_body(response).await["error"].is_string());
        }

        assert!(state.store.is_empty().await);
    }

    #[tokio::test]
    async fn test_get_unknown_and_malformed_ids() {
        let (app, _state) = test_app(10);

        let missing = app
            .clone()
            .oneshot(request(
                Method::GET,
                "/returns/6f1c1f0e-3c1b-4a8e-9a55-0c1d2e3f4a5b",
                Body::empty(),
            ))
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);

        let malformed = app
            .clone()
            .oneshot(request(Method::GET, "/returns/abc", Body::empty()))
            .await
            .unwrap();
        assert_eq!(malformed.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_returns_rate_limited_but_health_is_not() {
        let (app, state) = test_app(2);

        for _ in 0..2 {
            let response = app
                .clone()
                .oneshot(request(Method::GET, "/returns/abc", Body::empty()))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        }

        let limited = app
            .clone()
            .oneshot(request(Method::GET, "/returns/abc", Body::empty()))
            .await
            .unwrap();
        assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);

        let health = app
            .clone()
            .oneshot(request(Method::GET, "/health", Body::empty()))
            .await
            .unwrap();
        assert_eq!(health.status(), StatusCode::OK);
        assert_eq!(json_body(health).await["tracked_clients"], 1);
        assert_eq!(state.limiter.tracker_count(), 1);
    }

    #[tokio::test]
    async fn test_metrics_disabled_without_recorder() {
        let (app, _state) = test_app(10);

        let response = app
            .oneshot(request(Method::GET, "/metrics", Body::empty()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_requests_counted_with_logging_disabled() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        let mut config = AppConfig::default();
        config.logging.enabled = false;
        config.rate_limiting.requests_per_window = 1;
        let limiter = Arc::new(RateLimiter::with_clock(
            1,
            config.rate_limiting.window(),
            Arc::new(ManualClock::new()),
        ));
        let app = create_app(AppState::new(config, limiter, None)).unwrap();

        ::metrics::with_local_recorder(&recorder, || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            runtime.block_on(async {
                for expected in [StatusCode::BAD_REQUEST, StatusCode::TOO_MANY_REQUESTS] {
                    let response = app
                        .clone()
                        .oneshot(request(Method::GET, "/returns/abc", Body::empty()))
                        .await
                        .unwrap();
                    assert_eq!(response.status(), expected);
                }
            });
        });

        let rendered = handle.render();
        assert!(rendered.contains("returns_http_requests_total 2"), "{rendered}");
        assert!(rendered.contains("returns_rate_limited_total 1"), "{rendered}");
        assert!(rendered.contains("returns_rate_limit_trackers 1"), "{rendered}");
    }
}
