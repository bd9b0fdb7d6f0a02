use reqwest::StatusCode;
use returns_api::{config::AppConfig, create_app, ratelimit::RateLimiter, AppState};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

/// Start the service on an ephemeral port and return its base URL.
async fn spawn_server(config: AppConfig) -> (String, Arc<RateLimiter>) {
    let limiter = Arc::new(RateLimiter::from_config(&config.rate_limiting));
    let app = create_app(AppState::new(config, limiter.clone(), None)).unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    (format!("http://{}", addr), limiter)
}

fn config_with_limit(limit: u32) -> AppConfig {
    let mut config = AppConfig::default();
    config.rate_limiting.requests_per_window = limit;
    config.rate_limiting.window_seconds = 60;
    config
}

#[tokio::test]
async fn test_health_endpoint() {
    let (base_url, _limiter) = spawn_server(AppConfig::default()).await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/health", base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "returns-api");
}

#[tokio::test]
async fn test_submit_and_retrieve_return() {
    let (base_url, _limiter) = spawn_server(config_with_limit(10)).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/returns", base_url))
        .json(&json!({ "orderId": "ORD-1001" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let created: Value = response.json().await.unwrap();
    let id = created["id"].as_str().unwrap().to_string();

    let response = client
        .get(format!("{}/returns/{}", base_url, id))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let fetched: Value = response.json().await.unwrap();
    assert_eq!(fetched["orderId"], "ORD-1001");
    assert_eq!(fetched["id"], id.as_str());
}

#[tokio::test]
async fn test_client_limited_across_connections() {
    let (base_url, limiter) = spawn_server(config_with_limit(3)).await;

    // A fresh client per request gives each request its own source port.
    let mut statuses = Vec::new();
    for _ in 0..4 {
        let response = reqwest::Client::new()
            .get(format!("{}/returns/{}", base_url, uuid::Uuid::new_v4()))
            .send()
            .await
            .unwrap();
        statuses.push(response.status());
    }

    assert_eq!(
        statuses,
        vec![
            StatusCode::NOT_FOUND,
            StatusCode::NOT_FOUND,
            StatusCode::NOT_FOUND,
            StatusCode::TOO_MANY_REQUESTS,
        ]
    );
    assert_eq!(limiter.tracker_count(), 1);
}

#[tokio::test]
async fn test_denied_response_carries_retry_after() {
    let (base_url, _limiter) = spawn_server(config_with_limit(1)).await;
    let client = reqwest::Client::new();

    let first = client
        .post(format!("{}/returns", base_url))
        .json(&json!({ "orderId": "ORD-1" }))
        .send()
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::CREATED);

    let denied = client
        .post(format!("{}/returns", base_url))
        .json(&json!({ "orderId": "ORD-2" }))
        .send()
        .await
        .unwrap();
    assert_eq!(denied.status(), StatusCode::TOO_MANY_REQUESTS);

    let retry_after: u64 = denied.headers()["retry-after"]
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!((1..=60).contains(&retry_after));
}

#[tokio::test]
async fn test_concurrent_clients_never_over_admitted() {
    let (base_url, _limiter) = spawn_server(config_with_limit(5)).await;
    let client = reqwest::Client::new();

    let requests = (0..20).map(|_| {
        let client = client.clone();
        let url = format!("{}/returns/{}", base_url, uuid::Uuid::new_v4());
        async move { client.get(url).send().await.unwrap().status() }
    });
    let statuses = futures::future::join_all(requests).await;

    let admitted = statuses
        .iter()
        .filter(|status| **status == StatusCode::NOT_FOUND)
        .count();
    let denied = statuses
        .iter()
        .filter(|status| **status == StatusCode::TOO_MANY_REQUESTS)
        .count();
    assert_eq!(admitted, 5);
    assert_eq!(denied, 15);
}

#[tokio::test]
async fn test_rate_limiting_can_be_disabled() {
    let mut config = config_with_limit(1);
    config.rate_limiting.enabled = false;
    let (base_url, limiter) = spawn_server(config).await;
    let client = reqwest::Client::new();

    for _ in 0..5 {
        let response = client
            .get(format!("{}/returns/{}", base_url, uuid::Uuid::new_v4()))
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
    assert_eq!(limiter.tracker_count(), 0);
}
