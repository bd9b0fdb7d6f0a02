use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;

/// Count every request and record its latency, whether or not it was logged
/// or rate limited.
pub async fn track_metrics(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let response = next.run(request).await;

    crate::metrics::record_request(response.status().as_u16(), start.elapsed().as_secs_f64());

    response
}
