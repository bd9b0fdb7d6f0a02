use anyhow::Result;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub const HTTP_REQUESTS_TOTAL: &str = "returns_http_requests_total";
pub const HTTP_5XX_TOTAL: &str = "returns_http_5xx_total";
pub const HTTP_REQUEST_DURATION: &str = "returns_http_request_duration_seconds";
pub const RATE_LIMITED_TOTAL: &str = "returns_rate_limited_total";
pub const RATE_LIMIT_TRACKERS: &str = "returns_rate_limit_trackers";
pub const RETURNS_CREATED_TOTAL: &str = "returns_created_total";

/// Install the global Prometheus recorder. The handle renders `/metrics`.
pub fn install_recorder() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    Ok(handle)
}

pub fn record_request(status_code: u16, latency_seconds: f64) {
    counter!(HTTP_REQUESTS_TOTAL).increment(1);
    histogram!(HTTP_REQUEST_DURATION).record(latency_seconds);

    if status_code >= 500 {
        counter!(HTTP_5XX_TOTAL).increment(1);
    }
}

pub fn record_rate_limited() {
    counter!(RATE_LIMITED_TOTAL).increment(1);
}

pub fn record_return_created() {
    counter!(RETURNS_CREATED_TOTAL).increment(1);
}

pub fn set_tracked_clients(count: usize) {
    gauge!(RATE_LIMIT_TRACKERS).set(count as f64);
}
