use anyhow::{Context, Result};
use axum::{
    extract::{Request, State},
    http::{header, HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::{KeySource, RateLimitingConfig};
use crate::ratelimit::{ClientKeyExtractor, Decision, ForwardedFor, PeerAddr, RateLimiter};

/// Bucket shared by requests whose client cannot be identified.
pub const UNKNOWN_CLIENT: &str = "unknown";

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");

/// Everything the rate limit middleware needs per request.
#[derive(Clone)]
pub struct RateLimitState {
    pub limiter: Arc<RateLimiter>,
    pub extractor: Arc<dyn ClientKeyExtractor>,
}

impl RateLimitState {
    pub fn new(limiter: Arc<RateLimiter>, extractor: Arc<dyn ClientKeyExtractor>) -> Self {
        Self { limiter, extractor }
    }

    /// Keyed by peer address.
    pub fn by_peer(limiter: Arc<RateLimiter>) -> Self {
        Self::new(limiter, Arc::new(PeerAddr))
    }

    /// Pick the key extractor named by `config`.
    pub fn from_config(limiter: Arc<RateLimiter>, config: &RateLimitingConfig) -> Result<Self> {
        let extractor: Arc<dyn ClientKeyExtractor> = match config.key_source {
            KeySource::Peer => Arc::new(PeerAddr),
            KeySource::Forwarded => {
                let header = HeaderName::from_bytes(config.forwarded_header.as_bytes())
                    .with_context(|| {
                        format!("invalid forwarded header: {}", config.forwarded_header)
                    })?;
                Arc::new(ForwardedFor::new(header))
            }
        };
        Ok(Self::new(limiter, extractor))
    }
}

pub async fn rate_limit_middleware(
    State(state): State<RateLimitState>,
    request: Request,
    next: Next,
) -> Response {
    let key = match state.extractor.extract(&request) {
        Some(key) => key,
        None => {
            warn!(
                path = request.uri().path(),
                "No client identity on request, using shared bucket"
            );
            UNKNOWN_CLIENT.to_string()
        }
    };

    match state.limiter.check(&key) {
        Decision::Allowed { remaining } => {
            let mut response = next.run(request).await;
            let headers = response.headers_mut();
            headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(state.limiter.limit()));
            headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(remaining));
            response
        }
        Decision::Denied { retry_after } => {
            debug!(
                client = %key,
                path = request.uri().path(),
                retry_after_ms = retry_after.as_millis() as u64,
                "Rate limit exceeded"
            );
            crate::metrics::record_rate_limited();
            too_many_requests(retry_after.as_secs_f64().ceil().max(1.0) as u64)
        }
    }
}

fn too_many_requests(retry_after_secs: u64) -> Response {
    let mut response = StatusCode::TOO_MANY_REQUESTS.into_response();
    response
        .headers_mut()
        .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
    response
}
