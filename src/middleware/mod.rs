//! Request middleware and the chain that composes it.

pub mod logging;
pub mod metrics;
pub mod rate_limit;

use axum::{middleware::from_fn, middleware::from_fn_with_state, Router};

pub use logging::logging_middleware;
pub use metrics::track_metrics;
pub use rate_limit::{rate_limit_middleware, RateLimitState};

/// Wraps a router in one cross-cutting behavior.
pub type Middleware = Box<dyn FnOnce(Router) -> Router + Send>;

/// Ordered list of middleware applied around a terminal router.
///
/// The first middleware added is the outermost: it sees the request first and
/// the response last.
#[derive(Default)]
pub struct MiddlewareChain {
    middlewares: Vec<Middleware>,
}

impl MiddlewareChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, middleware: Middleware) -> Self {
        self.middlewares.push(middleware);
        self
    }

    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    /// Compose the chain around `router`.
    ///
    /// Each `Router::layer` call wraps everything before it, so applying the
    /// list back to front leaves the first entry outermost.
    pub fn wrap(self, router: Router) -> Router {
        self.middlewares
            .into_iter()
            .rev()
            .fold(router, |router, middleware| middleware(router))
    }
}

/// Request logging.
pub fn logging() -> Middleware {
    Box::new(|router: Router| router.layer(from_fn(logging_middleware)))
}

/// Per-client rate limiting backed by `state`.
pub fn rate_limiting(state: RateLimitState) -> Middleware {
    Box::new(move |router: Router| {
        router.layer(from_fn_with_state(state, rate_limit_middleware))
    })
}
