//! Router assembly: routes, middleware and optional rate limiting.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Request, State},
    http::{StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use governor::{
    Quota, RateLimiter,
    clock::{Clock, DefaultClock},
    state::{InMemoryState, NotKeyed},
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{info, warn};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::app::AppState;
use crate::domain::RateLimitResponse;

use super::handlers::{
    ApiDoc, generate_image_handler, health_check_handler, liveness_handler,
    payment_terms_handler, readiness_handler,
};

/// Upstream generation can take a while; requests beyond this are cut off
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Generation requests are small JSON bodies
const MAX_BODY_BYTES: usize = 64 * 1024;

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Rate limiting configuration for the generation route
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub requests_per_second: u32,
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 2,
            burst_size: 5,
        }
    }
}

impl RateLimitConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        use std::env;

        let defaults = Self::default();
        Self {
            requests_per_second: env::var("RATE_LIMIT_RPS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.requests_per_second),
            burst_size: env::var("RATE_LIMIT_BURST")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.burst_size),
        }
    }

    fn quota(&self) -> Quota {
        let rps = NonZeroU32::new(self.requests_per_second).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(self.burst_size).unwrap_or(rps);
        Quota::per_second(rps).allow_burst(burst)
    }
}

/// Create the router without rate limiting
pub fn create_router(app_state: Arc<AppState>) -> Router {
    build_router(app_state, None)
}

/// Create the router with a global limiter on `POST /api/generate-image`
pub fn create_router_with_rate_limit(app_state: Arc<AppState>, config: RateLimitConfig) -> Router {
    info!(
        rps = config.requests_per_second,
        burst = config.burst_size,
        "Rate limiting enabled"
    );
    build_router(app_state, Some(config))
}

fn build_router(app_state: Arc<AppState>, rate_limit: Option<RateLimitConfig>) -> Router {
    let mut generate = Router::new().route("/api/generate-image", post(generate_image_handler));
    if let Some(config) = rate_limit {
        let limiter = Arc::new(RateLimiter::direct(config.quota()));
        generate = generate.layer(middleware::from_fn_with_state(limiter, rate_limit_middleware));
    }

    let api = Router::new()
        .merge(generate)
        .route("/api/payment-terms", get(payment_terms_handler))
        .route("/health", get(health_check_handler))
        .route("/health/live", get(liveness_handler))
        .route("/health/ready", get(readiness_handler))
        .with_state(app_state);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(TimeoutLayer::with_status_code(
                    StatusCode::REQUEST_TIMEOUT,
                    REQUEST_TIMEOUT,
                )),
        )
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
}

async fn rate_limit_middleware(
    State(limiter): State<Arc<DirectLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    match limiter.check() {
        Ok(()) => next.run(request).await,
        Err(not_until) => {
            let wait = not_until.wait_time_from(DefaultClock::default().now());
            let retry_after = wait.as_secs().max(1);
            warn!(retry_after, "Rate limit exceeded");
            (
                StatusCode::TOO_MANY_REQUESTS,
                [(header::RETRY_AFTER, retry_after.to_string())],
                Json(RateLimitResponse {
                    error: "Rate limit exceeded".to_string(),
                    retry_after,
                }),
            )
                .into_response()
        }
    }
}
