//! HTTP request handlers with OpenAPI documentation.

use std::sync::Arc;

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::{error, info};
use utoipa::OpenApi;

use crate::app::AppState;
use crate::domain::{
    AppError, BlockchainError, ErrorResponse, ExternalServiceError, GenerateImageRequest,
    GenerateImageResponse, GenerationMetadata, HealthResponse, HealthStatus, PaymentFailure,
    PaymentTerms, RateLimitResponse, SolanaNetwork, ValidationError,
};

/// OpenAPI documentation structure
#[derive(OpenApi)]
#[openapi(
    info(
        title = "PennyPics API",
        version = "0.1.0",
        description = "Pay-per-image AI generation: a Solana micro-payment unlocks one text-to-image request",
        license(
            name = "MIT"
        )
    ),
    paths(
        generate_image_handler,
        payment_terms_handler,
        health_check_handler,
        liveness_handler,
        readiness_handler,
    ),
    components(
        schemas(
            GenerateImageRequest,
            GenerateImageResponse,
            GenerationMetadata,
            PaymentTerms,
            SolanaNetwork,
            HealthResponse,
            HealthStatus,
            ErrorResponse,
            RateLimitResponse,
        )
    ),
    tags(
        (name = "images", description = "Image generation proxy"),
        (name = "payments", description = "Payment terms"),
        (name = "health", description = "Health check endpoints")
    )
)]
pub struct ApiDoc;

/// Generate images from a text prompt
///
/// Forwards the prompt to the configured text-to-image API. Width and height
/// are clamped to 512..=1536 and snapped to multiples of 64; unknown styles
/// fall back to `photographic`.
#[utoipa::path(
    post,
    path = "/api/generate-image",
    tag = "images",
    request_body = GenerateImageRequest,
    responses(
        (status = 200, description = "Images generated", body = GenerateImageResponse),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 413, description = "Request body too large", body = ErrorResponse),
        (status = 429, description = "Rate limit exceeded", body = RateLimitResponse),
        (status = 500, description = "Upstream or configuration error", body = ErrorResponse)
    )
)]
pub async fn generate_image_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<GenerateImageRequest>, JsonRejection>,
) -> Result<Json<GenerateImageResponse>, AppError> {
    let Json(request) = payload.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            AppError::Validation(ValidationError::PayloadTooLarge(rejection.body_text()))
        } else {
            AppError::Validation(ValidationError::Multiple(rejection.body_text()))
        }
    })?;

    let response = state.generation.generate_image(&request).await?;
    info!(
        request_id = %response.metadata.request_id,
        images = response.images.len(),
        "Image request served"
    );
    Ok(Json(response))
}

/// Price, recipient and network a client must pay before generating
#[utoipa::path(
    get,
    path = "/api/payment-terms",
    tag = "payments",
    responses(
        (status = 200, description = "Current payment terms", body = PaymentTerms)
    )
)]
pub async fn payment_terms_handler(State(state): State<Arc<AppState>>) -> Json<PaymentTerms> {
    Json(state.payment_terms.clone())
}

/// Detailed health check
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Health status", body = HealthResponse)
    )
)]
pub async fn health_check_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(state.health_check().await)
}

/// Kubernetes liveness probe
#[utoipa::path(
    get,
    path = "/health/live",
    tag = "health",
    responses(
        (status = 200, description = "Application is alive")
    )
)]
pub async fn liveness_handler() -> StatusCode {
    StatusCode::OK
}

/// Kubernetes readiness probe
#[utoipa::path(
    get,
    path = "/health/ready",
    tag = "health",
    responses(
        (status = 200, description = "Application is ready to serve traffic"),
        (status = 503, description = "Application is not ready")
    )
)]
pub async fn readiness_handler(State(state): State<Arc<AppState>>) -> StatusCode {
    match state.health_check().await.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, error_type, summary, details) = match &self {
            AppError::Validation(ValidationError::PayloadTooLarge(_)) => (
                StatusCode::PAYLOAD_TOO_LARGE,
                "payload_too_large",
                "Request body too large",
                Some(self.to_string()),
            ),
            AppError::Validation(e) => (
                StatusCode::BAD_REQUEST,
                "validation_error",
                "Invalid request",
                Some(e.to_string()),
            ),
            AppError::ExternalService(ext_err) => match ext_err {
                ExternalServiceError::ApiError { message, .. } => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "external_service_error",
                    "Image generation failed",
                    Some(message.clone()),
                ),
                ExternalServiceError::Timeout(_) => (
                    StatusCode::GATEWAY_TIMEOUT,
                    "timeout",
                    "Image generation timed out",
                    Some(ext_err.to_string()),
                ),
                ExternalServiceError::RateLimited(_) => (
                    StatusCode::TOO_MANY_REQUESTS,
                    "rate_limited",
                    "Image API rate limit exceeded",
                    Some(ext_err.to_string()),
                ),
                _ => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "external_service_error",
                    "Image generation failed",
                    Some(ext_err.to_string()),
                ),
            },
            AppError::Config(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "configuration_error",
                "Server configuration error",
                Some(e.to_string()),
            ),
            AppError::Blockchain(bc_err) => match bc_err {
                BlockchainError::InsufficientFunds => (
                    StatusCode::PAYMENT_REQUIRED,
                    "insufficient_funds",
                    "Insufficient funds",
                    None,
                ),
                BlockchainError::Connection(_) | BlockchainError::NoHealthyEndpoint(_) => (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "blockchain_error",
                    "Blockchain unavailable",
                    Some(bc_err.to_string()),
                ),
                BlockchainError::Timeout(_) => (
                    StatusCode::GATEWAY_TIMEOUT,
                    "timeout",
                    "Blockchain request timed out",
                    Some(bc_err.to_string()),
                ),
                _ => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "blockchain_error",
                    "Blockchain error",
                    Some(bc_err.to_string()),
                ),
            },
            AppError::Payment(reason) => (
                StatusCode::PAYMENT_REQUIRED,
                match reason {
                    PaymentFailure::InsufficientFunds { .. } => "insufficient_funds",
                    _ => "payment_failed",
                },
                "Payment failed",
                Some(reason.to_string()),
            ),
            AppError::Conflict(msg) => (
                StatusCode::CONFLICT,
                "conflict",
                "Request already in progress",
                Some(msg.clone()),
            ),
            AppError::Serialization(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "serialization_error",
                "Internal server error",
                Some(self.to_string()),
            ),
            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "Internal server error",
                Some(self.to_string()),
            ),
            AppError::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                "rate_limited",
                "Rate limit exceeded",
                None,
            ),
        };

        if status.is_server_error() {
            error!(error_type = %error_type, error = %self, "Server error");
        }

        let body = Json(ErrorResponse {
            error: summary.to_string(),
            details,
            error_type: error_type.to_string(),
        });

        (status, body).into_response()
    }
}
