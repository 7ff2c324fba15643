//! HTTP client for a PennyPics server, used by the CLI.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::domain::{
    AppError, ErrorResponse, ExternalServiceError, GenerateImageRequest, GenerateImageResponse,
    GenerationBackend, PaymentTerms,
};

/// Default server address
pub const DEFAULT_SERVER_URL: &str = "http://localhost:3000";

#[derive(Debug, Clone)]
pub struct ProxyClient {
    http_client: Client,
    base_url: String,
}

impl ProxyClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, AppError> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self::with_client(http_client, base_url))
    }

    pub fn with_client(http_client: Client, base_url: &str) -> Self {
        Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch the server's price and recipient
    #[instrument(skip(self), fields(server = %self.base_url))]
    pub async fn payment_terms(&self) -> Result<PaymentTerms, AppError> {
        let response = self
            .http_client
            .get(format!("{}/api/payment-terms", self.base_url))
            .send()
            .await
            .map_err(map_send_error)?;
        Self::decode(response).await
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, AppError> {
        let status = response.status();
        if status.is_success() {
            return response.json().await.map_err(|e| {
                AppError::ExternalService(ExternalServiceError::ParseError(e.to_string()))
            });
        }

        let body = response.text().await.unwrap_or_default();
        let message = match serde_json::from_str::<ErrorResponse>(&body) {
            Ok(err) => match err.details {
                Some(details) => format!("{}: {}", err.error, details),
                None => err.error,
            },
            Err(_) => body.trim().to_string(),
        };
        warn!(status = %status, message = %message, "Server returned error");

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(AppError::ExternalService(ExternalServiceError::RateLimited(
                message,
            )));
        }
        Err(AppError::ExternalService(ExternalServiceError::ApiError {
            status_code: status.as_u16(),
            message,
        }))
    }
}

fn map_send_error(e: reqwest::Error) -> AppError {
    if e.is_timeout() {
        AppError::ExternalService(ExternalServiceError::Timeout(e.to_string()))
    } else {
        AppError::ExternalService(ExternalServiceError::Network(e.to_string()))
    }
}

#[async_trait]
impl GenerationBackend for ProxyClient {
    #[instrument(skip(self, request), fields(server = %self.base_url))]
    async fn generate(
        &self,
        request: &GenerateImageRequest,
    ) -> Result<GenerateImageResponse, AppError> {
        debug!("Requesting image generation");
        let response = self
            .http_client
            .post(format!("{}/api/generate-image", self.base_url))
            .json(request)
            .send()
            .await
            .map_err(map_send_error)?;
        Self::decode(response).await
    }
}
