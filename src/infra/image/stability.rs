//! Stability AI text-to-image client.
//!
//! Speaks the v1 REST API:
//! `POST {base}/v1/generation/{engine}/text-to-image`.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

use crate::domain::{
    AppError, ConfigError, ExternalServiceError, GeneratedImage, GenerationParams, ImageGenerator,
};

/// Default Stability AI API base URL
pub const DEFAULT_IMAGE_API_URL: &str = "https://api.stability.ai";

/// Default engine id
pub const DEFAULT_ENGINE: &str = "stable-diffusion-v1-6";

/// Appended to every request as a negatively weighted prompt
pub const NEGATIVE_PROMPT: &str =
    "blurry, bad quality, distorted, deformed, disfigured, low resolution, watermark, text, signature";

#[derive(Debug, Clone)]
pub struct StabilityConfig {
    pub api_key: Option<SecretString>,
    pub base_url: String,
    pub engine: String,
    pub timeout: Duration,
    pub cfg_scale: f32,
    pub steps: u32,
}

impl Default for StabilityConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_IMAGE_API_URL.to_string(),
            engine: DEFAULT_ENGINE.to_string(),
            timeout: Duration::from_secs(120),
            cfg_scale: 7.0,
            steps: 30,
        }
    }
}

impl StabilityConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        use std::env;

        let api_key = env::var("IMAGE_API_KEY")
            .or_else(|_| env::var("STABILITY_API_KEY"))
            .ok()
            .filter(|k| !k.is_empty())
            .map(SecretString::from);

        let base_url = env::var("IMAGE_API_URL")
            .ok()
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| DEFAULT_IMAGE_API_URL.to_string());

        let engine = env::var("IMAGE_ENGINE")
            .ok()
            .filter(|e| !e.is_empty())
            .unwrap_or_else(|| DEFAULT_ENGINE.to_string());

        let timeout = env::var("IMAGE_API_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(120));

        Self {
            api_key,
            base_url,
            engine,
            timeout,
            ..Default::default()
        }
    }
}

#[derive(Debug, Serialize)]
struct TextPrompt<'a> {
    text: &'a str,
    weight: f32,
}

#[derive(Debug, Serialize)]
struct TextToImageRequest<'a> {
    text_prompts: Vec<TextPrompt<'a>>,
    cfg_scale: f32,
    height: u32,
    width: u32,
    samples: u32,
    steps: u32,
    style_preset: &'a str,
}

#[derive(Debug, Deserialize)]
struct TextToImageResponse {
    #[serde(default)]
    artifacts: Vec<Artifact>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Artifact {
    base64: String,
    seed: Option<u64>,
    finish_reason: Option<String>,
}

/// Error body returned by the API on non-2xx responses
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    name: Option<String>,
    message: String,
}

/// Image generator backed by Stability AI
#[derive(Debug, Clone)]
pub struct StabilityImageClient {
    http_client: Client,
    config: StabilityConfig,
}

impl StabilityImageClient {
    pub fn new(config: StabilityConfig) -> Result<Self, AppError> {
        let http_client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            http_client,
            config,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1/generation/{}/text-to-image",
            self.config.base_url.trim_end_matches('/'),
            self.config.engine
        )
    }

    /// Pull the most useful message out of an error body
    fn upstream_message(body: &str) -> String {
        match serde_json::from_str::<ApiErrorBody>(body) {
            Ok(parsed) => match parsed.name {
                Some(name) if !name.is_empty() => format!("{}: {}", name, parsed.message),
                _ => parsed.message,
            },
            Err(_) if body.trim().is_empty() => "empty response body".to_string(),
            Err(_) => body.trim().to_string(),
        }
    }
}

#[async_trait]
impl ImageGenerator for StabilityImageClient {
    #[instrument(skip(self, params), fields(engine = %self.config.engine, style = %params.style, width = params.width, height = params.height, samples = params.samples))]
    async fn generate(&self, params: &GenerationParams) -> Result<Vec<GeneratedImage>, AppError> {
        let api_key = self.config.api_key.as_ref().ok_or_else(|| {
            AppError::Config(ConfigError::Missing(
                "IMAGE_API_KEY not configured".to_string(),
            ))
        })?;

        let body = TextToImageRequest {
            text_prompts: vec![
                TextPrompt {
                    text: &params.prompt,
                    weight: 1.0,
                },
                TextPrompt {
                    text: NEGATIVE_PROMPT,
                    weight: -1.0,
                },
            ],
            cfg_scale: self.config.cfg_scale,
            height: params.height,
            width: params.width,
            samples: params.samples,
            steps: self.config.steps,
            style_preset: params.style.as_str(),
        };

        let url = self.endpoint();
        debug!(url = %url, "Calling image API");

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(api_key.expose_secret())
            .header("Accept", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "Image API request failed");
                if e.is_timeout() {
                    AppError::ExternalService(ExternalServiceError::Timeout(e.to_string()))
                } else {
                    AppError::ExternalService(ExternalServiceError::Network(e.to_string()))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = Self::upstream_message(&text);
            error!(status = %status, message = %message, "Image API returned error");
            return Err(AppError::ExternalService(ExternalServiceError::ApiError {
                status_code: status.as_u16(),
                message,
            }));
        }

        let parsed: TextToImageResponse = response.json().await.map_err(|e| {
            error!(error = %e, "Failed to parse image API response");
            AppError::ExternalService(ExternalServiceError::ParseError(e.to_string()))
        })?;

        if parsed.artifacts.is_empty() {
            return Err(AppError::ExternalService(ExternalServiceError::ParseError(
                "No images generated".to_string(),
            )));
        }

        for artifact in &parsed.artifacts {
            if artifact.finish_reason.as_deref() == Some("CONTENT_FILTERED") {
                warn!(seed = ?artifact.seed, "Image API filtered an artifact");
            }
        }

        info!(count = parsed.artifacts.len(), "Images generated");

        Ok(parsed
            .artifacts
            .into_iter()
            .map(|a| GeneratedImage {
                base64: a.base64,
                seed: a.seed,
                finish_reason: a.finish_reason,
            })
            .collect())
    }

    fn engine(&self) -> &str {
        &self.config.engine
    }

    fn is_configured(&self) -> bool {
        self.config.api_key.is_some()
    }
}
