//! Server-side image generation: validate, normalize, forward upstream.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::domain::{
    AppError, GenerateImageRequest, GenerateImageResponse, GenerationBackend, GenerationMetadata,
    GenerationParams, ImageGenerator, ValidationError,
};

/// Stateless proxy in front of an [`ImageGenerator`]
pub struct GenerationService {
    generator: Arc<dyn ImageGenerator>,
}

impl GenerationService {
    #[must_use]
    pub fn new(generator: Arc<dyn ImageGenerator>) -> Self {
        Self { generator }
    }

    /// Whether the upstream generator has credentials
    pub fn is_configured(&self) -> bool {
        self.generator.is_configured()
    }

    pub fn engine(&self) -> &str {
        self.generator.engine()
    }

    /// Validate a raw request and resolve it into upstream parameters
    pub fn prepare(request: &GenerateImageRequest) -> Result<GenerationParams, AppError> {
        request.validate().map_err(|e| {
            warn!(error = %e, "Validation failed");
            AppError::Validation(ValidationError::Multiple(e.to_string()))
        })?;

        if request.prompt.trim().is_empty() {
            return Err(AppError::Validation(ValidationError::InvalidField {
                field: "prompt".to_string(),
                message: "Prompt is required".to_string(),
            }));
        }

        Ok(GenerationParams::from_request(request))
    }

    #[instrument(skip(self, request), fields(prompt_len = request.prompt.len()))]
    pub async fn generate_image(
        &self,
        request: &GenerateImageRequest,
    ) -> Result<GenerateImageResponse, AppError> {
        let params = Self::prepare(request)?;
        let request_id = Uuid::new_v4().to_string();

        info!(
            request_id = %request_id,
            style = %params.style,
            width = params.width,
            height = params.height,
            samples = params.samples,
            "Generating image"
        );

        let images = self.generator.generate(&params).await?;

        Ok(GenerateImageResponse {
            success: true,
            images: images.into_iter().map(|img| img.base64).collect(),
            metadata: GenerationMetadata {
                request_id,
                prompt: params.prompt,
                style: params.style.as_str().to_string(),
                width: params.width,
                height: params.height,
                samples: params.samples,
                engine: self.generator.engine().to_string(),
                generated_at: Utc::now(),
            },
        })
    }
}

#[async_trait]
impl GenerationBackend for GenerationService {
    async fn generate(
        &self,
        request: &GenerateImageRequest,
    ) -> Result<GenerateImageResponse, AppError> {
        self.generate_image(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ImageStyle, MAX_DIMENSION, MIN_DIMENSION};
    use crate::test_utils::MockImageGenerator;

    #[test]
    fn test_prepare_rejects_blank_prompt() {
        let err = GenerationService::prepare(&GenerateImageRequest::new("   ")).unwrap_err();
        assert!(matches!(
            err,
            AppError::Validation(ValidationError::InvalidField { ref field, .. }) if field == "prompt"
        ));
    }

    #[test]
    fn test_prepare_rejects_empty_and_oversized_prompt() {
        assert!(matches!(
            GenerationService::prepare(&GenerateImageRequest::new("")),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            GenerationService::prepare(&GenerateImageRequest::new("x".repeat(2001))),
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_generate_passes_normalized_params() {
        let generator = Arc::new(MockImageGenerator::new());
        let service = GenerationService::new(generator.clone());

        let request = GenerateImageRequest {
            prompt: "  a quiet harbor  ".to_string(),
            style: Some("not-a-style".to_string()),
            width: Some(99),
            height: Some(5000),
            samples: Some(9),
        };
        let response = service.generate_image(&request).await.unwrap();

        let calls = generator.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].prompt, "a quiet harbor");
        assert_eq!(calls[0].style, ImageStyle::Photographic);
        assert_eq!(calls[0].width, MIN_DIMENSION);
        assert_eq!(calls[0].height, MAX_DIMENSION);
        assert_eq!(calls[0].samples, 4);

        assert!(response.success);
        assert_eq!(response.metadata.prompt, "a quiet harbor");
        assert_eq!(response.metadata.engine, "mock-engine");
        assert!(Uuid::parse_str(&response.metadata.request_id).is_ok());
    }

    #[tokio::test]
    async fn test_generate_does_not_call_upstream_on_invalid_request() {
        let generator = Arc::new(MockImageGenerator::new());
        let service = GenerationService::new(generator.clone());

        assert!(service.generate_image(&GenerateImageRequest::new("")).await.is_err());
        assert!(generator.calls().is_empty());
    }

    #[tokio::test]
    async fn test_generate_propagates_upstream_failure() {
        let generator = Arc::new(MockImageGenerator::failing("engine overloaded"));
        let service = GenerationService::new(generator);

        let err = service
            .generate_image(&GenerateImageRequest::new("a cat"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("engine overloaded"));
    }
}
