//! Domain layer containing core business types, traits, and error definitions.

pub mod error;
pub mod traits;
pub mod types;

pub use error::{
    AppError, BlockchainError, ConfigError, ExternalServiceError, ValidationError,
};
pub use traits::{
    EndpointCache, EndpointProbe, GenerationBackend, ImageGenerator, LedgerClient, WalletSigner,
};
pub use types::{
    BlockhashInfo, ErrorResponse, GenerateImageRequest, GenerateImageResponse, GeneratedImage,
    GenerationMetadata, GenerationParams, HealthResponse, HealthStatus, ImageStyle,
    PaymentFailure, PaymentOutcome, PaymentTerms, RateLimitResponse, RpcEndpoint, SignatureState,
    SolanaNetwork, clamp_dimension, DEFAULT_DIMENSION, LAMPORTS_PER_SOL, MAX_DIMENSION,
    MAX_SAMPLES, MIN_DIMENSION, MIN_SAMPLES,
};
