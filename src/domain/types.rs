//! Domain types with validation support.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use solana_sdk::hash::Hash;
use utoipa::ToSchema;
use validator::Validate;

/// Smallest accepted image edge, in pixels
pub const MIN_DIMENSION: u32 = 512;
/// Largest accepted image edge, in pixels
pub const MAX_DIMENSION: u32 = 1536;
/// Edges are multiples of this many pixels
pub const DIMENSION_STEP: u32 = 64;
pub const DEFAULT_DIMENSION: u32 = 1024;
pub const MIN_SAMPLES: u32 = 1;
pub const MAX_SAMPLES: u32 = 4;

pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

// ============================================================================
// RPC ENDPOINTS
// ============================================================================

/// A candidate Solana RPC node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RpcEndpoint {
    #[schema(example = "solana-devnet")]
    pub id: String,
    #[schema(example = "Solana Devnet")]
    pub name: String,
    #[schema(example = "https://api.devnet.solana.com")]
    pub url: String,
}

impl RpcEndpoint {
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            url: url.into(),
        }
    }

    /// Endpoint record for a user-supplied URL that is not in any built-in list
    #[must_use]
    pub fn custom(url: impl Into<String>) -> Self {
        Self::new("custom", "Custom RPC", url)
    }
}

/// Solana cluster the payment is made on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum SolanaNetwork {
    #[default]
    Devnet,
    Testnet,
    MainnetBeta,
}

impl SolanaNetwork {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Devnet => "devnet",
            Self::Testnet => "testnet",
            Self::MainnetBeta => "mainnet-beta",
        }
    }

    /// Built-in candidate endpoints, in preference order
    #[must_use]
    pub fn endpoints(&self) -> Vec<RpcEndpoint> {
        match self {
            Self::Devnet => vec![
                RpcEndpoint::new(
                    "solana-devnet",
                    "Solana Devnet",
                    "https://api.devnet.solana.com",
                ),
                RpcEndpoint::new(
                    "ankr-devnet",
                    "Ankr Devnet",
                    "https://rpc.ankr.com/solana_devnet",
                ),
            ],
            Self::Testnet => vec![RpcEndpoint::new(
                "solana-testnet",
                "Solana Testnet",
                "https://api.testnet.solana.com",
            )],
            Self::MainnetBeta => vec![
                RpcEndpoint::new(
                    "solana-mainnet",
                    "Solana Mainnet",
                    "https://api.mainnet-beta.solana.com",
                ),
                RpcEndpoint::new("ankr", "Ankr", "https://rpc.ankr.com/solana"),
                RpcEndpoint::new(
                    "publicnode",
                    "PublicNode",
                    "https://solana-rpc.publicnode.com",
                ),
            ],
        }
    }

    /// Candidate list with an optional override URL tried first
    #[must_use]
    pub fn candidates(&self, override_url: Option<&str>) -> Vec<RpcEndpoint> {
        let mut endpoints = self.endpoints();
        if let Some(url) = override_url.map(str::trim).filter(|u| !u.is_empty()) {
            endpoints.retain(|e| e.url != url);
            let known = self.endpoints().into_iter().find(|e| e.url == url);
            endpoints.insert(0, known.unwrap_or_else(|| RpcEndpoint::custom(url)));
        }
        endpoints
    }

    /// Block explorer link for a transaction signature
    #[must_use]
    pub fn explorer_url(&self, signature: &str) -> String {
        match self {
            Self::MainnetBeta => format!("https://explorer.solana.com/tx/{}", signature),
            other => format!(
                "https://explorer.solana.com/tx/{}?cluster={}",
                signature,
                other.as_str()
            ),
        }
    }
}

impl std::str::FromStr for SolanaNetwork {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "devnet" => Ok(Self::Devnet),
            "testnet" => Ok(Self::Testnet),
            "mainnet" | "mainnet-beta" => Ok(Self::MainnetBeta),
            other => Err(format!("Invalid Solana network: {}", other)),
        }
    }
}

impl std::fmt::Display for SolanaNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// IMAGE GENERATION
// ============================================================================

/// Style presets accepted by the image API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum ImageStyle {
    #[serde(rename = "3d-model")]
    ThreeDModel,
    AnalogFilm,
    Anime,
    Cinematic,
    ComicBook,
    DigitalArt,
    Enhance,
    FantasyArt,
    Isometric,
    LineArt,
    LowPoly,
    ModelingCompound,
    NeonPunk,
    Origami,
    #[default]
    Photographic,
    PixelArt,
    TileTexture,
}

impl ImageStyle {
    pub const ALL: [ImageStyle; 17] = [
        Self::ThreeDModel,
        Self::AnalogFilm,
        Self::Anime,
        Self::Cinematic,
        Self::ComicBook,
        Self::DigitalArt,
        Self::Enhance,
        Self::FantasyArt,
        Self::Isometric,
        Self::LineArt,
        Self::LowPoly,
        Self::ModelingCompound,
        Self::NeonPunk,
        Self::Origami,
        Self::Photographic,
        Self::PixelArt,
        Self::TileTexture,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ThreeDModel => "3d-model",
            Self::AnalogFilm => "analog-film",
            Self::Anime => "anime",
            Self::Cinematic => "cinematic",
            Self::ComicBook => "comic-book",
            Self::DigitalArt => "digital-art",
            Self::Enhance => "enhance",
            Self::FantasyArt => "fantasy-art",
            Self::Isometric => "isometric",
            Self::LineArt => "line-art",
            Self::LowPoly => "low-poly",
            Self::ModelingCompound => "modeling-compound",
            Self::NeonPunk => "neon-punk",
            Self::Origami => "origami",
            Self::Photographic => "photographic",
            Self::PixelArt => "pixel-art",
            Self::TileTexture => "tile-texture",
        }
    }

    /// Resolve a user-supplied style, falling back to the default preset
    #[must_use]
    pub fn resolve(style: Option<&str>) -> Self {
        style
            .and_then(|s| s.parse().ok())
            .unwrap_or_default()
    }
}

impl std::str::FromStr for ImageStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|style| style.as_str() == needle)
            .ok_or_else(|| format!("Invalid image style: {}", s))
    }
}

impl std::fmt::Display for ImageStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Body of `POST /api/generate-image`
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
pub struct GenerateImageRequest {
    /// Text description of the image
    #[validate(length(min = 1, max = 2000, message = "Prompt must be between 1 and 2000 characters"))]
    #[schema(example = "a lighthouse on a cliff at sunset")]
    pub prompt: String,
    /// Style preset; unknown values fall back to `photographic`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(example = "digital-art")]
    pub style: Option<String>,
    /// Width in pixels, clamped to 512..=1536
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(example = 1024)]
    pub width: Option<i64>,
    /// Height in pixels, clamped to 512..=1536
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(example = 1024)]
    pub height: Option<i64>,
    /// Number of images, clamped to 1..=4
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(example = 1)]
    pub samples: Option<i64>,
}

impl GenerateImageRequest {
    #[must_use]
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }
}

/// Request parameters after defaults, clamping and style resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationParams {
    pub prompt: String,
    pub style: ImageStyle,
    pub width: u32,
    pub height: u32,
    pub samples: u32,
}

impl GenerationParams {
    #[must_use]
    pub fn from_request(request: &GenerateImageRequest) -> Self {
        Self {
            prompt: request.prompt.trim().to_string(),
            style: ImageStyle::resolve(request.style.as_deref()),
            width: request.width.map_or(DEFAULT_DIMENSION, clamp_dimension),
            height: request.height.map_or(DEFAULT_DIMENSION, clamp_dimension),
            samples: request
                .samples
                .map_or(MIN_SAMPLES, |s| s.clamp(MIN_SAMPLES as i64, MAX_SAMPLES as i64) as u32),
        }
    }
}

/// Clamp an edge length into bounds and snap it down to the 64px grid.
#[must_use]
pub fn clamp_dimension(value: i64) -> u32 {
    let clamped = value.clamp(MIN_DIMENSION as i64, MAX_DIMENSION as i64) as u32;
    clamped - (clamped % DIMENSION_STEP)
}

/// One image as returned by the upstream API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedImage {
    /// Base64-encoded PNG
    pub base64: String,
    pub seed: Option<u64>,
    pub finish_reason: Option<String>,
}

/// Details echoed back alongside the images
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct GenerationMetadata {
    #[schema(example = "550e8400-e29b-41d4-a716-446655440000")]
    pub request_id: String,
    pub prompt: String,
    #[schema(example = "photographic")]
    pub style: String,
    pub width: u32,
    pub height: u32,
    pub samples: u32,
    #[schema(example = "stable-diffusion-v1-6")]
    pub engine: String,
    pub generated_at: DateTime<Utc>,
}

/// Successful response of `POST /api/generate-image`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct GenerateImageResponse {
    pub success: bool,
    /// Base64-encoded PNG images
    pub images: Vec<String>,
    pub metadata: GenerationMetadata,
}

// ============================================================================
// PAYMENTS
// ============================================================================

/// What a client must pay before generating, served by `GET /api/payment-terms`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PaymentTerms {
    /// Recipient wallet address (Base58)
    #[schema(example = "DRpbCBMxVnDK7maPM5tGv6MvB3v1sRMC86PZ8okm21hy")]
    pub recipient: String,
    /// Price of one generation in lamports
    #[schema(example = 1_000_000)]
    pub amount_lamports: u64,
    pub network: SolanaNetwork,
    /// RPC endpoint the server found healthy at startup, if any
    #[schema(example = "https://api.devnet.solana.com")]
    pub rpc_url: Option<String>,
}

/// Why a payment did not complete
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PaymentFailure {
    WalletNotConnected,
    InsufficientFunds {
        required: u64,
        available: Option<u64>,
    },
    UserRejected,
    NetworkUnavailable(String),
    Expired(String),
    TransactionFailed(String),
}

impl std::fmt::Display for PaymentFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WalletNotConnected => write!(f, "Wallet not connected"),
            Self::InsufficientFunds {
                required,
                available: Some(available),
            } => write!(
                f,
                "Insufficient funds: need {} lamports, wallet holds {}",
                required, available
            ),
            Self::InsufficientFunds {
                required,
                available: None,
            } => write!(f, "Insufficient funds: need {} lamports", required),
            Self::UserRejected => write!(f, "Transaction was rejected in the wallet"),
            Self::NetworkUnavailable(msg) => write!(f, "Network unavailable: {}", msg),
            Self::Expired(msg) => write!(f, "Transaction expired before confirmation: {}", msg),
            Self::TransactionFailed(msg) => write!(f, "Transaction failed: {}", msg),
        }
    }
}

/// Result of one payment attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PaymentOutcome {
    Success { signature: String },
    Failure { reason: PaymentFailure },
}

impl PaymentOutcome {
    #[must_use]
    pub fn failure(reason: PaymentFailure) -> Self {
        Self::Failure { reason }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// Recent blockhash plus the last block height at which it is still valid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockhashInfo {
    pub blockhash: Hash,
    pub last_valid_block_height: u64,
}

/// Cluster view of a submitted signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureState {
    Processed,
    Confirmed,
    Finalized,
    Failed(String),
}

impl SignatureState {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, Self::Confirmed | Self::Finalized)
    }
}

// ============================================================================
// HTTP ENVELOPES
// ============================================================================

/// Health status enum
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// All systems operational
    Healthy,
    /// Some systems degraded but functional
    Degraded,
    /// Critical systems unavailable
    Unhealthy,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// Overall system status
    pub status: HealthStatus,
    /// Whether the image API is configured
    pub image_api: HealthStatus,
    /// Selected RPC endpoint reachability
    pub blockchain: HealthStatus,
    /// Current server timestamp
    pub timestamp: DateTime<Utc>,
    /// Application version
    #[schema(example = "0.1.0")]
    pub version: String,
}

impl HealthResponse {
    /// Generation is the product; the chain only matters to paying clients,
    /// so an unreachable RPC node degrades rather than fails the service.
    #[must_use]
    pub fn new(image_api: HealthStatus, blockchain: HealthStatus) -> Self {
        let status = match (&image_api, &blockchain) {
            (HealthStatus::Unhealthy, _) => HealthStatus::Unhealthy,
            (HealthStatus::Healthy, HealthStatus::Healthy) => HealthStatus::Healthy,
            _ => HealthStatus::Degraded,
        };
        Self {
            status,
            image_api,
            blockchain,
            timestamp: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Error response structure
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Short, user-facing summary
    #[schema(example = "Image generation failed")]
    pub error: String,
    /// Underlying cause, e.g. the upstream API message
    #[schema(example = "Invalid API key")]
    pub details: Option<String>,
    /// Error type identifier
    #[serde(rename = "type")]
    #[schema(example = "external_service_error")]
    pub error_type: String,
}

/// Rate limit exceeded response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RateLimitResponse {
    pub error: String,
    /// Seconds until rate limit resets
    #[schema(example = 1)]
    pub retry_after: u64,
}
