//! Text-to-image API clients.

pub mod stability;

pub use stability::{
    DEFAULT_ENGINE, DEFAULT_IMAGE_API_URL, NEGATIVE_PROMPT, StabilityConfig, StabilityImageClient,
};
