//! Domain traits defining contracts for external systems.

use async_trait::async_trait;
use solana_sdk::{pubkey::Pubkey, transaction::Transaction};

use super::error::AppError;
use super::types::{
    BlockhashInfo, GenerateImageRequest, GenerateImageResponse, GeneratedImage, GenerationParams,
    SignatureState,
};

/// Read/submit access to a Solana cluster through one RPC endpoint
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Check RPC connectivity
    async fn health_check(&self) -> Result<(), AppError>;

    /// Balance of an account in lamports
    async fn get_balance(&self, pubkey: &Pubkey) -> Result<u64, AppError>;

    /// Latest blockhash for transaction construction
    async fn get_latest_blockhash(&self) -> Result<BlockhashInfo, AppError>;

    /// Current block height
    async fn get_block_height(&self) -> Result<u64, AppError>;

    /// Submit a fully signed transaction, returning its base58 signature
    async fn send_transaction(&self, transaction: &Transaction) -> Result<String, AppError>;

    /// Status of a signature; `None` while the cluster has not seen it
    async fn get_signature_status(&self, signature: &str)
    -> Result<Option<SignatureState>, AppError>;

    /// URL of the node this client talks to
    fn endpoint_url(&self) -> &str;
}

/// Liveness probe for a candidate RPC URL
#[async_trait]
pub trait EndpointProbe: Send + Sync {
    async fn probe(&self, url: &str) -> Result<(), AppError>;
}

/// Remembers the last RPC URL that answered a probe
pub trait EndpointCache: Send + Sync {
    fn load(&self) -> Option<String>;

    fn store(&self, url: &str);
}

/// Signing capability of a user's wallet
#[async_trait]
pub trait WalletSigner: Send + Sync {
    /// Public key of the connected account, `None` when no wallet is connected
    fn public_key(&self) -> Option<Pubkey>;

    /// Sign a transaction whose recent blockhash is already set
    async fn sign_transaction(&self, transaction: Transaction) -> Result<Transaction, AppError>;
}

/// Upstream text-to-image API
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate(&self, params: &GenerationParams) -> Result<Vec<GeneratedImage>, AppError>;

    /// Model or engine identifier reported in response metadata
    fn engine(&self) -> &str;

    /// Whether the generator has the credentials it needs
    fn is_configured(&self) -> bool {
        true
    }
}

/// Anything that turns a raw generation request into images:
/// the in-process service on the server, or the HTTP proxy client in the CLI.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    async fn generate(
        &self,
        request: &GenerateImageRequest,
    ) -> Result<GenerateImageResponse, AppError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MinimalGenerator;

    #[async_trait]
    impl ImageGenerator for MinimalGenerator {
        async fn generate(
            &self,
            _params: &GenerationParams,
        ) -> Result<Vec<GeneratedImage>, AppError> {
            Ok(vec![])
        }

        fn engine(&self) -> &str {
            "minimal"
        }
    }

    #[test]
    fn test_image_generator_configured_by_default() {
        assert!(MinimalGenerator.is_configured());
    }
}
