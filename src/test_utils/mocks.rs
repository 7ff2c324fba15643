//! Mock implementations for testing.

use async_trait::async_trait;
use chrono::Utc;
use solana_sdk::{hash::Hash, pubkey::Pubkey, signature::Keypair, transaction::Transaction};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::domain::{
    AppError, BlockchainError, BlockhashInfo, ExternalServiceError, GenerateImageRequest,
    GenerateImageResponse, GeneratedImage, GenerationBackend, GenerationMetadata,
    GenerationParams, ImageGenerator, LedgerClient, SignatureState, WalletSigner,
};
use crate::infra::KeypairWallet;

/// Configuration for mock behavior
#[derive(Debug, Clone, Default)]
pub struct MockConfig {
    pub should_fail: bool,
    pub error_message: Option<String>,
}

impl MockConfig {
    #[must_use]
    pub fn success() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            should_fail: true,
            error_message: Some(message.into()),
        }
    }

    fn message(&self) -> String {
        self.error_message
            .clone()
            .unwrap_or_else(|| "Mock error".to_string())
    }
}

// ============================================================================
// IMAGE GENERATOR
// ============================================================================

/// Mock image generator that records every call
pub struct MockImageGenerator {
    config: MockConfig,
    images: Vec<GeneratedImage>,
    calls: Mutex<Vec<GenerationParams>>,
    configured: AtomicBool,
}

impl MockImageGenerator {
    #[must_use]
    pub fn new() -> Self {
        Self::with_images(vec![GeneratedImage {
            base64: "bW9jay1pbWFnZQ==".to_string(),
            seed: Some(42),
            finish_reason: Some("SUCCESS".to_string()),
        }])
    }

    #[must_use]
    pub fn with_images(images: Vec<GeneratedImage>) -> Self {
        Self {
            config: MockConfig::success(),
            images,
            calls: Mutex::new(Vec::new()),
            configured: AtomicBool::new(true),
        }
    }

    #[must_use]
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            config: MockConfig::failure(message),
            ..Self::new()
        }
    }

    pub fn set_configured(&self, configured: bool) {
        self.configured.store(configured, Ordering::Relaxed);
    }

    /// Parameters received so far (for testing)
    pub fn calls(&self) -> Vec<GenerationParams> {
        self.calls.lock().unwrap().clone()
    }
}

impl Default for MockImageGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ImageGenerator for MockImageGenerator {
    async fn generate(&self, params: &GenerationParams) -> Result<Vec<GeneratedImage>, AppError> {
        self.calls.lock().unwrap().push(params.clone());
        if self.config.should_fail {
            return Err(AppError::ExternalService(ExternalServiceError::ApiError {
                status_code: 500,
                message: self.config.message(),
            }));
        }
        Ok(self.images.clone())
    }

    fn engine(&self) -> &str {
        "mock-engine"
    }

    fn is_configured(&self) -> bool {
        self.configured.load(Ordering::Relaxed)
    }
}

// ============================================================================
// LEDGER
// ============================================================================

/// Scriptable ledger. Defaults: 1 SOL balance, blockhash valid until
/// height 1000, current height 10, submitted signatures confirm immediately.
pub struct MockLedgerClient {
    balance: u64,
    block_height: u64,
    blockhash_failures: AtomicUsize,
    blockhash_calls: AtomicUsize,
    send_error: Option<BlockchainError>,
    signature_state: Option<SignatureState>,
    sent: Mutex<Vec<Transaction>>,
    is_healthy: AtomicBool,
}

impl MockLedgerClient {
    #[must_use]
    pub fn new() -> Self {
        Self {
            balance: 1_000_000_000,
            block_height: 10,
            blockhash_failures: AtomicUsize::new(0),
            blockhash_calls: AtomicUsize::new(0),
            send_error: None,
            signature_state: Some(SignatureState::Confirmed),
            sent: Mutex::new(Vec::new()),
            is_healthy: AtomicBool::new(true),
        }
    }

    #[must_use]
    pub fn with_balance(mut self, balance: u64) -> Self {
        self.balance = balance;
        self
    }

    #[must_use]
    pub fn with_block_height(mut self, height: u64) -> Self {
        self.block_height = height;
        self
    }

    /// Fail the next `count` blockhash requests with a timeout
    #[must_use]
    pub fn with_blockhash_failures(self, count: usize) -> Self {
        self.blockhash_failures.store(count, Ordering::Relaxed);
        self
    }

    #[must_use]
    pub fn with_send_error(mut self, error: BlockchainError) -> Self {
        self.send_error = Some(error);
        self
    }

    #[must_use]
    pub fn with_signature_state(mut self, state: Option<SignatureState>) -> Self {
        self.signature_state = state;
        self
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.is_healthy.store(healthy, Ordering::Relaxed);
    }

    /// Number of transactions submitted (including rejected ones)
    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn sent_transactions(&self) -> Vec<Transaction> {
        self.sent.lock().unwrap().clone()
    }

    pub fn blockhash_calls(&self) -> usize {
        self.blockhash_calls.load(Ordering::Relaxed)
    }
}

impl Default for MockLedgerClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerClient for MockLedgerClient {
    async fn health_check(&self) -> Result<(), AppError> {
        if !self.is_healthy.load(Ordering::Relaxed) {
            return Err(AppError::Blockchain(BlockchainError::Connection(
                "Unhealthy".to_string(),
            )));
        }
        Ok(())
    }

    async fn get_balance(&self, _pubkey: &Pubkey) -> Result<u64, AppError> {
        Ok(self.balance)
    }

    async fn get_latest_blockhash(&self) -> Result<BlockhashInfo, AppError> {
        self.blockhash_calls.fetch_add(1, Ordering::Relaxed);
        let remaining = self.blockhash_failures.load(Ordering::Relaxed);
        if remaining > 0 {
            self.blockhash_failures.store(remaining - 1, Ordering::Relaxed);
            return Err(AppError::Blockchain(BlockchainError::Timeout(
                "Mock blockhash timeout".to_string(),
            )));
        }
        Ok(BlockhashInfo {
            blockhash: Hash::new_unique(),
            last_valid_block_height: 1_000,
        })
    }

    async fn get_block_height(&self) -> Result<u64, AppError> {
        Ok(self.block_height)
    }

    async fn send_transaction(&self, transaction: &Transaction) -> Result<String, AppError> {
        self.sent.lock().unwrap().push(transaction.clone());
        if let Some(err) = &self.send_error {
            return Err(AppError::Blockchain(err.clone()));
        }
        Ok(transaction.signatures[0].to_string())
    }

    async fn get_signature_status(
        &self,
        _signature: &str,
    ) -> Result<Option<SignatureState>, AppError> {
        Ok(self.signature_state.clone())
    }

    fn endpoint_url(&self) -> &str {
        "mock://ledger"
    }
}

// ============================================================================
// WALLET
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WalletBehavior {
    Sign,
    Disconnected,
    Reject,
    InsufficientFunds,
}

/// Mock wallet that signs with a fresh keypair or fails on demand
pub struct MockWallet {
    inner: KeypairWallet,
    behavior: WalletBehavior,
    sign_requests: AtomicUsize,
}

impl MockWallet {
    fn with_behavior(behavior: WalletBehavior) -> Self {
        Self {
            inner: KeypairWallet::from_keypair(Keypair::new()),
            behavior,
            sign_requests: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn new() -> Self {
        Self::with_behavior(WalletBehavior::Sign)
    }

    #[must_use]
    pub fn disconnected() -> Self {
        Self::with_behavior(WalletBehavior::Disconnected)
    }

    /// Wallet whose user declines every signature request
    #[must_use]
    pub fn rejecting() -> Self {
        Self::with_behavior(WalletBehavior::Reject)
    }

    /// Wallet that refuses to sign because the account cannot cover the transfer
    #[must_use]
    pub fn insufficient_funds() -> Self {
        Self::with_behavior(WalletBehavior::InsufficientFunds)
    }

    pub fn sign_requests(&self) -> usize {
        self.sign_requests.load(Ordering::Relaxed)
    }
}

impl Default for MockWallet {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WalletSigner for MockWallet {
    fn public_key(&self) -> Option<Pubkey> {
        match self.behavior {
            WalletBehavior::Disconnected => None,
            _ => self.inner.public_key(),
        }
    }

    async fn sign_transaction(&self, transaction: Transaction) -> Result<Transaction, AppError> {
        self.sign_requests.fetch_add(1, Ordering::Relaxed);
        match self.behavior {
            WalletBehavior::Sign => self.inner.sign_transaction(transaction).await,
            WalletBehavior::Disconnected => Err(AppError::Blockchain(
                BlockchainError::WalletRejected("No wallet connected".to_string()),
            )),
            WalletBehavior::Reject => Err(AppError::Blockchain(BlockchainError::WalletRejected(
                "User rejected the request".to_string(),
            ))),
            WalletBehavior::InsufficientFunds => {
                Err(AppError::Blockchain(BlockchainError::InsufficientFunds))
            }
        }
    }
}

// ============================================================================
// GENERATION BACKEND
// ============================================================================

/// Mock generation backend that counts calls
pub struct MockGenerationBackend {
    config: MockConfig,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl MockGenerationBackend {
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: MockConfig::success(),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            config: MockConfig::failure(message),
            ..Self::new()
        }
    }

    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

impl Default for MockGenerationBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GenerationBackend for MockGenerationBackend {
    async fn generate(
        &self,
        request: &GenerateImageRequest,
    ) -> Result<GenerateImageResponse, AppError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.config.should_fail {
            return Err(AppError::ExternalService(ExternalServiceError::ApiError {
                status_code: 500,
                message: self.config.message(),
            }));
        }

        let params = GenerationParams::from_request(request);
        Ok(GenerateImageResponse {
            success: true,
            images: vec!["bW9jay1pbWFnZQ==".to_string(); params.samples as usize],
            metadata: GenerationMetadata {
                request_id: uuid::Uuid::new_v4().to_string(),
                prompt: params.prompt,
                style: params.style.as_str().to_string(),
                width: params.width,
                height: params.height,
                samples: params.samples,
                engine: "mock-engine".to_string(),
                generated_at: Utc::now(),
            },
        })
    }
}
