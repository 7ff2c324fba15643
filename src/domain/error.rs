//! Error types shared by every layer.

use thiserror::Error;

use super::types::PaymentFailure;

/// Top-level application error
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Blockchain error: {0}")]
    Blockchain(#[from] BlockchainError),

    #[error("External service error: {0}")]
    ExternalService(#[from] ExternalServiceError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A payment attempt ended without a confirmed transfer
    #[error("Payment failed: {0}")]
    Payment(PaymentFailure),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Rate limit exceeded")]
    RateLimited,
}

/// Errors raised while talking to a Solana RPC node
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BlockchainError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("RPC error: {0}")]
    RpcError(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Insufficient funds")]
    InsufficientFunds,

    #[error("Blockhash expired: {0}")]
    BlockhashExpired(String),

    #[error("Invalid key or address: {0}")]
    InvalidKey(String),

    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    #[error("Wallet rejected the request: {0}")]
    WalletRejected(String),

    #[error("No healthy RPC endpoint (tried: {0})")]
    NoHealthyEndpoint(String),
}

/// Errors raised by third-party HTTP services (the image API, the PennyPics server)
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExternalServiceError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("API error ({status_code}): {message}")]
    ApiError { status_code: u16, message: String },

    #[error("Failed to parse response: {0}")]
    ParseError(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Invalid field '{field}': {message}")]
    InvalidField { field: String, message: String },

    #[error("{0}")]
    Multiple(String),

    #[error("Request body too large: {0}")]
    PayloadTooLarge(String),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Missing configuration: {0}")]
    Missing(String),

    #[error("Invalid configuration value for {key}: {message}")]
    Invalid { key: String, message: String },
}

impl AppError {
    /// True when the error came from the transport rather than from a node's
    /// answer, so a retry against the same node could succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AppError::Blockchain(
                BlockchainError::Connection(_) | BlockchainError::Timeout(_)
            ) | AppError::ExternalService(
                ExternalServiceError::Network(_) | ExternalServiceError::Timeout(_)
            )
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_nests_messages() {
        let err = AppError::Blockchain(BlockchainError::Timeout("getSlot".to_string()));
        assert_eq!(err.to_string(), "Blockchain error: Request timed out: getSlot");

        let err = AppError::ExternalService(ExternalServiceError::ApiError {
            status_code: 401,
            message: "bad key".to_string(),
        });
        assert_eq!(
            err.to_string(),
            "External service error: API error (401): bad key"
        );
    }

    #[test]
    fn test_transient_classification() {
        assert!(AppError::Blockchain(BlockchainError::Connection("x".into())).is_transient());
        assert!(AppError::ExternalService(ExternalServiceError::Timeout("x".into())).is_transient());
        assert!(!AppError::Blockchain(BlockchainError::InsufficientFunds).is_transient());
        assert!(!AppError::RateLimited.is_transient());
        // A node answering with an error object will answer the same way again
        assert!(!AppError::Blockchain(BlockchainError::RpcError("-32602".into())).is_transient());
    }
}
