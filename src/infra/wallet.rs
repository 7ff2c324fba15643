//! Local wallets implementing [`WalletSigner`].

use async_trait::async_trait;
use ed25519_dalek::SigningKey;
use secrecy::{ExposeSecret, SecretString};
use solana_sdk::{
    pubkey::Pubkey,
    signature::Keypair,
    signer::Signer,
    transaction::Transaction,
};
use tracing::{debug, instrument};

use crate::domain::{AppError, BlockchainError, WalletSigner};

/// Parse a base58-encoded private key into a SigningKey
pub fn signing_key_from_base58(secret: &SecretString) -> Result<SigningKey, AppError> {
    let key_bytes = bs58::decode(secret.expose_secret())
        .into_vec()
        .map_err(|e| AppError::Blockchain(BlockchainError::InvalidKey(e.to_string())))?;

    let invalid = |message: String| AppError::Blockchain(BlockchainError::InvalidKey(message));

    // Solana CLI keypairs are 64 bytes (secret || public); the public half must match
    match key_bytes.len() {
        64 => {
            let keypair: [u8; 64] = key_bytes
                .try_into()
                .map_err(|_| invalid("Invalid keypair format".to_string()))?;
            SigningKey::from_keypair_bytes(&keypair).map_err(|e| {
                invalid(format!("Public key does not match secret key: {}", e))
            })
        }
        32 => {
            let seed: [u8; 32] = key_bytes
                .try_into()
                .map_err(|_| invalid("Invalid seed format".to_string()))?;
            Ok(SigningKey::from_bytes(&seed))
        }
        other => Err(invalid(format!(
            "Key must be 32 or 64 bytes, got {}",
            other
        ))),
    }
}

/// Wallet backed by a keypair held in process memory
pub struct KeypairWallet {
    keypair: Keypair,
}

impl KeypairWallet {
    pub fn from_signing_key(signing_key: &SigningKey) -> Result<Self, AppError> {
        let keypair_bytes = signing_key.to_keypair_bytes();
        let keypair = Keypair::try_from(keypair_bytes.as_slice()).map_err(|e| {
            AppError::Blockchain(BlockchainError::InvalidKey(format!(
                "Failed to create keypair: {}",
                e
            )))
        })?;
        Ok(Self { keypair })
    }

    pub fn from_base58(secret: &SecretString) -> Result<Self, AppError> {
        Self::from_signing_key(&signing_key_from_base58(secret)?)
    }

    #[must_use]
    pub fn from_keypair(keypair: Keypair) -> Self {
        Self { keypair }
    }
}

#[async_trait]
impl WalletSigner for KeypairWallet {
    fn public_key(&self) -> Option<Pubkey> {
        Some(self.keypair.pubkey())
    }

    #[instrument(skip(self, transaction), fields(wallet = %self.keypair.pubkey()))]
    async fn sign_transaction(&self, mut transaction: Transaction) -> Result<Transaction, AppError> {
        let blockhash = transaction.message.recent_blockhash;
        transaction
            .try_sign(&[&self.keypair], blockhash)
            .map_err(|e| AppError::Blockchain(BlockchainError::WalletRejected(e.to_string())))?;
        debug!("Transaction signed");
        Ok(transaction)
    }
}

/// Stand-in used when no key is configured; never signs
#[derive(Debug, Default, Clone, Copy)]
pub struct DisconnectedWallet;

#[async_trait]
impl WalletSigner for DisconnectedWallet {
    fn public_key(&self) -> Option<Pubkey> {
        None
    }

    async fn sign_transaction(&self, _transaction: Transaction) -> Result<Transaction, AppError> {
        Err(AppError::Blockchain(BlockchainError::WalletRejected(
            "No wallet connected".to_string(),
        )))
    }
}
