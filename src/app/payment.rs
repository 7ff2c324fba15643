//! Native SOL payment: one transfer, signed by the user's wallet, submitted
//! once and polled until confirmed.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use solana_sdk::{message::Message, pubkey::Pubkey, transaction::Transaction};
use solana_system_interface::instruction as system_instruction;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::domain::{
    AppError, BlockchainError, BlockhashInfo, ConfigError, LedgerClient, PaymentFailure,
    PaymentOutcome, PaymentTerms, SignatureState, WalletSigner,
};

/// Lamports kept aside for the transaction fee when checking the balance
pub const FEE_RESERVE_LAMPORTS: u64 = 5_000;

/// Default price of one generation (0.001 SOL)
pub const DEFAULT_PAYMENT_LAMPORTS: u64 = 1_000_000;

#[derive(Debug, Clone)]
pub struct PaymentConfig {
    pub recipient: Pubkey,
    pub amount_lamports: u64,
    /// Skip the pre-flight balance check (development only)
    pub skip_balance_check: bool,
    pub blockhash_retries: u32,
    pub blockhash_retry_delay: Duration,
    pub poll_interval: Duration,
    pub confirmation_timeout: Duration,
}

impl PaymentConfig {
    #[must_use]
    pub fn new(recipient: Pubkey, amount_lamports: u64) -> Self {
        Self {
            recipient,
            amount_lamports,
            skip_balance_check: false,
            blockhash_retries: 3,
            blockhash_retry_delay: Duration::from_secs(1),
            poll_interval: Duration::from_secs(1),
            confirmation_timeout: Duration::from_secs(60),
        }
    }

    /// Build from terms advertised by a server
    pub fn from_terms(terms: &PaymentTerms) -> Result<Self, AppError> {
        let recipient = parse_recipient(&terms.recipient)?;
        Ok(Self::new(recipient, terms.amount_lamports))
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, AppError> {
        use std::env;

        let recipient = env::var("PAYMENT_RECIPIENT")
            .ok()
            .filter(|r| !r.is_empty())
            .ok_or_else(|| ConfigError::Missing("PAYMENT_RECIPIENT not set".to_string()))?;
        let recipient = parse_recipient(&recipient)?;

        let amount_lamports = match env::var("PAYMENT_AMOUNT_LAMPORTS") {
            Ok(raw) => raw.parse::<u64>().map_err(|e| ConfigError::Invalid {
                key: "PAYMENT_AMOUNT_LAMPORTS".to_string(),
                message: e.to_string(),
            })?,
            Err(_) => DEFAULT_PAYMENT_LAMPORTS,
        };
        if amount_lamports == 0 {
            return Err(ConfigError::Invalid {
                key: "PAYMENT_AMOUNT_LAMPORTS".to_string(),
                message: "must be greater than zero".to_string(),
            }
            .into());
        }

        let skip_balance_check = env::var("SKIP_BALANCE_CHECK")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        Ok(Self {
            skip_balance_check,
            ..Self::new(recipient, amount_lamports)
        })
    }

    /// Minimum balance a payer needs: the price plus the fee reserve
    pub fn required_balance(&self) -> u64 {
        self.amount_lamports.saturating_add(FEE_RESERVE_LAMPORTS)
    }
}

fn parse_recipient(raw: &str) -> Result<Pubkey, AppError> {
    Pubkey::from_str(raw).map_err(|e| {
        ConfigError::Invalid {
            key: "PAYMENT_RECIPIENT".to_string(),
            message: e.to_string(),
        }
        .into()
    })
}

pub struct PaymentService {
    ledger: Arc<dyn LedgerClient>,
    config: PaymentConfig,
}

impl PaymentService {
    #[must_use]
    pub fn new(ledger: Arc<dyn LedgerClient>, config: PaymentConfig) -> Self {
        Self { ledger, config }
    }

    pub fn config(&self) -> &PaymentConfig {
        &self.config
    }

    /// Pay the configured amount from `wallet`. Never resubmits a signed
    /// transaction: a lost confirmation ends in `Expired`, not a retry.
    #[instrument(skip(self, wallet), fields(recipient = %self.config.recipient, lamports = self.config.amount_lamports, rpc = %self.ledger.endpoint_url()))]
    pub async fn pay(&self, wallet: &dyn WalletSigner) -> PaymentOutcome {
        match self.try_pay(wallet).await {
            Ok(signature) => {
                info!(signature = %signature, "Payment confirmed");
                PaymentOutcome::Success { signature }
            }
            Err(reason) => {
                warn!(reason = %reason, "Payment failed");
                PaymentOutcome::failure(reason)
            }
        }
    }

    async fn try_pay(&self, wallet: &dyn WalletSigner) -> Result<String, PaymentFailure> {
        let payer = wallet
            .public_key()
            .ok_or(PaymentFailure::WalletNotConnected)?;

        self.check_balance(&payer).await?;

        let blockhash = self.latest_blockhash().await?;

        let instruction = system_instruction::transfer(
            &payer,
            &self.config.recipient,
            self.config.amount_lamports,
        );
        let mut transaction = Transaction::new_unsigned(Message::new(&[instruction], Some(&payer)));
        transaction.message.recent_blockhash = blockhash.blockhash;

        let signed = wallet
            .sign_transaction(transaction)
            .await
            .map_err(|e| self.classify(e))?;

        let signature = self
            .ledger
            .send_transaction(&signed)
            .await
            .map_err(|e| self.classify(e))?;
        info!(signature = %signature, "Payment submitted");

        self.await_confirmation(&signature, &blockhash).await?;
        Ok(signature)
    }

    async fn check_balance(&self, payer: &Pubkey) -> Result<(), PaymentFailure> {
        if self.config.skip_balance_check {
            warn!(payer = %payer, "Balance check skipped (SKIP_BALANCE_CHECK is set)");
            return Ok(());
        }

        let balance = self
            .ledger
            .get_balance(payer)
            .await
            .map_err(|e| PaymentFailure::NetworkUnavailable(e.to_string()))?;
        let required = self.config.required_balance();
        debug!(balance, required, "Balance checked");

        if balance < required {
            return Err(PaymentFailure::InsufficientFunds {
                required,
                available: Some(balance),
            });
        }
        Ok(())
    }

    /// Fetch a blockhash with a bounded number of attempts and a fixed delay
    async fn latest_blockhash(&self) -> Result<BlockhashInfo, PaymentFailure> {
        let attempts = self.config.blockhash_retries.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match self.ledger.get_latest_blockhash().await {
                Ok(info) => return Ok(info),
                Err(e) => {
                    warn!(attempt, max = attempts, error = %e, "Failed to fetch blockhash");
                    last_error = e.to_string();
                    if attempt < attempts {
                        tokio::time::sleep(self.config.blockhash_retry_delay).await;
                    }
                }
            }
        }

        Err(PaymentFailure::NetworkUnavailable(format!(
            "could not fetch a recent blockhash after {} attempts: {}",
            attempts, last_error
        )))
    }

    async fn await_confirmation(
        &self,
        signature: &str,
        blockhash: &BlockhashInfo,
    ) -> Result<(), PaymentFailure> {
        let deadline = Instant::now() + self.config.confirmation_timeout;

        loop {
            match self.ledger.get_signature_status(signature).await {
                Ok(Some(state)) if state.is_confirmed() => return Ok(()),
                Ok(Some(SignatureState::Failed(err))) => {
                    return Err(PaymentFailure::TransactionFailed(err));
                }
                Ok(_) => debug!(signature, "Awaiting confirmation"),
                Err(e) => warn!(signature, error = %e, "Signature status poll failed"),
            }

            match self.ledger.get_block_height().await {
                Ok(height) if height > blockhash.last_valid_block_height => {
                    return Err(PaymentFailure::Expired(format!(
                        "block height {} passed last valid height {}",
                        height, blockhash.last_valid_block_height
                    )));
                }
                Ok(_) => {}
                Err(e) => debug!(error = %e, "Block height poll failed"),
            }

            if Instant::now() >= deadline {
                return Err(PaymentFailure::Expired(format!(
                    "not confirmed within {}s",
                    self.config.confirmation_timeout.as_secs()
                )));
            }

            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    /// Map a wallet or RPC error onto the user-facing failure taxonomy
    fn classify(&self, error: AppError) -> PaymentFailure {
        match error {
            AppError::Payment(reason) => reason,
            AppError::Blockchain(BlockchainError::InsufficientFunds) => {
                PaymentFailure::InsufficientFunds {
                    required: self.config.required_balance(),
                    available: None,
                }
            }
            AppError::Blockchain(BlockchainError::WalletRejected(_)) => PaymentFailure::UserRejected,
            AppError::Blockchain(BlockchainError::BlockhashExpired(msg)) => {
                PaymentFailure::Expired(msg)
            }
            AppError::Blockchain(BlockchainError::TransactionFailed(msg)) => {
                PaymentFailure::TransactionFailed(msg)
            }
            e if e.is_transient() => PaymentFailure::NetworkUnavailable(e.to_string()),
            e => PaymentFailure::TransactionFailed(e.to_string()),
        }
    }
}
