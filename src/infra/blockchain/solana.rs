//! Solana JSON-RPC client.
//!
//! Requests go through a [`SolanaRpcProvider`] so the retry and decoding
//! logic can be exercised against scripted responses in tests.

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64_STANDARD};
use reqwest::Client;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use solana_commitment_config::CommitmentConfig;
use solana_sdk::{hash::Hash, pubkey::Pubkey, transaction::Transaction};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::domain::{AppError, BlockchainError, BlockhashInfo, LedgerClient, SignatureState};

/// Configuration for the RPC client
#[derive(Debug, Clone)]
pub struct RpcClientConfig {
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl Default for RpcClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_retries: 3,
            retry_delay: Duration::from_millis(500),
        }
    }
}

/// Abstract provider for Solana RPC interactions to enable testing
#[async_trait]
pub trait SolanaRpcProvider: Send + Sync {
    /// Send a JSON-RPC request and return the `result` member
    async fn send_request(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, AppError>;

    fn url(&self) -> &str;
}

/// HTTP-based Solana RPC provider
pub struct HttpSolanaRpcProvider {
    http_client: Client,
    rpc_url: String,
}

impl HttpSolanaRpcProvider {
    pub fn new(rpc_url: &str, timeout: Duration) -> Result<Self, AppError> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Blockchain(BlockchainError::Connection(e.to_string())))?;

        Ok(Self {
            http_client,
            rpc_url: rpc_url.to_string(),
        })
    }

    /// Reuse an existing HTTP client (and its connection pool) for another URL
    pub fn with_client(http_client: Client, rpc_url: &str) -> Self {
        Self {
            http_client,
            rpc_url: rpc_url.to_string(),
        }
    }
}

#[async_trait]
impl SolanaRpcProvider for HttpSolanaRpcProvider {
    async fn send_request(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, AppError> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: 1,
            method: method.to_string(),
            params,
        };

        let response = self
            .http_client
            .post(&self.rpc_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::Blockchain(BlockchainError::Timeout(e.to_string()))
                } else {
                    AppError::Blockchain(BlockchainError::Connection(e.to_string()))
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let message = format!("HTTP {}: {}", status, body);
            // Overloaded or rate-limited nodes are worth another attempt
            if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                return Err(AppError::Blockchain(BlockchainError::Connection(message)));
            }
            return Err(AppError::Blockchain(BlockchainError::RpcError(message)));
        }

        let rpc_response: JsonRpcResponse<serde_json::Value> = response
            .json()
            .await
            .map_err(|e| AppError::Blockchain(BlockchainError::RpcError(e.to_string())))?;

        if let Some(error) = rpc_response.error {
            return Err(map_rpc_error(&error));
        }

        rpc_response.result.ok_or_else(|| {
            AppError::Blockchain(BlockchainError::RpcError("Empty response".to_string()))
        })
    }

    fn url(&self) -> &str {
        &self.rpc_url
    }
}

/// Classify a JSON-RPC error object
fn map_rpc_error(error: &JsonRpcError) -> AppError {
    let lower = error.message.to_lowercase();
    if lower.contains("insufficient") {
        return AppError::Blockchain(BlockchainError::InsufficientFunds);
    }
    if lower.contains("blockhash not found") {
        return AppError::Blockchain(BlockchainError::BlockhashExpired(error.message.clone()));
    }
    // -32002 preflight simulation failure, -32003 signature verification failure
    if matches!(error.code, -32002 | -32003) || lower.contains("simulation failed") {
        return AppError::Blockchain(BlockchainError::TransactionFailed(format!(
            "{}: {}",
            error.code, error.message
        )));
    }
    AppError::Blockchain(BlockchainError::RpcError(format!(
        "{}: {}",
        error.code, error.message
    )))
}

#[derive(Debug, Serialize)]
struct JsonRpcRequest<T: Serialize> {
    jsonrpc: &'static str,
    id: u64,
    method: String,
    params: T,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse<T> {
    result: Option<T>,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

/// `{ context, value }` wrapper used by most read methods
#[derive(Debug, Deserialize)]
struct WithContext<T> {
    value: T,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BlockhashResponse {
    blockhash: String,
    last_valid_block_height: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignatureStatus {
    err: Option<serde_json::Value>,
    confirmation_status: Option<String>,
}

/// Solana RPC ledger client bound to a single endpoint
pub struct SolanaLedgerClient {
    provider: Box<dyn SolanaRpcProvider>,
    config: RpcClientConfig,
}

impl SolanaLedgerClient {
    pub fn new(rpc_url: &str, config: RpcClientConfig) -> Result<Self, AppError> {
        let provider = HttpSolanaRpcProvider::new(rpc_url, config.timeout)?;
        info!(rpc_url = %rpc_url, "Created Solana ledger client");
        Ok(Self {
            provider: Box::new(provider),
            config,
        })
    }

    pub fn with_defaults(rpc_url: &str) -> Result<Self, AppError> {
        Self::new(rpc_url, RpcClientConfig::default())
    }

    /// Create a new client with a specific provider (useful for testing)
    pub fn with_provider(provider: Box<dyn SolanaRpcProvider>, config: RpcClientConfig) -> Self {
        Self { provider, config }
    }

    fn commitment_param() -> serde_json::Value {
        serde_json::json!({ "commitment": CommitmentConfig::confirmed().commitment.to_string() })
    }

    /// Make an RPC call, retrying transient failures
    #[instrument(skip(self, params))]
    async fn rpc_call<P: Serialize + Send + Sync, R: DeserializeOwned + Send>(
        &self,
        method: &str,
        params: P,
    ) -> Result<R, AppError> {
        let params_value = serde_json::to_value(params).map_err(|e| {
            AppError::Blockchain(BlockchainError::RpcError(format!(
                "Serialization error: {}",
                e
            )))
        })?;

        let mut last_error = None;
        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                tokio::time::sleep(self.config.retry_delay).await;
            }
            match self
                .provider
                .send_request(method, params_value.clone())
                .await
            {
                Ok(result_value) => return Self::decode(result_value),
                Err(e) if e.is_transient() => {
                    warn!(attempt = attempt, error = ?e, method = %method, "RPC call failed");
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_error.unwrap_or_else(|| {
            AppError::Blockchain(BlockchainError::RpcError("Unknown error".to_string()))
        }))
    }

    /// Single-shot call for non-idempotent methods
    async fn rpc_call_once<R: DeserializeOwned + Send>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<R, AppError> {
        let result_value = self.provider.send_request(method, params).await?;
        Self::decode(result_value)
    }

    fn decode<R: DeserializeOwned>(value: serde_json::Value) -> Result<R, AppError> {
        serde_json::from_value(value).map_err(|e| {
            AppError::Blockchain(BlockchainError::RpcError(format!(
                "Deserialization error: {}",
                e
            )))
        })
    }
}

#[async_trait]
impl LedgerClient for SolanaLedgerClient {
    #[instrument(skip(self))]
    async fn health_check(&self) -> Result<(), AppError> {
        let _: u64 = self.rpc_call("getSlot", Vec::<()>::new()).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(pubkey = %pubkey))]
    async fn get_balance(&self, pubkey: &Pubkey) -> Result<u64, AppError> {
        let params = serde_json::json!([pubkey.to_string(), Self::commitment_param()]);
        let result: WithContext<u64> = self.rpc_call("getBalance", params).await?;
        Ok(result.value)
    }

    #[instrument(skip(self))]
    async fn get_latest_blockhash(&self) -> Result<BlockhashInfo, AppError> {
        let params = serde_json::json!([Self::commitment_param()]);
        let result: WithContext<BlockhashResponse> =
            self.rpc_call("getLatestBlockhash", params).await?;
        let blockhash = Hash::from_str(&result.value.blockhash).map_err(|e| {
            AppError::Blockchain(BlockchainError::RpcError(format!(
                "Invalid blockhash '{}': {}",
                result.value.blockhash, e
            )))
        })?;
        Ok(BlockhashInfo {
            blockhash,
            last_valid_block_height: result.value.last_valid_block_height,
        })
    }

    #[instrument(skip(self))]
    async fn get_block_height(&self) -> Result<u64, AppError> {
        let params = serde_json::json!([Self::commitment_param()]);
        self.rpc_call("getBlockHeight", params).await
    }

    #[instrument(skip(self, transaction))]
    async fn send_transaction(&self, transaction: &Transaction) -> Result<String, AppError> {
        let wire = bincode::serialize(transaction)
            .map_err(|e| AppError::Serialization(format!("Transaction encoding failed: {}", e)))?;
        let encoded = BASE64_STANDARD.encode(wire);

        let params = serde_json::json!([
            encoded,
            {
                "encoding": "base64",
                "preflightCommitment": CommitmentConfig::confirmed().commitment.to_string(),
            }
        ]);
        let signature: String = self.rpc_call_once("sendTransaction", params).await?;
        info!(signature = %signature, rpc_url = %self.provider.url(), "Transaction submitted");
        Ok(signature)
    }

    #[instrument(skip(self))]
    async fn get_signature_status(
        &self,
        signature: &str,
    ) -> Result<Option<SignatureState>, AppError> {
        let params = serde_json::json!([[signature], {"searchTransactionHistory": false}]);
        let result: WithContext<Vec<Option<SignatureStatus>>> =
            self.rpc_call("getSignatureStatuses", params).await?;

        let Some(Some(status)) = result.value.into_iter().next() else {
            debug!(signature = %signature, "Signature not yet visible");
            return Ok(None);
        };

        if let Some(err) = status.err {
            return Ok(Some(SignatureState::Failed(err.to_string())));
        }

        Ok(Some(match status.confirmation_status.as_deref() {
            Some("finalized") => SignatureState::Finalized,
            Some("confirmed") => SignatureState::Confirmed,
            _ => SignatureState::Processed,
        }))
    }

    fn endpoint_url(&self) -> &str {
        self.provider.url()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::{
        message::Message,
        signature::Keypair,
        signer::Signer,
    };
    use solana_system_interface::instruction as system_instruction;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone)]
    enum MockErrorKind {
        Timeout(String),
        InsufficientFunds,
        Rpc(String),
    }

    /// Scripted provider: pops one response per call, records methods
    struct ScriptedProvider {
        responses: Mutex<VecDeque<Result<serde_json::Value, MockErrorKind>>>,
        calls: Arc<Mutex<Vec<(String, serde_json::Value)>>>,
    }

    impl ScriptedProvider {
        fn with_responses(
            responses: Vec<Result<serde_json::Value, MockErrorKind>>,
        ) -> (Self, Arc<Mutex<Vec<(String, serde_json::Value)>>>) {
            let calls = Arc::new(Mutex::new(Vec::new()));
            (
                Self {
                    responses: Mutex::new(responses.into()),
                    calls: Arc::clone(&calls),
                },
                calls,
            )
        }
    }

    #[async_trait]
    impl SolanaRpcProvider for ScriptedProvider {
        async fn send_request(
            &self,
            method: &str,
            params: serde_json::Value,
        ) -> Result<serde_json::Value, AppError> {
            self.calls
                .lock()
                .unwrap()
                .push((method.to_string(), params));
            match self.responses.lock().unwrap().pop_front() {
                Some(Ok(v)) => Ok(v),
                Some(Err(MockErrorKind::Timeout(m))) => {
                    Err(AppError::Blockchain(BlockchainError::Timeout(m)))
                }
                Some(Err(MockErrorKind::InsufficientFunds)) => {
                    Err(AppError::Blockchain(BlockchainError::InsufficientFunds))
                }
                Some(Err(MockErrorKind::Rpc(m))) => {
                    Err(AppError::Blockchain(BlockchainError::RpcError(m)))
                }
                None => Ok(serde_json::Value::Null),
            }
        }

        fn url(&self) -> &str {
            "mock://rpc"
        }
    }

    fn fast_config(max_retries: u32) -> RpcClientConfig {
        RpcClientConfig {
            max_retries,
            retry_delay: Duration::from_millis(1),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_retry_until_success() {
        let (provider, calls) = ScriptedProvider::with_responses(vec![
            Err(MockErrorKind::Timeout("fail 1".to_string())),
            Err(MockErrorKind::Timeout("fail 2".to_string())),
            Ok(serde_json::json!(999u64)),
        ]);
        let client = SolanaLedgerClient::with_provider(Box::new(provider), fast_config(3));

        assert!(client.health_check().await.is_ok());
        assert_eq!(calls.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_retries_exhausted_returns_last_error() {
        let (provider, calls) = ScriptedProvider::with_responses(vec![
            Err(MockErrorKind::Timeout("a".to_string())),
            Err(MockErrorKind::Timeout("b".to_string())),
        ]);
        let client = SolanaLedgerClient::with_provider(Box::new(provider), fast_config(1));

        let result = client.health_check().await;
        assert!(matches!(
            result,
            Err(AppError::Blockchain(BlockchainError::Timeout(ref m))) if m == "b"
        ));
        assert_eq!(calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_no_retry_on_rpc_error_object() {
        let (provider, calls) = ScriptedProvider::with_responses(vec![
            Err(MockErrorKind::Rpc("-32602: Invalid params".to_string())),
            Ok(serde_json::json!(1u64)),
        ]);
        let client = SolanaLedgerClient::with_provider(Box::new(provider), fast_config(3));

        assert!(matches!(
            client.health_check().await,
            Err(AppError::Blockchain(BlockchainError::RpcError(_)))
        ));
        assert_eq!(calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_no_retry_on_insufficient_funds() {
        let (provider, calls) = ScriptedProvider::with_responses(vec![
            Err(MockErrorKind::InsufficientFunds),
            Ok(serde_json::json!(1u64)),
        ]);
        let client = SolanaLedgerClient::with_provider(Box::new(provider), fast_config(3));

        let result = client.health_check().await;
        assert!(matches!(
            result,
            Err(AppError::Blockchain(BlockchainError::InsufficientFunds))
        ));
        assert_eq!(calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_get_balance_unwraps_context() {
        let (provider, calls) = ScriptedProvider::with_responses(vec![Ok(serde_json::json!({
            "context": {"slot": 1},
            "value": 2_500_000u64
        }))]);
        let client = SolanaLedgerClient::with_provider(Box::new(provider), fast_config(0));
        let pubkey = Pubkey::new_unique();

        assert_eq!(client.get_balance(&pubkey).await.unwrap(), 2_500_000);
        let calls = calls.lock().unwrap();
        assert_eq!(calls[0].0, "getBalance");
        assert_eq!(calls[0].1[0], pubkey.to_string());
        assert_eq!(calls[0].1[1]["commitment"], "confirmed");
    }

    #[tokio::test]
    async fn test_get_latest_blockhash_parses_hash() {
        let hash = Hash::new_unique();
        let (provider, _) = ScriptedProvider::with_responses(vec![Ok(serde_json::json!({
            "context": {"slot": 1},
            "value": {"blockhash": hash.to_string(), "lastValidBlockHeight": 4242u64}
        }))]);
        let client = SolanaLedgerClient::with_provider(Box::new(provider), fast_config(0));

        let info = client.get_latest_blockhash().await.unwrap();
        assert_eq!(info.blockhash, hash);
        assert_eq!(info.last_valid_block_height, 4242);
    }

    #[tokio::test]
    async fn test_get_latest_blockhash_rejects_garbage() {
        let (provider, _) = ScriptedProvider::with_responses(vec![Ok(serde_json::json!({
            "context": {"slot": 1},
            "value": {"blockhash": "not-a-hash!", "lastValidBlockHeight": 1u64}
        }))]);
        let client = SolanaLedgerClient::with_provider(Box::new(provider), fast_config(0));

        assert!(matches!(
            client.get_latest_blockhash().await,
            Err(AppError::Blockchain(BlockchainError::RpcError(_)))
        ));
    }

    #[tokio::test]
    async fn test_send_transaction_is_not_retried() {
        let (provider, calls) = ScriptedProvider::with_responses(vec![
            Err(MockErrorKind::Timeout("slow".to_string())),
            Ok(serde_json::json!("sig")),
        ]);
        let client = SolanaLedgerClient::with_provider(Box::new(provider), fast_config(3));

        let payer = Keypair::new();
        let ix = system_instruction::transfer(&payer.pubkey(), &Pubkey::new_unique(), 10);
        let mut tx = Transaction::new_unsigned(Message::new(&[ix], Some(&payer.pubkey())));
        tx.sign(&[&payer], Hash::new_unique());

        assert!(client.send_transaction(&tx).await.is_err());
        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "sendTransaction");
        assert_eq!(calls[0].1[1]["encoding"], "base64");
        let wire = BASE64_STANDARD
            .decode(calls[0].1[0].as_str().unwrap())
            .unwrap();
        let decoded: Transaction = bincode::deserialize(&wire).unwrap();
        assert_eq!(decoded.signatures, tx.signatures);
    }

    #[tokio::test]
    async fn test_signature_status_mapping() {
        let (provider, _) = ScriptedProvider::with_responses(vec![
            Ok(serde_json::json!({"context": {"slot": 1}, "value": [null]})),
            Ok(serde_json::json!({"context": {"slot": 1}, "value": [
                {"slot": 1, "confirmations": 0, "err": null, "confirmationStatus": "processed"}
            ]})),
            Ok(serde_json::json!({"context": {"slot": 1}, "value": [
                {"slot": 1, "confirmations": null, "err": null, "confirmationStatus": "finalized"}
            ]})),
            Ok(serde_json::json!({"context": {"slot": 1}, "value": [
                {"slot": 1, "confirmations": 1, "err": {"InstructionError": [0, "Custom"]}, "confirmationStatus": "confirmed"}
            ]})),
        ]);
        let client = SolanaLedgerClient::with_provider(Box::new(provider), fast_config(0));

        assert_eq!(client.get_signature_status("s").await.unwrap(), None);
        assert_eq!(
            client.get_signature_status("s").await.unwrap(),
            Some(SignatureState::Processed)
        );
        assert_eq!(
            client.get_signature_status("s").await.unwrap(),
            Some(SignatureState::Finalized)
        );
        assert!(matches!(
            client.get_signature_status("s").await.unwrap(),
            Some(SignatureState::Failed(_))
        ));
    }

    #[tokio::test]
    async fn test_deserialization_error() {
        let (provider, _) =
            ScriptedProvider::with_responses(vec![Ok(serde_json::json!("not_a_number"))]);
        let client = SolanaLedgerClient::with_provider(Box::new(provider), fast_config(0));

        match client.get_block_height().await {
            Err(AppError::Blockchain(BlockchainError::RpcError(msg))) => {
                assert!(msg.contains("Deserialization error"));
            }
            other => panic!("Expected deserialization error, got {:?}", other),
        }
    }

    #[test]
    fn test_rpc_error_classification() {
        let err = map_rpc_error(&JsonRpcError {
            code: -32002,
            message: "Transaction simulation failed: Attempt to debit an account but found no record of a prior credit. insufficient lamports".to_string(),
        });
        assert!(matches!(
            err,
            AppError::Blockchain(BlockchainError::InsufficientFunds)
        ));

        let err = map_rpc_error(&JsonRpcError {
            code: -32002,
            message: "Transaction simulation failed: Blockhash not found".to_string(),
        });
        assert!(matches!(
            err,
            AppError::Blockchain(BlockchainError::BlockhashExpired(_))
        ));

        let err = map_rpc_error(&JsonRpcError {
            code: -32002,
            message: "Transaction simulation failed: Error processing Instruction 0: custom program error: 0x1".to_string(),
        });
        assert!(matches!(
            err,
            AppError::Blockchain(BlockchainError::TransactionFailed(ref m)) if m.starts_with("-32002")
        ));
        assert!(!err.is_transient());

        let err = map_rpc_error(&JsonRpcError {
            code: -32600,
            message: "Invalid Request".to_string(),
        });
        assert!(matches!(
            err,
            AppError::Blockchain(BlockchainError::RpcError(ref m)) if m == "-32600: Invalid Request"
        ));
    }

    #[test]
    fn test_client_creation() {
        let client = SolanaLedgerClient::with_defaults("https://api.devnet.solana.com").unwrap();
        assert_eq!(client.endpoint_url(), "https://api.devnet.solana.com");
    }
}
