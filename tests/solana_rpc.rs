//! RPC endpoint selection and payments against mocked Solana JSON-RPC nodes.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use solana_sdk::{hash::Hash, pubkey::Pubkey, signature::Keypair};
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_partial_json, method},
};

use pennypics::app::{PaymentConfig, PaymentService};
use pennypics::domain::{
    AppError, BlockchainError, EndpointCache, LedgerClient, PaymentFailure, PaymentOutcome,
    RpcEndpoint,
};
use pennypics::infra::{
    EndpointSelector, HttpEndpointProbe, KeypairWallet, MemoryEndpointCache, RpcClientConfig,
    SelectionStrategy, SelectorConfig,
};

fn rpc_result(result: Value) -> Value {
    json!({"jsonrpc": "2.0", "id": 1, "result": result})
}

fn blockhash_result() -> Value {
    rpc_result(json!({
        "context": {"slot": 1},
        "value": {
            "blockhash": Hash::new_unique().to_string(),
            "lastValidBlockHeight": 500
        }
    }))
}

async fn mount_method(server: &MockServer, rpc_method: &str, body: Value) {
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"method": rpc_method})))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

/// Node that answers every call, slower than any probe timeout used here
async fn hanging_node() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(blockhash_result())
                .set_delay(Duration::from_secs(10)),
        )
        .mount(&server)
        .await;
    server
}

/// Node that answers the liveness probe after `delay`
async fn delayed_node(delay: Duration) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(blockhash_result())
                .set_delay(delay),
        )
        .mount(&server)
        .await;
    server
}

async fn healthy_node() -> MockServer {
    let server = MockServer::start().await;
    mount_method(&server, "getLatestBlockhash", blockhash_result()).await;
    mount_method(&server, "getSlot", rpc_result(json!(42))).await;
    server
}

fn selector(strategy: SelectionStrategy, cache: Arc<dyn EndpointCache>) -> EndpointSelector {
    let config = SelectorConfig {
        strategy,
        probe_timeout: Duration::from_millis(300),
        max_retries: 0,
        retry_delay: Duration::from_millis(10),
    };
    let probe = HttpEndpointProbe::new(config.probe_timeout).unwrap();
    EndpointSelector::new(Arc::new(probe), cache, config)
}

fn fast_rpc() -> RpcClientConfig {
    RpcClientConfig {
        timeout: Duration::from_secs(2),
        max_retries: 0,
        retry_delay: Duration::from_millis(10),
    }
}

#[tokio::test]
async fn test_race_skips_timed_out_endpoint() {
    let slow = hanging_node().await;
    let good = healthy_node().await;
    let candidates = vec![
        RpcEndpoint::new("slow", "Slow", slow.uri()),
        RpcEndpoint::new("good", "Good", good.uri()),
    ];

    let cache = Arc::new(MemoryEndpointCache::new());
    let ledger = selector(SelectionStrategy::Race, cache.clone())
        .connect(&candidates, fast_rpc())
        .await
        .unwrap();

    assert_eq!(ledger.endpoint_url(), good.uri());
    assert!(ledger.health_check().await.is_ok());
    assert_eq!(cache.load().as_deref(), Some(good.uri().as_str()));
}

#[tokio::test]
async fn test_sequential_moves_past_timed_out_endpoint() {
    let slow = hanging_node().await;
    let good = healthy_node().await;
    let candidates = vec![
        RpcEndpoint::new("slow", "Slow", slow.uri()),
        RpcEndpoint::new("good", "Good", good.uri()),
    ];

    let ledger = selector(
        SelectionStrategy::Sequential,
        Arc::new(MemoryEndpointCache::new()),
    )
    .connect(&candidates, fast_rpc())
    .await
    .unwrap();

    assert_eq!(ledger.endpoint_url(), good.uri());
}

#[tokio::test]
async fn test_all_endpoints_down_is_single_error() {
    let slow = hanging_node().await;
    let broken = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&broken)
        .await;
    let candidates = vec![
        RpcEndpoint::new("slow", "Slow", slow.uri()),
        RpcEndpoint::new("broken", "Broken", broken.uri()),
    ];

    let err = selector(SelectionStrategy::Race, Arc::new(MemoryEndpointCache::new()))
        .connect(&candidates, fast_rpc())
        .await
        .err()
        .unwrap();

    match err {
        AppError::Blockchain(BlockchainError::NoHealthyEndpoint(tried)) => {
            assert!(tried.contains(&slow.uri()));
            assert!(tried.contains(&broken.uri()));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_payment_over_json_rpc() {
    let node = healthy_node().await;
    mount_method(&node, "getBalance", rpc_result(json!({"context": {"slot": 1}, "value": 2_000_000_000u64}))).await;
    mount_method(&node, "getBlockHeight", rpc_result(json!(100))).await;
    mount_method(
        &node,
        "sendTransaction",
        rpc_result(json!("5VERv8NMvzbJMEkV8xnrLkEaWRtSz9CosKDYjCJjBRnbJLgp8uirBgmQpjKhoR4tjF3ZpRzrFmBV6UjKdiSZkQUW")),
    )
    .await;
    mount_method(
        &node,
        "getSignatureStatuses",
        rpc_result(json!({
            "context": {"slot": 2},
            "value": [{"slot": 2, "confirmations": 1, "err": null, "confirmationStatus": "confirmed"}]
        })),
    )
    .await;

    let ledger = selector(SelectionStrategy::Race, Arc::new(MemoryEndpointCache::new()))
        .connect(&[RpcEndpoint::custom(node.uri())], fast_rpc())
        .await
        .unwrap();
    let config = PaymentConfig {
        poll_interval: Duration::from_millis(10),
        ..PaymentConfig::new(Pubkey::new_unique(), 1_000_000)
    };
    let service = PaymentService::new(Arc::new(ledger), config);

    let outcome = service
        .pay(&KeypairWallet::from_keypair(Keypair::new()))
        .await;
    assert!(outcome.is_success(), "{outcome:?}");

    let requests = node.received_requests().await.unwrap();
    let sends = requests
        .iter()
        .filter(|r| {
            serde_json::from_slice::<Value>(&r.body)
                .map(|b| b["method"] == "sendTransaction")
                .unwrap_or(false)
        })
        .count();
    assert_eq!(sends, 1);
}

#[tokio::test]
async fn test_network_insufficient_funds_with_balance_check_skipped() {
    let node = healthy_node().await;
    mount_method(
        &node,
        "sendTransaction",
        json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": {
                "code": -32002,
                "message": "Transaction simulation failed: Attempt to debit an account but found no record of a prior credit. insufficient lamports"
            }
        }),
    )
    .await;

    let ledger = selector(SelectionStrategy::Race, Arc::new(MemoryEndpointCache::new()))
        .connect(&[RpcEndpoint::custom(node.uri())], fast_rpc())
        .await
        .unwrap();
    let config = PaymentConfig {
        skip_balance_check: true,
        ..PaymentConfig::new(Pubkey::new_unique(), 1_000_000)
    };
    let service = PaymentService::new(Arc::new(ledger), config);

    let outcome = service
        .pay(&KeypairWallet::from_keypair(Keypair::new()))
        .await;
    assert!(matches!(
        outcome,
        PaymentOutcome::Failure {
            reason: PaymentFailure::InsufficientFunds { .. }
        }
    ));
}

#[tokio::test]
async fn test_override_wins_over_cached_public_endpoint() {
    let public = healthy_node().await;
    let custom = healthy_node().await;
    let candidates = vec![RpcEndpoint::new("public", "Public", public.uri())];

    let cache = Arc::new(MemoryEndpointCache::new());
    cache.store(&public.uri());

    let ledger = selector(SelectionStrategy::Race, cache.clone())
        .with_override(Some(custom.uri().as_str()))
        .connect(&candidates, fast_rpc())
        .await
        .unwrap();

    assert_eq!(ledger.endpoint_url(), custom.uri());
    assert_eq!(cache.load().as_deref(), Some(custom.uri().as_str()));
    assert!(public.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_slower_override_wins_race() {
    let public = healthy_node().await;
    let custom = delayed_node(Duration::from_millis(150)).await;
    let candidates = vec![
        RpcEndpoint::custom(custom.uri()),
        RpcEndpoint::new("public", "Public", public.uri()),
    ];

    let ledger = selector(SelectionStrategy::Race, Arc::new(MemoryEndpointCache::new()))
        .with_override(Some(custom.uri().as_str()))
        .connect(&candidates, fast_rpc())
        .await
        .unwrap();

    assert_eq!(ledger.endpoint_url(), custom.uri());
}

#[tokio::test]
async fn test_unreachable_override_falls_back_to_public() {
    let public = healthy_node().await;
    let custom = hanging_node().await;
    let candidates = vec![
        RpcEndpoint::custom(custom.uri()),
        RpcEndpoint::new("public", "Public", public.uri()),
    ];

    let ledger = selector(SelectionStrategy::Race, Arc::new(MemoryEndpointCache::new()))
        .with_override(Some(custom.uri().as_str()))
        .connect(&candidates, fast_rpc())
        .await
        .unwrap();

    assert_eq!(ledger.endpoint_url(), public.uri());
}

#[tokio::test]
async fn test_simulation_failure_is_reported_as_transaction_failure() {
    let node = healthy_node().await;
    mount_method(&node, "getBalance", rpc_result(json!({"context": {"slot": 1}, "value": 2_000_000_000u64}))).await;
    mount_method(
        &node,
        "sendTransaction",
        json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": {
                "code": -32002,
                "message": "Transaction simulation failed: Error processing Instruction 0: custom program error: 0x1"
            }
        }),
    )
    .await;

    let ledger = selector(SelectionStrategy::Race, Arc::new(MemoryEndpointCache::new()))
        .connect(&[RpcEndpoint::custom(node.uri())], fast_rpc())
        .await
        .unwrap();
    let service = PaymentService::new(
        Arc::new(ledger),
        PaymentConfig::new(Pubkey::new_unique(), 1_000_000),
    );

    let outcome = service
        .pay(&KeypairWallet::from_keypair(Keypair::new()))
        .await;
    match outcome {
        PaymentOutcome::Failure {
            reason: PaymentFailure::TransactionFailed(msg),
        } => assert!(msg.contains("custom program error")),
        other => panic!("unexpected outcome: {other:?}"),
    }
}
