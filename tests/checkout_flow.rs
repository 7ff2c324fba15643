//! Client-side checkout: payment gating, the proxy client and the wire
//! format between the CLI and the server.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use solana_sdk::pubkey::Pubkey;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_partial_json, method, path},
};

use pennypics::app::{CheckoutFlow, FEE_RESERVE_LAMPORTS, PaymentConfig, PaymentService};
use pennypics::domain::{
    AppError, ExternalServiceError, GenerateImageRequest, GenerationBackend, PaymentFailure,
    SolanaNetwork,
};
use pennypics::infra::ProxyClient;
use pennypics::test_utils::{MockGenerationBackend, MockLedgerClient, MockWallet};

const PRICE: u64 = 1_000_000;

fn payment_service(ledger: Arc<MockLedgerClient>) -> Arc<PaymentService> {
    let config = PaymentConfig {
        poll_interval: Duration::from_millis(1),
        blockhash_retry_delay: Duration::from_millis(1),
        confirmation_timeout: Duration::from_millis(500),
        ..PaymentConfig::new(Pubkey::new_unique(), PRICE)
    };
    Arc::new(PaymentService::new(ledger, config))
}

fn proxy(server: &MockServer) -> ProxyClient {
    ProxyClient::new(&server.uri(), Duration::from_secs(5)).unwrap()
}

fn generated_body() -> serde_json::Value {
    json!({
        "success": true,
        "images": ["aW1hZ2U="],
        "metadata": {
            "request_id": "7f8e4a52-2b3c-4c0e-9a55-0d1f6f1d2c11",
            "prompt": "a cat",
            "style": "photographic",
            "width": 1024,
            "height": 1024,
            "samples": 1,
            "engine": "stable-diffusion-v1-6",
            "generated_at": "2026-01-01T00:00:00Z"
        }
    })
}

#[tokio::test]
async fn test_wallet_insufficient_funds_never_reaches_backend() {
    let ledger = Arc::new(MockLedgerClient::new());
    let backend = Arc::new(MockGenerationBackend::new());
    let flow = CheckoutFlow::new(payment_service(ledger.clone()), backend.clone());
    let wallet = MockWallet::insufficient_funds();

    let err = flow
        .run(&wallet, &GenerateImageRequest::new("a cat"))
        .await
        .unwrap_err();

    assert!(err.to_string().to_lowercase().contains("insufficient funds"));
    assert!(matches!(
        err,
        AppError::Payment(PaymentFailure::InsufficientFunds { .. })
    ));
    assert_eq!(wallet.sign_requests(), 1);
    assert_eq!(ledger.sent_count(), 0);
    assert_eq!(backend.call_count(), 0);
}

#[tokio::test]
async fn test_low_balance_never_reaches_backend() {
    let ledger = Arc::new(MockLedgerClient::new().with_balance(PRICE));
    let backend = Arc::new(MockGenerationBackend::new());
    let flow = CheckoutFlow::new(payment_service(ledger.clone()), backend.clone());
    let wallet = MockWallet::new();

    let err = flow
        .run(&wallet, &GenerateImageRequest::new("a cat"))
        .await
        .unwrap_err();

    match err {
        AppError::Payment(PaymentFailure::InsufficientFunds {
            required,
            available,
        }) => {
            assert_eq!(required, PRICE + FEE_RESERVE_LAMPORTS);
            assert_eq!(available, Some(PRICE));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(wallet.sign_requests(), 0);
    assert_eq!(backend.call_count(), 0);
}

#[tokio::test]
async fn test_disconnected_wallet_never_reaches_backend() {
    let backend = Arc::new(MockGenerationBackend::new());
    let flow = CheckoutFlow::new(
        payment_service(Arc::new(MockLedgerClient::new())),
        backend.clone(),
    );

    let err = flow
        .run(&MockWallet::disconnected(), &GenerateImageRequest::new("a cat"))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        AppError::Payment(PaymentFailure::WalletNotConnected)
    ));
    assert_eq!(backend.call_count(), 0);
}

#[tokio::test]
async fn test_paid_checkout_transfers_exact_amount() {
    let ledger = Arc::new(MockLedgerClient::new());
    let backend = Arc::new(MockGenerationBackend::new());
    let flow = CheckoutFlow::new(payment_service(ledger.clone()), backend.clone());
    let wallet = MockWallet::new();

    let receipt = flow
        .run(&wallet, &GenerateImageRequest::new("a cat"))
        .await
        .unwrap();

    let sent = ledger.sent_transactions();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].verify().is_ok());
    assert_eq!(
        receipt.signature.as_deref(),
        Some(sent[0].signatures[0].to_string().as_str())
    );
    assert_eq!(sent[0].message.account_keys[0], wallet_pubkey(&wallet));
    assert_eq!(backend.call_count(), 1);
}

fn wallet_pubkey(wallet: &MockWallet) -> Pubkey {
    use pennypics::domain::WalletSigner;
    wallet.public_key().unwrap()
}

#[tokio::test]
async fn test_checkout_through_proxy_client() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate-image"))
        .and(body_partial_json(json!({"prompt": "a cat", "width": 768})))
        .respond_with(ResponseTemplate::new(200).set_body_json(generated_body()))
        .expect(1)
        .mount(&server)
        .await;

    let flow = CheckoutFlow::new(
        payment_service(Arc::new(MockLedgerClient::new())),
        Arc::new(proxy(&server)),
    );
    let mut request = GenerateImageRequest::new("a cat");
    request.width = Some(768);

    let receipt = flow.run(&MockWallet::new(), &request).await.unwrap();
    assert_eq!(receipt.response.images, vec!["aW1hZ2U="]);
    assert!(receipt.signature.is_some());
}

#[tokio::test]
async fn test_proxy_surfaces_server_error_details() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate-image"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "error": "Image generation failed",
            "details": "Incorrect API key provided",
            "type": "external_service_error"
        })))
        .mount(&server)
        .await;

    let err = proxy(&server)
        .generate(&GenerateImageRequest::new("a cat"))
        .await
        .unwrap_err();

    match err {
        AppError::ExternalService(ExternalServiceError::ApiError {
            status_code,
            message,
        }) => {
            assert_eq!(status_code, 500);
            assert!(message.contains("Image generation failed"));
            assert!(message.contains("Incorrect API key provided"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_proxy_maps_rate_limit() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate-image"))
        .respond_with(
            ResponseTemplate::new(429)
                .set_body_json(json!({"error": "Rate limit exceeded", "retry_after": 1})),
        )
        .mount(&server)
        .await;

    let err = proxy(&server)
        .generate(&GenerateImageRequest::new("a cat"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::ExternalService(ExternalServiceError::RateLimited(_))
    ));
}

#[tokio::test]
async fn test_proxy_fetches_payment_terms() {
    let server = MockServer::start().await;
    let recipient = Pubkey::new_unique().to_string();
    Mock::given(method("GET"))
        .and(path("/api/payment-terms"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "recipient": recipient,
            "amount_lamports": 2_000_000,
            "network": "mainnet-beta",
            "rpc_url": null
        })))
        .mount(&server)
        .await;

    let terms = proxy(&server).payment_terms().await.unwrap();
    assert_eq!(terms.network, SolanaNetwork::MainnetBeta);

    let config = PaymentConfig::from_terms(&terms).unwrap();
    assert_eq!(config.recipient.to_string(), recipient);
    assert_eq!(config.amount_lamports, 2_000_000);
}
