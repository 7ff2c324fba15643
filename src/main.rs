//! Application entry point.

use std::env;
use std::sync::Arc;

use anyhow::{Context, Result};
use dotenvy::dotenv;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use pennypics::api::{RateLimitConfig, create_router, create_router_with_rate_limit};
use pennypics::app::{AppState, PaymentConfig};
use pennypics::domain::{LAMPORTS_PER_SOL, LedgerClient, PaymentTerms, SolanaNetwork};
use pennypics::infra::{
    EndpointSelector, RpcClientConfig, SelectorConfig, StabilityConfig, StabilityImageClient,
};

/// Application configuration
struct Config {
    host: String,
    port: u16,
    network: SolanaNetwork,
    /// Custom RPC URL, tried before the network's public endpoints
    rpc_url: Option<String>,
    payment: PaymentConfig,
    image: StabilityConfig,
    enable_rate_limiting: bool,
    rate_limit_config: RateLimitConfig,
    selector_config: SelectorConfig,
}

impl Config {
    fn from_env() -> Result<Self> {
        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3000);

        let network = match env::var("SOLANA_NETWORK") {
            Ok(raw) => raw
                .parse::<SolanaNetwork>()
                .map_err(anyhow::Error::msg)?,
            Err(_) => SolanaNetwork::default(),
        };
        let rpc_url = env::var("SOLANA_RPC_URL").ok().filter(|u| !u.is_empty());

        let payment = PaymentConfig::from_env().context("Invalid payment configuration")?;

        let enable_rate_limiting = env::var("ENABLE_RATE_LIMITING")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        Ok(Self {
            host,
            port,
            network,
            rpc_url,
            payment,
            image: StabilityConfig::from_env(),
            enable_rate_limiting,
            rate_limit_config: RateLimitConfig::from_env(),
            selector_config: SelectorConfig::from_env(),
        })
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));

    let registry = tracing_subscriber::registry().with(env_filter);
    if env::var("LOG_FORMAT").is_ok_and(|v| v == "json") {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    init_tracing();

    info!("PennyPics server v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;

    let generator = StabilityImageClient::new(config.image.clone())?;
    if config.image.api_key.is_some() {
        info!(engine = %config.image.engine, "Image API client configured");
    } else {
        warn!("IMAGE_API_KEY not set: generation requests will fail until it is configured");
    }

    let terms = PaymentTerms {
        recipient: config.payment.recipient.to_string(),
        amount_lamports: config.payment.amount_lamports,
        network: config.network,
        rpc_url: None,
    };
    info!(
        recipient = %terms.recipient,
        lamports = terms.amount_lamports,
        sol = terms.amount_lamports as f64 / LAMPORTS_PER_SOL as f64,
        network = %terms.network,
        "Payment terms"
    );

    let mut app_state = AppState::new(Arc::new(generator), terms);

    let selector = EndpointSelector::with_defaults(config.selector_config.clone())?
        .with_override(config.rpc_url.as_deref());
    let candidates = config.network.candidates(config.rpc_url.as_deref());
    match selector
        .connect(&candidates, RpcClientConfig::default())
        .await
    {
        Ok(ledger) => {
            info!(url = %ledger.endpoint_url(), "Solana RPC connected");
            app_state = app_state.with_ledger(Arc::new(ledger));
        }
        Err(e) => warn!(error = %e, "No Solana RPC endpoint reachable; readiness will report unhealthy"),
    }

    let app_state = Arc::new(app_state);
    let router = if config.enable_rate_limiting {
        create_router_with_rate_limit(app_state, config.rate_limit_config)
    } else {
        info!("Rate limiting disabled");
        create_router(app_state)
    };

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("Server starting on http://{}", addr);
    info!("Swagger UI available at http://{}/swagger-ui", addr);
    info!("OpenAPI spec at http://{}/api-docs/openapi.json", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shut down");
    Ok(())
}
