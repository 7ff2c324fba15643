//! Command-line client: pays the server's price from a local wallet and
//! saves the generated images.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use dotenvy::dotenv;
use secrecy::SecretString;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use pennypics::app::{CheckoutFlow, CheckoutReceipt, PaymentConfig, PaymentService};
use pennypics::domain::{
    AppError, GenerateImageRequest, ImageStyle, LAMPORTS_PER_SOL, SolanaNetwork, WalletSigner,
};
use pennypics::infra::client_store::DEFAULT_STORE_PATH;
use pennypics::infra::proxy_client::DEFAULT_SERVER_URL;
use pennypics::infra::{
    ClientStore, DisconnectedWallet, EndpointSelector, HistoryEntry, HttpEndpointProbe,
    KeypairWallet, ProxyClient, RpcClientConfig, SelectorConfig,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Pay a few lamports, get an AI-generated image", long_about = None)]
struct Cli {
    /// PennyPics server base URL
    #[arg(long, env = "PENNYPICS_SERVER_URL", default_value = DEFAULT_SERVER_URL)]
    server: String,

    /// Client state file (theme, RPC override, history)
    #[arg(long, env = "PENNYPICS_STORE", default_value = DEFAULT_STORE_PATH)]
    store: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Pay and generate images for a prompt
    Generate {
        prompt: String,
        #[arg(long)]
        style: Option<String>,
        #[arg(long)]
        width: Option<i64>,
        #[arg(long)]
        height: Option<i64>,
        #[arg(long)]
        samples: Option<i64>,
        /// Directory the PNG files are written to
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },
    /// Show recent generations
    History,
    /// Manage the custom RPC endpoint
    Rpc {
        #[command(subcommand)]
        action: RpcAction,
    },
    /// Switch between dark and light output
    Theme { mode: ThemeMode },
    /// List the available style presets
    Styles,
}

#[derive(Subcommand, Debug)]
enum RpcAction {
    /// Try this URL before the network's public endpoints
    Set { url: String },
    /// Go back to the public endpoints
    Clear,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ThemeMode {
    Dark,
    Light,
}

/// Environment-only settings for the payment side
struct WalletEnv {
    private_key: Option<SecretString>,
    network: Option<SolanaNetwork>,
    rpc_url: Option<String>,
    skip_payment: bool,
    skip_balance_check: bool,
}

impl WalletEnv {
    fn from_env() -> Result<Self> {
        use std::env;

        let flag = |key: &str| {
            env::var(key)
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false)
        };
        let network = match env::var("SOLANA_NETWORK") {
            Ok(raw) => Some(raw.parse::<SolanaNetwork>().map_err(anyhow::Error::msg)?),
            Err(_) => None,
        };

        Ok(Self {
            private_key: env::var("WALLET_PRIVATE_KEY")
                .ok()
                .filter(|k| !k.is_empty())
                .map(SecretString::from),
            network,
            rpc_url: env::var("SOLANA_RPC_URL").ok().filter(|u| !u.is_empty()),
            skip_payment: flag("SKIP_PAYMENT"),
            skip_balance_check: flag("SKIP_BALANCE_CHECK"),
        })
    }
}

fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn,pennypics=info"));

    let registry = tracing_subscriber::registry().with(env_filter);
    if std::env::var("LOG_FORMAT").is_ok_and(|v| v == "json") {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

/// Minimal ANSI styling driven by the stored theme
struct Palette {
    dark: bool,
}

impl Palette {
    fn heading(&self, text: &str) -> String {
        if self.dark {
            format!("\x1b[1;97m{}\x1b[0m", text)
        } else {
            format!("\x1b[1;30m{}\x1b[0m", text)
        }
    }

    fn muted(&self, text: &str) -> String {
        if self.dark {
            format!("\x1b[37m{}\x1b[0m", text)
        } else {
            format!("\x1b[90m{}\x1b[0m", text)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let store = Arc::new(ClientStore::load(&cli.store));
    let palette = Palette {
        dark: store.dark_mode(),
    };

    match cli.command {
        Command::Generate {
            prompt,
            style,
            width,
            height,
            samples,
            out,
        } => {
            let request = GenerateImageRequest {
                prompt,
                style,
                width,
                height,
                samples,
            };
            generate(&cli.server, store, &palette, request, &out).await?;
        }
        Command::History => print_history(&store, &palette),
        Command::Rpc { action } => match action {
            RpcAction::Set { url } => {
                let url = url.trim().to_string();
                if !(url.starts_with("http://") || url.starts_with("https://")) {
                    bail!("RPC URL must start with http:// or https://");
                }
                store.set_rpc_url_override(Some(url.clone()))?;
                println!(
                    "Custom RPC endpoint set to {} (saved in {})",
                    url,
                    store.path().display()
                );
            }
            RpcAction::Clear => {
                store.set_rpc_url_override(None)?;
                println!("Custom RPC endpoint cleared");
            }
        },
        Command::Theme { mode } => {
            store.set_dark_mode(matches!(mode, ThemeMode::Dark))?;
            println!("Theme set to {:?}", mode);
        }
        Command::Styles => {
            for style in ImageStyle::ALL {
                let marker = if style == ImageStyle::default() {
                    " (default)"
                } else {
                    ""
                };
                println!("{}{}", style, palette.muted(marker));
            }
        }
    }

    Ok(())
}

async fn generate(
    server: &str,
    store: Arc<ClientStore>,
    palette: &Palette,
    request: GenerateImageRequest,
    out: &Path,
) -> Result<()> {
    let wallet_env = WalletEnv::from_env()?;
    let proxy = Arc::new(ProxyClient::new(server, Duration::from_secs(180))?);

    let (flow, network) = if wallet_env.skip_payment {
        warn!("SKIP_PAYMENT is set: generating without paying");
        (
            CheckoutFlow::without_payment(proxy.clone()),
            wallet_env.network.unwrap_or_default(),
        )
    } else {
        let terms = proxy
            .payment_terms()
            .await
            .context("Failed to fetch payment terms from server")?;
        let network = wallet_env.network.unwrap_or(terms.network);
        if network != terms.network {
            warn!(server = %terms.network, local = %network, "Network differs from the server's");
        }
        println!(
            "{} {} SOL to {} on {}",
            palette.heading("Price:"),
            terms.amount_lamports as f64 / LAMPORTS_PER_SOL as f64,
            terms.recipient,
            network
        );

        let override_url = store.rpc_url_override().or(wallet_env.rpc_url.clone());
        let candidates = network.candidates(override_url.as_deref());
        let selector_config = SelectorConfig::from_env();
        let probe = HttpEndpointProbe::new(selector_config.probe_timeout)?;
        let selector = EndpointSelector::new(Arc::new(probe), store.clone(), selector_config)
            .with_override(override_url.as_deref());
        let ledger = selector
            .connect(&candidates, RpcClientConfig::default())
            .await
            .context("Could not reach any Solana RPC endpoint")?;

        let payment_config = PaymentConfig {
            skip_balance_check: wallet_env.skip_balance_check,
            ..PaymentConfig::from_terms(&terms)?
        };
        let payments = Arc::new(PaymentService::new(Arc::new(ledger), payment_config));
        (CheckoutFlow::new(payments, proxy.clone()), network)
    };

    let wallet: Box<dyn WalletSigner> = match &wallet_env.private_key {
        Some(secret) => Box::new(KeypairWallet::from_base58(secret)?),
        None => Box::new(DisconnectedWallet),
    };
    if let Some(pubkey) = wallet.public_key() {
        info!(wallet = %pubkey, "Wallet loaded");
    }

    println!("{}", palette.muted("Working..."));
    let receipt = match flow.run(wallet.as_ref(), &request).await {
        Ok(receipt) => receipt,
        Err(AppError::Payment(reason)) => bail!("{}", reason),
        Err(e) => return Err(e.into()),
    };

    let files = save_images(&receipt, out)?;
    if let Some(signature) = &receipt.signature {
        println!(
            "{} {}",
            palette.heading("Paid:"),
            network.explorer_url(signature)
        );
    }
    for file in &files {
        println!("{} {}", palette.heading("Saved:"), file);
    }

    let metadata = &receipt.response.metadata;
    store.push_history(HistoryEntry {
        request_id: metadata.request_id.clone(),
        prompt: metadata.prompt.clone(),
        style: metadata.style.clone(),
        width: metadata.width,
        height: metadata.height,
        signature: receipt.signature.clone(),
        files,
        created_at: Utc::now(),
    })?;

    Ok(())
}

fn save_images(receipt: &CheckoutReceipt, out: &Path) -> Result<Vec<String>> {
    std::fs::create_dir_all(out)
        .with_context(|| format!("Failed to create {}", out.display()))?;

    let request_id = &receipt.response.metadata.request_id;
    receipt
        .response
        .images
        .iter()
        .enumerate()
        .map(|(idx, encoded)| -> Result<String> {
            let bytes = BASE64
                .decode(encoded)
                .context("Server returned an image that is not valid base64")?;
            let path = out.join(format!("pennypics-{}-{}.png", request_id, idx + 1));
            std::fs::write(&path, bytes)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            Ok(path.display().to_string())
        })
        .collect()
}

fn print_history(store: &ClientStore, palette: &Palette) {
    let history = store.history();
    if history.is_empty() {
        println!("No generations yet");
        return;
    }
    for entry in history {
        println!(
            "{} {}",
            palette.heading(&entry.created_at.format("%Y-%m-%d %H:%M").to_string()),
            entry.prompt
        );
        println!(
            "  {}",
            palette.muted(&format!(
                "{} {}x{} {}",
                entry.style,
                entry.width,
                entry.height,
                entry.signature.as_deref().unwrap_or("unpaid")
            ))
        );
        for file in &entry.files {
            println!("  {}", file);
        }
    }
}
