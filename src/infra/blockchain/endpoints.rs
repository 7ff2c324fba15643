//! RPC endpoint selection.
//!
//! Candidates are probed with a cheap liveness call (`getLatestBlockhash`),
//! either one after another with a bounded retry count, or all at once.
//! Choosing the winner from the probe results is a pure function,
//! [`select_endpoint`], so it can be tested without any I/O; remembering the
//! winner goes through the [`EndpointCache`] seam.

use async_trait::async_trait;
use reqwest::Client;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use super::solana::{HttpSolanaRpcProvider, RpcClientConfig, SolanaLedgerClient, SolanaRpcProvider};
use crate::domain::{
    AppError, BlockchainError, EndpointCache, EndpointProbe, RpcEndpoint,
};

/// How candidates are probed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectionStrategy {
    /// One candidate at a time, in list order, retrying each
    Sequential,
    /// All candidates concurrently; the fastest responder wins
    #[default]
    Race,
}

impl std::str::FromStr for SelectionStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sequential" => Ok(Self::Sequential),
            "race" | "fastest" => Ok(Self::Race),
            other => Err(format!("Invalid selection strategy: {}", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SelectorConfig {
    pub strategy: SelectionStrategy,
    /// Upper bound for a single probe
    pub probe_timeout: Duration,
    /// Extra attempts per candidate in sequential mode
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            strategy: SelectionStrategy::Race,
            probe_timeout: Duration::from_secs(5),
            max_retries: 2,
            retry_delay: Duration::from_millis(500),
        }
    }
}

impl SelectorConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        use std::env;

        let defaults = Self::default();

        let strategy = env::var("RPC_SELECT_STRATEGY")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.strategy);

        let probe_timeout = env::var("RPC_PROBE_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.probe_timeout);

        let max_retries = env::var("RPC_PROBE_RETRIES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.max_retries);

        Self {
            strategy,
            probe_timeout,
            max_retries,
            ..defaults
        }
    }
}

/// Result of probing one candidate
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeOutcome {
    pub endpoint: RpcEndpoint,
    /// Round-trip latency on success, error message otherwise
    pub result: Result<Duration, String>,
}

impl ProbeOutcome {
    pub fn is_healthy(&self) -> bool {
        self.result.is_ok()
    }
}

/// Pick the fastest healthy endpoint. Ties go to the earlier candidate.
#[must_use]
pub fn select_endpoint(outcomes: &[ProbeOutcome]) -> Option<RpcEndpoint> {
    outcomes
        .iter()
        .enumerate()
        .filter_map(|(idx, outcome)| outcome.result.as_ref().ok().map(|lat| (*lat, idx, outcome)))
        .min_by_key(|(latency, idx, _)| (*latency, *idx))
        .map(|(_, _, outcome)| outcome.endpoint.clone())
}

/// Liveness probe over JSON-RPC
#[derive(Clone)]
pub struct HttpEndpointProbe {
    http_client: Client,
}

impl HttpEndpointProbe {
    pub fn new(timeout: Duration) -> Result<Self, AppError> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Blockchain(BlockchainError::Connection(e.to_string())))?;
        Ok(Self { http_client })
    }
}

#[async_trait]
impl EndpointProbe for HttpEndpointProbe {
    async fn probe(&self, url: &str) -> Result<(), AppError> {
        let provider = HttpSolanaRpcProvider::with_client(self.http_client.clone(), url);
        let result = provider
            .send_request("getLatestBlockhash", serde_json::json!([]))
            .await?;
        if result.get("value").and_then(|v| v.get("blockhash")).is_none() {
            return Err(AppError::Blockchain(BlockchainError::RpcError(
                "getLatestBlockhash returned no blockhash".to_string(),
            )));
        }
        Ok(())
    }
}

/// Process-local cache of the last healthy URL
#[derive(Debug, Default)]
pub struct MemoryEndpointCache {
    url: RwLock<Option<String>>,
}

impl MemoryEndpointCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EndpointCache for MemoryEndpointCache {
    fn load(&self) -> Option<String> {
        self.url.read().ok().and_then(|guard| guard.clone())
    }

    fn store(&self, url: &str) {
        if let Ok(mut guard) = self.url.write() {
            *guard = Some(url.to_string());
        }
    }
}

/// Chooses a working RPC endpoint and hands out clients bound to it
pub struct EndpointSelector {
    probe: Arc<dyn EndpointProbe>,
    cache: Arc<dyn EndpointCache>,
    config: SelectorConfig,
    /// User-supplied URL that beats both the cache and the strategy while it answers
    preferred: Option<String>,
}

impl EndpointSelector {
    #[must_use]
    pub fn new(
        probe: Arc<dyn EndpointProbe>,
        cache: Arc<dyn EndpointCache>,
        config: SelectorConfig,
    ) -> Self {
        Self {
            probe,
            cache,
            config,
            preferred: None,
        }
    }

    /// Prefer `url` whenever it responds. Blank values are ignored.
    #[must_use]
    pub fn with_override(mut self, url: Option<&str>) -> Self {
        self.preferred = url
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .map(str::to_string);
        self
    }

    /// HTTP probe with an in-memory cache
    pub fn with_defaults(config: SelectorConfig) -> Result<Self, AppError> {
        let probe = HttpEndpointProbe::new(config.probe_timeout)?;
        Ok(Self::new(
            Arc::new(probe),
            Arc::new(MemoryEndpointCache::new()),
            config,
        ))
    }

    pub fn config(&self) -> &SelectorConfig {
        &self.config
    }

    /// Probe one endpoint once, bounded by the probe timeout
    async fn probe_once(
        probe: Arc<dyn EndpointProbe>,
        endpoint: RpcEndpoint,
        timeout: Duration,
    ) -> ProbeOutcome {
        let started = Instant::now();
        let result = match tokio::time::timeout(timeout, probe.probe(&endpoint.url)).await {
            Ok(Ok(())) => Ok(started.elapsed()),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!("probe timed out after {}ms", timeout.as_millis())),
        };
        debug!(url = %endpoint.url, result = ?result, "Probed RPC endpoint");
        ProbeOutcome { endpoint, result }
    }

    /// Probe every candidate concurrently; outcomes keep candidate order
    #[instrument(skip(self, candidates), fields(count = candidates.len()))]
    pub async fn probe_all(&self, candidates: &[RpcEndpoint]) -> Vec<ProbeOutcome> {
        let mut tasks = JoinSet::new();
        for (idx, endpoint) in candidates.iter().cloned().enumerate() {
            let probe = Arc::clone(&self.probe);
            let timeout = self.config.probe_timeout;
            tasks.spawn(async move { (idx, Self::probe_once(probe, endpoint, timeout).await) });
        }

        let mut outcomes: Vec<(usize, ProbeOutcome)> = Vec::with_capacity(candidates.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(entry) => outcomes.push(entry),
                Err(e) => warn!(error = %e, "Probe task failed"),
            }
        }
        outcomes.sort_by_key(|(idx, _)| *idx);
        outcomes.into_iter().map(|(_, outcome)| outcome).collect()
    }

    /// Try candidates in order, each up to `max_retries + 1` times
    async fn probe_sequential(&self, candidates: &[RpcEndpoint]) -> Vec<ProbeOutcome> {
        let mut outcomes = Vec::new();
        for endpoint in candidates {
            for attempt in 0..=self.config.max_retries {
                if attempt > 0 {
                    tokio::time::sleep(self.config.retry_delay).await;
                }
                let outcome = Self::probe_once(
                    Arc::clone(&self.probe),
                    endpoint.clone(),
                    self.config.probe_timeout,
                )
                .await;
                let healthy = outcome.is_healthy();
                if !healthy {
                    warn!(url = %endpoint.url, attempt = attempt, error = ?outcome.result, "RPC endpoint probe failed");
                }
                outcomes.push(outcome);
                if healthy {
                    return outcomes;
                }
            }
        }
        outcomes
    }

    /// Choose a responsive endpoint from `candidates`.
    ///
    /// Order of preference: the override URL if it answers, then a cached URL
    /// if it still answers, then the configured strategy over the remaining
    /// candidates. The winner is written back to the cache.
    #[instrument(skip(self, candidates), fields(strategy = ?self.config.strategy))]
    pub async fn select(&self, candidates: &[RpcEndpoint]) -> Result<RpcEndpoint, AppError> {
        if let Some(url) = &self.preferred {
            let outcome = self.probe_known(candidates, url).await;
            if outcome.is_healthy() {
                info!(url = %url, "Using RPC override");
                self.cache.store(url);
                return Ok(outcome.endpoint);
            }
            warn!(url = %url, error = ?outcome.result, "RPC override does not respond, falling back");
        }

        let cached = self
            .cache
            .load()
            .filter(|url| self.preferred.as_ref() != Some(url));
        if let Some(cached) = cached {
            let outcome = self.probe_known(candidates, &cached).await;
            if outcome.is_healthy() {
                debug!(url = %cached, "Reusing cached RPC endpoint");
                return Ok(outcome.endpoint);
            }
            warn!(url = %cached, "Cached RPC endpoint no longer responds");
        }

        let remaining: Vec<RpcEndpoint> = candidates
            .iter()
            .filter(|e| self.preferred.as_ref() != Some(&e.url))
            .cloned()
            .collect();

        let mut tried: Vec<&str> = self.preferred.iter().map(String::as_str).collect();
        tried.extend(remaining.iter().map(|e| e.url.as_str()));
        if tried.is_empty() {
            return Err(AppError::Blockchain(BlockchainError::NoHealthyEndpoint(
                "no candidates configured".to_string(),
            )));
        }

        let outcomes = match self.config.strategy {
            _ if remaining.is_empty() => Vec::new(),
            SelectionStrategy::Sequential => self.probe_sequential(&remaining).await,
            SelectionStrategy::Race => self.probe_all(&remaining).await,
        };

        match select_endpoint(&outcomes) {
            Some(endpoint) => {
                info!(id = %endpoint.id, url = %endpoint.url, "Selected RPC endpoint");
                self.cache.store(&endpoint.url);
                Ok(endpoint)
            }
            None => Err(AppError::Blockchain(BlockchainError::NoHealthyEndpoint(
                tried.join(", "),
            ))),
        }
    }

    /// Probe `url` once, labelled with its candidate record when it has one
    async fn probe_known(&self, candidates: &[RpcEndpoint], url: &str) -> ProbeOutcome {
        let endpoint = candidates
            .iter()
            .find(|e| e.url == url)
            .cloned()
            .unwrap_or_else(|| RpcEndpoint::custom(url));
        Self::probe_once(Arc::clone(&self.probe), endpoint, self.config.probe_timeout).await
    }

    /// Select an endpoint and return a ledger client bound to it
    pub async fn connect(
        &self,
        candidates: &[RpcEndpoint],
        rpc_config: RpcClientConfig,
    ) -> Result<SolanaLedgerClient, AppError> {
        let endpoint = self.select(candidates).await?;
        SolanaLedgerClient::new(&endpoint.url, rpc_config)
    }
}
