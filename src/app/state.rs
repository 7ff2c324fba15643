//! Application state management.

use std::sync::Arc;

use crate::domain::{HealthResponse, HealthStatus, ImageGenerator, LedgerClient, PaymentTerms};

use super::generation::GenerationService;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub generation: Arc<GenerationService>,
    /// Ledger used for readiness checks; absent when no RPC endpoint answered at startup
    pub ledger: Option<Arc<dyn LedgerClient>>,
    pub payment_terms: PaymentTerms,
}

impl AppState {
    /// Create a new application state
    #[must_use]
    pub fn new(generator: Arc<dyn ImageGenerator>, payment_terms: PaymentTerms) -> Self {
        Self {
            generation: Arc::new(GenerationService::new(generator)),
            ledger: None,
            payment_terms,
        }
    }

    /// Attach a ledger client (builder pattern)
    #[must_use]
    pub fn with_ledger(mut self, ledger: Arc<dyn LedgerClient>) -> Self {
        self.payment_terms.rpc_url = Some(ledger.endpoint_url().to_string());
        self.ledger = Some(ledger);
        self
    }

    pub async fn health_check(&self) -> HealthResponse {
        let image_api = if self.generation.is_configured() {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unhealthy
        };
        let blockchain = match &self.ledger {
            Some(ledger) => match ledger.health_check().await {
                Ok(()) => HealthStatus::Healthy,
                Err(_) => HealthStatus::Unhealthy,
            },
            None => HealthStatus::Unhealthy,
        };
        HealthResponse::new(image_api, blockchain)
    }
}
