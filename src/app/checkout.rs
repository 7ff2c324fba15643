//! Pay-then-generate control flow driven by a client.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{info, instrument, warn};

use crate::domain::{
    AppError, GenerateImageRequest, GenerateImageResponse, GenerationBackend, PaymentOutcome,
    WalletSigner,
};

use super::payment::PaymentService;

/// What a completed checkout produced
#[derive(Debug, Clone)]
pub struct CheckoutReceipt {
    /// Payment signature; `None` when payment was skipped
    pub signature: Option<String>,
    pub response: GenerateImageResponse,
}

pub struct CheckoutFlow {
    payments: Option<Arc<PaymentService>>,
    backend: Arc<dyn GenerationBackend>,
    in_flight: AtomicBool,
}

/// Clears the in-flight flag when a checkout ends, however it ends
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl CheckoutFlow {
    #[must_use]
    pub fn new(payments: Arc<PaymentService>, backend: Arc<dyn GenerationBackend>) -> Self {
        Self {
            payments: Some(payments),
            backend,
            in_flight: AtomicBool::new(false),
        }
    }

    /// Flow that generates without paying (SKIP_PAYMENT, development only)
    #[must_use]
    pub fn without_payment(backend: Arc<dyn GenerationBackend>) -> Self {
        Self {
            payments: None,
            backend,
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Pay, then generate. A second call while one is running is rejected
    /// with `Conflict`. The backend is only reached after a confirmed payment.
    #[instrument(skip(self, wallet, request), fields(prompt_len = request.prompt.len()))]
    pub async fn run(
        &self,
        wallet: &dyn WalletSigner,
        request: &GenerateImageRequest,
    ) -> Result<CheckoutReceipt, AppError> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(AppError::Conflict(
                "A payment is already in progress".to_string(),
            ));
        }
        let _guard = InFlightGuard(&self.in_flight);

        let signature = match &self.payments {
            Some(payments) => match payments.pay(wallet).await {
                PaymentOutcome::Success { signature } => Some(signature),
                PaymentOutcome::Failure { reason } => return Err(AppError::Payment(reason)),
            },
            None => {
                warn!("Payment skipped (SKIP_PAYMENT is set)");
                None
            }
        };

        let response = self.backend.generate(request).await?;
        info!(
            request_id = %response.metadata.request_id,
            images = response.images.len(),
            "Checkout complete"
        );

        Ok(CheckoutReceipt {
            signature,
            response,
        })
    }
}
