//! Application layer containing business logic and shared state.

pub mod checkout;
pub mod generation;
pub mod payment;
pub mod state;

pub use checkout::{CheckoutFlow, CheckoutReceipt};
pub use generation::GenerationService;
pub use payment::{FEE_RESERVE_LAMPORTS, PaymentConfig, PaymentService};
pub use state::AppState;
