//! PennyPics: pay a few lamports, get an AI-generated image.
//!
//! The crate is layered the same way across its binaries:
//! - [`domain`] holds types, errors and the async traits at every external seam
//! - [`infra`] implements those traits (Solana JSON-RPC, image API, wallet, client store)
//! - [`app`] contains the payment, generation and checkout services
//! - [`api`] exposes the HTTP surface

pub mod api;
pub mod app;
pub mod domain;
pub mod infra;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
