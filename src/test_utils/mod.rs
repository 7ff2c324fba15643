//! Test doubles for the domain traits, available with the `test-utils` feature.

pub mod mocks;

pub use mocks::{
    MockConfig, MockGenerationBackend, MockImageGenerator, MockLedgerClient, MockWallet,
};
