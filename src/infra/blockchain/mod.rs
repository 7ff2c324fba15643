//! Blockchain client implementations.
//!
//! This module provides the Solana JSON-RPC ledger client and the logic that
//! decides which RPC endpoint it talks to.

pub mod endpoints;
pub mod solana;

pub use endpoints::{
    EndpointSelector, HttpEndpointProbe, MemoryEndpointCache, ProbeOutcome, SelectionStrategy,
    SelectorConfig, select_endpoint,
};
pub use solana::{HttpSolanaRpcProvider, RpcClientConfig, SolanaLedgerClient, SolanaRpcProvider};
