//! Infrastructure layer implementations.

pub mod blockchain;
pub mod client_store;
pub mod image;
pub mod proxy_client;
pub mod wallet;

pub use blockchain::{
    EndpointSelector, HttpEndpointProbe, MemoryEndpointCache, RpcClientConfig, SelectionStrategy,
    SelectorConfig, SolanaLedgerClient,
};
pub use client_store::{ClientStore, HistoryEntry};
pub use image::{StabilityConfig, StabilityImageClient};
pub use proxy_client::ProxyClient;
pub use wallet::{DisconnectedWallet, KeypairWallet, signing_key_from_base58};
