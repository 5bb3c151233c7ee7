//! JSON-RPC fetch layer: full-history log scans and proxy registry lookups.

pub mod client;
pub mod error;
pub mod proxy;
pub mod types;

pub use client::{RpcClientConfig, RpcLogClient};
pub use error::RpcClientError;
pub use proxy::RegistryProxyResolver;
