//! Wires log scans, proxy resolution and Permit2 history into a single
//! generation-aware pipeline that publishes [`EventsSnapshot`]s.

use allowance_core::{Address, ChainId, ImplicitApprovalPolicy};
use config_manager::SystemConfig;
use log_client::{RegistryProxyResolver, RpcClientConfig, RpcClientError, RpcLogClient};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

pub mod permit2;
pub mod pipeline;
pub mod snapshot;
pub mod tracker;

pub use permit2::Permit2EventSource;
pub use pipeline::EventsPipeline;
pub use snapshot::{assemble, EventsSnapshot, SnapshotInputs};
pub use tracker::{EventsQuery, EventsTracker, Generation, StreamUpdate};

#[derive(Error, Debug, Clone)]
pub enum OrchestratorError {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("RPC client error: {0}")]
    RpcClient(String),
}

impl From<config_manager::ConfigurationError> for OrchestratorError {
    fn from(err: config_manager::ConfigurationError) -> Self {
        OrchestratorError::Config(err.to_string())
    }
}

impl From<RpcClientError> for OrchestratorError {
    fn from(err: RpcClientError) -> Self {
        OrchestratorError::RpcClient(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;

fn parse_address(section: &str, value: &str) -> Result<Address> {
    value.trim().parse().map_err(|e| {
        OrchestratorError::Config(format!("{}: bad address '{}': {}", section, value, e))
    })
}

/// Implicit-approval policy per chain from `marketplace.implicit_approval_collections`
pub fn policies_from_config(
    config: &SystemConfig,
) -> Result<HashMap<ChainId, ImplicitApprovalPolicy>> {
    config
        .marketplace
        .collections_by_chain()?
        .into_iter()
        .map(|(chain_id, collections)| {
            let collections = collections
                .iter()
                .map(|c| parse_address("marketplace.implicit_approval_collections", c))
                .collect::<Result<Vec<_>>>()?;
            Ok((chain_id, ImplicitApprovalPolicy::new(collections)))
        })
        .collect()
}

/// Build a pipeline backed by the configured JSON-RPC endpoints
pub fn build_pipeline(config: &SystemConfig) -> Result<EventsPipeline> {
    let client = RpcLogClient::new(RpcClientConfig::from_system(config)?)?;
    let resolver = RegistryProxyResolver::from_system(client.clone(), config)?;

    let permit2_address = parse_address("permit2.address", &config.permit2.address)?;
    let permit2 = if config.permit2.enabled {
        Permit2EventSource::new(client.clone(), permit2_address)
    } else {
        info!("Permit2 history disabled");
        Permit2EventSource::disabled(client.clone(), permit2_address)
    };

    Ok(EventsPipeline::new(
        Arc::new(client),
        Arc::new(resolver),
        Arc::new(permit2),
        policies_from_config(config)?,
    ))
}
