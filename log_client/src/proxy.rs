use crate::client::RpcLogClient;
use crate::error::{Result, RpcClientError};
use allowance_core::{address_to_topic, keccak256, Address, ChainId, EventsError, ProxyResolver};
use async_trait::async_trait;
use config_manager::SystemConfig;
use std::collections::HashMap;
use tracing::debug;

const PROXIES_SIGNATURE: &str = "proxies(address)";

/// Resolves an account's marketplace proxy through the proxy registry's
/// `proxies(address)` view. A zero address means no proxy was ever registered.
#[derive(Clone)]
pub struct RegistryProxyResolver {
    client: RpcLogClient,
    registries: HashMap<ChainId, Address>,
}

impl RegistryProxyResolver {
    pub fn new(client: RpcLogClient, registries: HashMap<ChainId, Address>) -> Self {
        Self { client, registries }
    }

    pub fn from_system(client: RpcLogClient, config: &SystemConfig) -> Result<Self> {
        let registries = config
            .marketplace
            .registries_by_chain()?
            .into_iter()
            .map(|(chain_id, registry)| {
                let address = registry.parse::<Address>().map_err(|e| {
                    RpcClientError::Config(format!("bad registry address '{}': {}", registry, e))
                })?;
                Ok((chain_id, address))
            })
            .collect::<Result<HashMap<_, _>>>()?;

        Ok(Self::new(client, registries))
    }

    pub async fn lookup(&self, chain_id: ChainId, account: Address) -> Result<Option<Address>> {
        let Some(registry) = self.registries.get(&chain_id) else {
            debug!("No proxy registry on chain {}, skipping lookup", chain_id);
            return Ok(None);
        };

        let output = self
            .client
            .call_contract(chain_id, *registry, &proxies_calldata(account))
            .await?;

        decode_proxy(&output)
    }
}

/// ABI-encoded `proxies(account)` call
pub fn proxies_calldata(account: Address) -> Vec<u8> {
    let selector = keccak256(PROXIES_SIGNATURE.as_bytes());
    let mut data = selector[..4].to_vec();
    data.extend_from_slice(address_to_topic(account).as_slice());
    data
}

/// Decode the returned address word; zero means "no proxy"
pub fn decode_proxy(output: &[u8]) -> Result<Option<Address>> {
    if output.len() != 32 || output[..12].iter().any(|b| *b != 0) {
        return Err(RpcClientError::InvalidResponse(format!(
            "proxies() returned malformed data 0x{}",
            hex::encode(output)
        )));
    }

    let proxy = Address::from_slice(&output[12..]);
    Ok((proxy != Address::ZERO).then_some(proxy))
}

#[async_trait]
impl ProxyResolver for RegistryProxyResolver {
    async fn resolve_proxy(
        &self,
        chain_id: ChainId,
        account: Address,
    ) -> allowance_core::Result<Option<Address>> {
        self.lookup(chain_id, account)
            .await
            .map_err(|e| EventsError::Resolution(e.to_string()))
    }
}
