use crate::error::{Result, RpcClientError};
use crate::types::{parse_quantity, to_quantity, GetLogsParams, RpcLog, RpcResponse};
use allowance_core::{Address, Bytes, ChainId, EventsError, LogFetcher, LogFilter, RawLog};
use async_trait::async_trait;
use config_manager::SystemConfig;
use reqwest::Client;
use retry_utils::{retry_with_backoff, RetryPolicy};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Settings for [`RpcLogClient`]
#[derive(Debug, Clone)]
pub struct RpcClientConfig {
    pub endpoints: HashMap<ChainId, String>,
    pub start_blocks: HashMap<ChainId, u64>,
    pub request_timeout_seconds: u64,
    pub max_block_range: u64,
    pub retry: RetryPolicy,
}

impl Default for RpcClientConfig {
    fn default() -> Self {
        Self {
            endpoints: HashMap::new(),
            start_blocks: HashMap::new(),
            request_timeout_seconds: 30,
            max_block_range: 100_000,
            retry: RetryPolicy::default(),
        }
    }
}

impl RpcClientConfig {
    pub fn from_system(config: &SystemConfig) -> Result<Self> {
        Ok(Self {
            endpoints: config.rpc.endpoints_by_chain()?,
            start_blocks: config.rpc.start_blocks_by_chain()?,
            request_timeout_seconds: config.rpc.request_timeout_seconds,
            max_block_range: config.rpc.max_block_range,
            retry: RetryPolicy::new(
                config.retry.max_retries,
                config.retry.base_delay_ms,
                config.retry.max_delay_ms,
            ),
        })
    }
}

/// Minimal Ethereum JSON-RPC client for log scanning and contract reads
#[derive(Clone)]
pub struct RpcLogClient {
    config: RpcClientConfig,
    http_client: Client,
    request_id_counter: Arc<AtomicU64>,
}

impl RpcLogClient {
    pub fn new(config: RpcClientConfig) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()?;

        Ok(Self {
            config,
            http_client,
            request_id_counter: Arc::new(AtomicU64::new(1)),
        })
    }

    fn next_request_id(&self) -> u64 {
        self.request_id_counter.fetch_add(1, Ordering::SeqCst)
    }

    fn endpoint(&self, chain_id: ChainId) -> Result<&str> {
        self.config
            .endpoints
            .get(&chain_id)
            .map(String::as_str)
            .ok_or(RpcClientError::UnsupportedChain(chain_id))
    }

    /// Single JSON-RPC call without retries
    async fn call_once<T: DeserializeOwned>(
        &self,
        chain_id: ChainId,
        method: &str,
        params: &Value,
    ) -> Result<T> {
        let url = self.endpoint(chain_id)?;
        let body = json!({
            "jsonrpc": "2.0",
            "id": self.next_request_id(),
            "method": method,
            "params": params,
        });

        let response = self
            .http_client
            .post(url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;

        let envelope: RpcResponse<T> = response.json().await?;
        if let Some(error) = envelope.error {
            return Err(RpcClientError::Rpc {
                code: error.code,
                message: error.message,
            });
        }

        envelope.result.ok_or_else(|| {
            RpcClientError::InvalidResponse(format!("{} returned no result", method))
        })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        chain_id: ChainId,
        method: &str,
        params: Value,
    ) -> Result<T> {
        let description = format!("{} chain={}", method, chain_id);
        retry_with_backoff(&description, &self.config.retry, || {
            self.call_once(chain_id, method, &params)
        })
        .await
    }

    pub async fn block_number(&self, chain_id: ChainId) -> Result<u64> {
        let quantity: String = self.call(chain_id, "eth_blockNumber", json!([])).await?;
        parse_quantity(&quantity)
    }

    /// `eth_getLogs` over an inclusive block window. Removed logs are dropped.
    pub async fn get_logs(
        &self,
        chain_id: ChainId,
        filter: &LogFilter,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<RawLog>> {
        let params = GetLogsParams {
            from_block: to_quantity(from_block),
            to_block: to_quantity(to_block),
            address: filter.address,
            topics: filter.topics.clone(),
        };

        let logs: Vec<RpcLog> = self
            .call(chain_id, "eth_getLogs", json!([params]))
            .await?;

        logs.into_iter()
            .filter(|log| !log.removed)
            .map(RawLog::try_from)
            .collect()
    }

    /// Scan every block from the chain's configured start block to the head
    pub async fn get_logs_full_range(
        &self,
        label: &str,
        chain_id: ChainId,
        filter: &LogFilter,
    ) -> Result<Vec<RawLog>> {
        let latest = self.block_number(chain_id).await?;
        let from = self
            .config
            .start_blocks
            .get(&chain_id)
            .copied()
            .unwrap_or(0);

        debug!(
            "[{}] scanning chain {} blocks {}..={}",
            label, chain_id, from, latest
        );

        let max_block_range = self.config.max_block_range;
        let logs = scan_block_range(label, from, latest, max_block_range, |lo, hi| {
            self.get_logs(chain_id, filter, lo, hi)
        })
        .await?;

        info!("[{}] fetched {} logs on chain {}", label, logs.len(), chain_id);
        Ok(logs)
    }

    /// `eth_call` against the latest block
    pub async fn call_contract(
        &self,
        chain_id: ChainId,
        to: Address,
        data: &[u8],
    ) -> Result<Bytes> {
        let params = json!([
            {
                "to": to,
                "data": format!("0x{}", hex::encode(data)),
            },
            "latest"
        ]);

        self.call(chain_id, "eth_call", params).await
    }
}

/// Walk `from..=latest` in windows of at most `max_block_range` blocks.
///
/// Windows the node rejects as too large are halved until they succeed or
/// shrink to a single block. The result is ordered by chain position.
pub(crate) async fn scan_block_range<F, Fut>(
    label: &str,
    mut from: u64,
    latest: u64,
    max_block_range: u64,
    mut fetch_window: F,
) -> Result<Vec<RawLog>>
where
    F: FnMut(u64, u64) -> Fut,
    Fut: Future<Output = Result<Vec<RawLog>>>,
{
    let mut window = max_block_range.max(1);
    let mut logs = Vec::new();

    while from <= latest {
        let to = from.saturating_add(window - 1).min(latest);

        match fetch_window(from, to).await {
            Ok(chunk) => {
                logs.extend(chunk);
                if to == u64::MAX {
                    break;
                }
                from = to + 1;
            }
            Err(e) if e.is_range_too_large() && to > from => {
                window = ((to - from + 1) / 2).max(1);
                debug!(
                    "[{}] window {}..={} too large, shrinking to {} blocks",
                    label, from, to, window
                );
            }
            Err(e) => return Err(e),
        }
    }

    // Windows arrive in order already; providers do not always sort within one
    logs.sort_by_key(RawLog::position);
    Ok(logs)
}

#[async_trait]
impl LogFetcher for RpcLogClient {
    async fn fetch_logs(
        &self,
        label: &str,
        chain_id: ChainId,
        filter: &LogFilter,
    ) -> allowance_core::Result<Vec<RawLog>> {
        self.get_logs_full_range(label, chain_id, filter)
            .await
            .map_err(|e| EventsError::fetch(label, e))
    }
}
