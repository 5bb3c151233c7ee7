use crate::error::{Result, RpcClientError};
use allowance_core::{Address, Bytes, RawLog, B256};
use serde::{Deserialize, Serialize};

/// JSON-RPC response envelope
#[derive(Debug, Deserialize)]
pub struct RpcResponse<T> {
    pub jsonrpc: String,
    pub id: u64,
    pub result: Option<T>,
    pub error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
}

/// Parameters of an `eth_getLogs` call
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GetLogsParams {
    pub from_block: String,
    pub to_block: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,
    pub topics: Vec<Option<B256>>,
}

/// Log object as returned by `eth_getLogs`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcLog {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    pub block_number: Option<String>,
    pub transaction_index: Option<String>,
    pub log_index: Option<String>,
    pub transaction_hash: Option<B256>,
    #[serde(default)]
    pub removed: bool,
}

impl TryFrom<RpcLog> for RawLog {
    type Error = RpcClientError;

    fn try_from(log: RpcLog) -> Result<Self> {
        Ok(RawLog {
            address: log.address,
            topics: log.topics,
            data: log.data,
            block_number: required_quantity(log.block_number.as_deref(), "blockNumber")?,
            transaction_index: required_quantity(
                log.transaction_index.as_deref(),
                "transactionIndex",
            )?,
            log_index: required_quantity(log.log_index.as_deref(), "logIndex")?,
            transaction_hash: log.transaction_hash,
        })
    }
}

/// Encode a block number as an RPC quantity
pub fn to_quantity(value: u64) -> String {
    format!("0x{:x}", value)
}

/// Decode an RPC quantity ("0x1a")
pub fn parse_quantity(value: &str) -> Result<u64> {
    let digits = value
        .strip_prefix("0x")
        .ok_or_else(|| RpcClientError::InvalidResponse(format!("quantity '{}' lacks 0x", value)))?;
    u64::from_str_radix(digits, 16)
        .map_err(|e| RpcClientError::InvalidResponse(format!("bad quantity '{}': {}", value, e)))
}

fn required_quantity(value: Option<&str>, field: &str) -> Result<u64> {
    let value = value.ok_or_else(|| {
        RpcClientError::InvalidResponse(format!("log is missing {} (pending log?)", field))
    })?;
    parse_quantity(value)
}
