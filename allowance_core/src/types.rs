use alloy_primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};
use std::fmt;

/// EVM chain identifier (1 = Ethereum mainnet, 8453 = Base, ...)
pub type ChainId = u64;

/// Position of a log within the chain, ordered by block, then transaction, then log index
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct BlockPosition {
    pub block_number: u64,
    pub transaction_index: u64,
    pub log_index: u64,
}

impl BlockPosition {
    pub fn new(block_number: u64, transaction_index: u64, log_index: u64) -> Self {
        Self {
            block_number,
            transaction_index,
            log_index,
        }
    }

    /// The position directly before this one inside the same transaction.
    /// Saturates at log index 0, in which case the position itself is returned.
    pub fn preceding(&self) -> Self {
        Self {
            log_index: self.log_index.saturating_sub(1),
            ..*self
        }
    }
}

impl fmt::Display for BlockPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "block {} tx {} log {}",
            self.block_number, self.transaction_index, self.log_index
        )
    }
}

/// Unparsed log as returned by the node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawLog {
    /// Contract that emitted the log
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    pub block_number: u64,
    pub transaction_index: u64,
    pub log_index: u64,
    pub transaction_hash: Option<B256>,
}

impl RawLog {
    pub fn position(&self) -> BlockPosition {
        BlockPosition::new(self.block_number, self.transaction_index, self.log_index)
    }
}

/// Indexed-filter for a log query. `None` in a topic position is a wildcard.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LogFilter {
    pub address: Option<Address>,
    pub topics: Vec<Option<B256>>,
}

impl LogFilter {
    pub fn with_topics(topics: Vec<Option<B256>>) -> Self {
        Self {
            address: None,
            topics,
        }
    }

    pub fn at_address(mut self, address: Address) -> Self {
        self.address = Some(address);
        self
    }

    /// Check whether a log satisfies this filter
    pub fn matches(&self, log: &RawLog) -> bool {
        if let Some(address) = self.address {
            if address != log.address {
                return false;
            }
        }

        self.topics.iter().enumerate().all(|(i, expected)| match expected {
            Some(topic) => log.topics.get(i) == Some(topic),
            None => true,
        })
    }
}

/// Amount for fungible tokens, token id for NFTs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenValue {
    Amount(U256),
    TokenId(U256),
}

/// Whether an operator grant was read from the chain or synthesized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalOrigin {
    Observed,
    Inferred,
}

/// Kind of an approval-event record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    TransferIn,
    TransferOut,
    Approval,
    ApprovalForAll,
    Permit2Approval,
}

/// Kind-specific part of an approval-event record
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventPayload {
    /// Tokens received by the account
    TransferIn { from: Address, value: TokenValue },

    /// Tokens sent by the account
    TransferOut { to: Address, value: TokenValue },

    /// Single-spender approval (ERC-20 allowance or ERC-721 token approval)
    Approval { spender: Address, value: TokenValue },

    /// Operator-wide grant or revocation over a whole collection
    ApprovalForAll {
        operator: Address,
        approved: bool,
        origin: ApprovalOrigin,
    },

    /// Permit2 allowance. `token` is the ERC-20 the allowance applies to.
    Permit2Approval {
        token: Address,
        spender: Address,
        amount: U256,
        expiration: u64,
    },
}

/// Canonical output unit of the pipeline
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApprovalEvent {
    pub chain_id: ChainId,
    /// Account whose permission history this record belongs to
    pub account: Address,
    /// Contract that emitted the log (token, collection or Permit2)
    pub contract: Address,
    pub position: BlockPosition,
    pub transaction_hash: Option<B256>,
    #[serde(flatten)]
    pub payload: EventPayload,
}

impl ApprovalEvent {
    pub fn kind(&self) -> EventKind {
        match self.payload {
            EventPayload::TransferIn { .. } => EventKind::TransferIn,
            EventPayload::TransferOut { .. } => EventKind::TransferOut,
            EventPayload::Approval { .. } => EventKind::Approval,
            EventPayload::ApprovalForAll { .. } => EventKind::ApprovalForAll,
            EventPayload::Permit2Approval { .. } => EventKind::Permit2Approval,
        }
    }

    /// Token the record is about. For Permit2 records this is the approved
    /// ERC-20 rather than the Permit2 contract itself.
    pub fn token(&self) -> Address {
        match self.payload {
            EventPayload::Permit2Approval { token, .. } => token,
            _ => self.contract,
        }
    }

    /// Spender, operator or transfer counterparty
    pub fn counterparty(&self) -> Address {
        match self.payload {
            EventPayload::TransferIn { from, .. } => from,
            EventPayload::TransferOut { to, .. } => to,
            EventPayload::Approval { spender, .. } => spender,
            EventPayload::ApprovalForAll { operator, .. } => operator,
            EventPayload::Permit2Approval { spender, .. } => spender,
        }
    }

    pub fn is_transfer(&self) -> bool {
        matches!(self.kind(), EventKind::TransferIn | EventKind::TransferOut)
    }

    pub fn is_inferred(&self) -> bool {
        matches!(
            self.payload,
            EventPayload::ApprovalForAll {
                origin: ApprovalOrigin::Inferred,
                ..
            }
        )
    }
}

/// The five-way grouping handed to consumers once every stream is loaded
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventsBundle {
    pub transfer_from: Vec<ApprovalEvent>,
    pub transfer_to: Vec<ApprovalEvent>,
    pub approval: Vec<ApprovalEvent>,
    /// Explicit ApprovalForAll records followed by synthesized patches
    pub approval_for_all: Vec<ApprovalEvent>,
    pub permit2_approval: Vec<ApprovalEvent>,
}

impl EventsBundle {
    pub fn total_len(&self) -> usize {
        self.transfer_from.len()
            + self.transfer_to.len()
            + self.approval.len()
            + self.approval_for_all.len()
            + self.permit2_approval.len()
    }
}
