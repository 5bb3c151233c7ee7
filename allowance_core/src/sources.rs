use crate::error::Result;
use crate::types::{ApprovalEvent, ChainId, LogFilter, RawLog};
use alloy_primitives::Address;
use async_trait::async_trait;
use std::sync::Arc;

/// Full-history log query against a node.
///
/// Implementations scan the whole block range available on the chain and
/// return logs in ascending chain order. Retries and timeouts are theirs.
#[async_trait]
pub trait LogFetcher: Send + Sync {
    async fn fetch_logs(
        &self,
        label: &str,
        chain_id: ChainId,
        filter: &LogFilter,
    ) -> Result<Vec<RawLog>>;
}

/// Lookup of the marketplace proxy contract registered for an account.
/// `Ok(None)` means the account has no proxy on that chain.
#[async_trait]
pub trait ProxyResolver: Send + Sync {
    async fn resolve_proxy(&self, chain_id: ChainId, account: Address) -> Result<Option<Address>>;
}

/// Source of already-parsed secondary-protocol approval records
#[async_trait]
pub trait SecondaryEventSource: Send + Sync {
    async fn fetch_events(&self, account: Address, chain_id: ChainId) -> Result<Vec<ApprovalEvent>>;
}

#[async_trait]
impl<T: LogFetcher + ?Sized> LogFetcher for Arc<T> {
    async fn fetch_logs(
        &self,
        label: &str,
        chain_id: ChainId,
        filter: &LogFilter,
    ) -> Result<Vec<RawLog>> {
        (**self).fetch_logs(label, chain_id, filter).await
    }
}
