use allowance_core::{
    address_to_topic, parse_logs, Address, ApprovalEvent, ChainId, LogFetcher, LogFilter,
    ParseContext, RawLog, SecondaryEventSource, PERMIT2_INTERFACE,
};
use async_trait::async_trait;
use tracing::debug;

/// Permit2 allowance history of an account, read from the Permit2 contract's
/// `Approval`, `Permit` and `Lockdown` logs
pub struct Permit2EventSource<F> {
    fetcher: F,
    contract: Address,
    enabled: bool,
}

impl<F: LogFetcher> Permit2EventSource<F> {
    pub fn new(fetcher: F, contract: Address) -> Self {
        Self {
            fetcher,
            contract,
            enabled: true,
        }
    }

    /// A source that always reports an empty history
    pub fn disabled(fetcher: F, contract: Address) -> Self {
        Self {
            fetcher,
            contract,
            enabled: false,
        }
    }

    async fn fetch_event_logs(
        &self,
        event: &str,
        chain_id: ChainId,
        account: Address,
    ) -> allowance_core::Result<Vec<RawLog>> {
        let selector = PERMIT2_INTERFACE.selector(event)?;
        let filter = LogFilter::with_topics(vec![Some(selector), Some(address_to_topic(account))])
            .at_address(self.contract);

        self.fetcher
            .fetch_logs(&format!("Permit2 {}", event), chain_id, &filter)
            .await
    }
}

#[async_trait]
impl<F: LogFetcher> SecondaryEventSource for Permit2EventSource<F> {
    async fn fetch_events(
        &self,
        account: Address,
        chain_id: ChainId,
    ) -> allowance_core::Result<Vec<ApprovalEvent>> {
        if !self.enabled {
            return Ok(Vec::new());
        }

        let (approvals, permits, lockdowns) = futures::try_join!(
            self.fetch_event_logs("Approval", chain_id, account),
            self.fetch_event_logs("Permit", chain_id, account),
            self.fetch_event_logs("Lockdown", chain_id, account),
        )?;

        let mut logs: Vec<RawLog> = approvals
            .into_iter()
            .chain(permits)
            .chain(lockdowns)
            .collect();
        logs.sort_by_key(RawLog::position);

        debug!(
            "Fetched {} Permit2 logs for {} on chain {}",
            logs.len(),
            account,
            chain_id
        );

        parse_logs(&logs, &ParseContext::new(chain_id, account))
    }
}
