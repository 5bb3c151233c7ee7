use allowance_core::{
    address_to_topic, known_selectors, Address, ApprovalEvent, ApprovalOrigin, BlockPosition,
    Bytes, ChainId, EventKind, EventPayload, EventsError, ImplicitApprovalPolicy, LogFetcher,
    LogFilter, LogStream, ProxyResolver, RawLog, SecondaryEventSource, U256,
};
use async_trait::async_trait;
use event_orchestrator::{EventsPipeline, EventsQuery, EventsSnapshot, EventsTracker, StreamUpdate};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};

const CHAIN: ChainId = 1;

fn account() -> Address {
    Address::repeat_byte(0x11)
}

fn other_account() -> Address {
    Address::repeat_byte(0x12)
}

fn proxy() -> Address {
    Address::repeat_byte(0x99)
}

fn collection() -> Address {
    Address::repeat_byte(0xc0)
}

fn policies() -> HashMap<ChainId, ImplicitApprovalPolicy> {
    HashMap::from([(CHAIN, ImplicitApprovalPolicy::new(vec![collection()]))])
}

fn nft_transfer(
    contract: Address,
    from: Address,
    to: Address,
    block: u64,
    log_index: u64,
) -> RawLog {
    RawLog {
        address: contract,
        topics: vec![
            known_selectors().transfer,
            address_to_topic(from),
            address_to_topic(to),
            allowance_core::B256::from(U256::from(7).to_be_bytes::<32>()),
        ],
        data: Bytes::new(),
        block_number: block,
        transaction_index: 0,
        log_index,
        transaction_hash: None,
    }
}

/// Serves logs from a fixed set, with optional failures and a gate that holds
/// back every query mentioning one account.
#[derive(Default)]
struct FakeFetcher {
    logs: Vec<RawLog>,
    failures: HashMap<&'static str, String>,
    gate: Option<Gate>,
}

struct Gate {
    account: Address,
    entered: mpsc::UnboundedSender<()>,
    release: Arc<Semaphore>,
}

#[async_trait]
impl LogFetcher for FakeFetcher {
    async fn fetch_logs(
        &self,
        label: &str,
        _chain_id: ChainId,
        filter: &LogFilter,
    ) -> allowance_core::Result<Vec<RawLog>> {
        if let Some(gate) = &self.gate {
            if filter.topics.contains(&Some(address_to_topic(gate.account))) {
                let _ = gate.entered.send(());
                let _permit = gate.release.acquire().await;
            }
        }

        if let Some(message) = self.failures.get(label) {
            return Err(EventsError::fetch(label, message));
        }

        Ok(self.logs.iter().filter(|log| filter.matches(log)).cloned().collect())
    }
}

struct FakeResolver(Result<Option<Address>, EventsError>);

#[async_trait]
impl ProxyResolver for FakeResolver {
    async fn resolve_proxy(
        &self,
        _chain_id: ChainId,
        _account: Address,
    ) -> allowance_core::Result<Option<Address>> {
        self.0.clone()
    }
}

struct FakeSecondary(Vec<ApprovalEvent>);

#[async_trait]
impl SecondaryEventSource for FakeSecondary {
    async fn fetch_events(
        &self,
        _account: Address,
        _chain_id: ChainId,
    ) -> allowance_core::Result<Vec<ApprovalEvent>> {
        Ok(self.0.clone())
    }
}

fn pipeline(fetcher: FakeFetcher, proxy: Result<Option<Address>, EventsError>) -> EventsPipeline {
    EventsPipeline::new(
        Arc::new(fetcher),
        Arc::new(FakeResolver(proxy)),
        Arc::new(FakeSecondary(Vec::new())),
        policies(),
    )
}

#[tokio::test]
async fn empty_history_settles_with_empty_bundle() {
    let pipeline = pipeline(FakeFetcher::default(), Ok(None));
    assert_eq!(pipeline.snapshot(), EventsSnapshot::idle());

    let snapshot = pipeline
        .load(EventsQuery::new(account(), CHAIN))
        .await
        .unwrap();

    assert!(!snapshot.is_loading);
    assert!(snapshot.error.is_none());
    let bundle = snapshot.events.unwrap();
    assert_eq!(bundle.total_len(), 0);
}

#[tokio::test]
async fn transfer_of_covered_collection_yields_one_inferred_grant() {
    let fetcher = FakeFetcher {
        logs: vec![
            nft_transfer(collection(), Address::repeat_byte(0x22), account(), 100, 4),
            nft_transfer(collection(), Address::repeat_byte(0x23), account(), 200, 1),
        ],
        ..Default::default()
    };
    let pipeline = pipeline(fetcher, Ok(Some(proxy())));

    let bundle = pipeline
        .load(EventsQuery::new(account(), CHAIN))
        .await
        .unwrap()
        .events
        .unwrap();

    assert_eq!(bundle.transfer_to.len(), 2);
    assert_eq!(bundle.approval_for_all.len(), 1);

    let patch = &bundle.approval_for_all[0];
    assert!(patch.is_inferred());
    assert_eq!(patch.contract, collection());
    assert_eq!(patch.position, BlockPosition::new(100, 0, 3));
    assert_eq!(
        patch.payload,
        EventPayload::ApprovalForAll {
            operator: proxy(),
            approved: true,
            origin: ApprovalOrigin::Inferred,
        }
    );
}

#[tokio::test]
async fn uncovered_collection_or_missing_proxy_yields_no_patch() {
    let uncovered = FakeFetcher {
        logs: vec![nft_transfer(
            Address::repeat_byte(0xd0),
            account(),
            Address::repeat_byte(0x22),
            50,
            0,
        )],
        ..Default::default()
    };
    let bundle = pipeline(uncovered, Ok(Some(proxy())))
        .load(EventsQuery::new(account(), CHAIN))
        .await
        .unwrap()
        .events
        .unwrap();
    assert_eq!(bundle.transfer_from.len(), 1);
    assert!(bundle.approval_for_all.is_empty());

    let covered = FakeFetcher {
        logs: vec![nft_transfer(collection(), account(), Address::repeat_byte(0x22), 50, 0)],
        ..Default::default()
    };
    let bundle = pipeline(covered, Ok(None))
        .load(EventsQuery::new(account(), CHAIN))
        .await
        .unwrap()
        .events
        .unwrap();
    assert!(bundle.approval_for_all.is_empty());
}

#[tokio::test]
async fn stream_failure_withholds_events() {
    let fetcher = FakeFetcher {
        failures: HashMap::from([("Approval", "rate limited".to_string())]),
        ..Default::default()
    };
    let snapshot = pipeline(fetcher, Ok(None))
        .load(EventsQuery::new(account(), CHAIN))
        .await
        .unwrap();

    assert!(!snapshot.is_loading);
    assert!(snapshot.events.is_none());
    assert_eq!(
        snapshot.error,
        Some(EventsError::fetch("Approval", "rate limited"))
    );
}

#[tokio::test]
async fn first_error_in_priority_order_wins() {
    let fetcher = FakeFetcher {
        failures: HashMap::from([
            ("ApprovalForAll", "second".to_string()),
            ("Transfer (to)", "first".to_string()),
        ]),
        ..Default::default()
    };
    let snapshot = pipeline(fetcher, Err(EventsError::Resolution("last".to_string())))
        .load(EventsQuery::new(account(), CHAIN))
        .await
        .unwrap();

    assert_eq!(
        snapshot.error,
        Some(EventsError::fetch("Transfer (to)", "first"))
    );
}

#[tokio::test]
async fn proxy_failure_is_reported_after_streams() {
    let snapshot = pipeline(
        FakeFetcher::default(),
        Err(EventsError::Resolution("registry unavailable".to_string())),
    )
    .load(EventsQuery::new(account(), CHAIN))
    .await
    .unwrap();

    assert!(snapshot.events.is_none());
    assert_eq!(
        snapshot.error,
        Some(EventsError::Resolution("registry unavailable".to_string()))
    );
}

#[tokio::test]
async fn secondary_records_are_part_of_the_bundle() {
    let permit = ApprovalEvent {
        chain_id: CHAIN,
        account: account(),
        contract: Address::repeat_byte(0x02),
        position: BlockPosition::new(10, 0, 0),
        transaction_hash: None,
        payload: EventPayload::Permit2Approval {
            token: Address::repeat_byte(0x33),
            spender: Address::repeat_byte(0x44),
            amount: U256::from(1),
            expiration: 0,
        },
    };
    let pipeline = EventsPipeline::new(
        Arc::new(FakeFetcher::default()),
        Arc::new(FakeResolver(Ok(None))),
        Arc::new(FakeSecondary(vec![permit.clone()])),
        policies(),
    );

    let bundle = pipeline
        .load(EventsQuery::new(account(), CHAIN))
        .await
        .unwrap()
        .events
        .unwrap();
    assert_eq!(bundle.permit2_approval, vec![permit]);
    assert_eq!(bundle.permit2_approval[0].kind(), EventKind::Permit2Approval);
}

#[test]
fn pending_proxy_keeps_loading_without_error() {
    let mut tracker = EventsTracker::new(policies());
    let generation = tracker.start(EventsQuery::new(account(), CHAIN));

    for stream in LogStream::ALL {
        tracker.apply(generation, StreamUpdate::Logs(stream, Ok(Vec::new())));
    }
    tracker.apply(generation, StreamUpdate::Secondary(Ok(Vec::new())));

    let snapshot = tracker.snapshot();
    assert!(snapshot.is_loading);
    assert!(snapshot.error.is_none());
    assert!(snapshot.events.is_none());

    tracker.apply(generation, StreamUpdate::Proxy(Ok(None)));
    assert!(tracker.snapshot().is_complete());
}

#[tokio::test]
async fn newer_request_supersedes_older_one() {
    let (entered_tx, mut entered_rx) = mpsc::unbounded_channel();
    let release = Arc::new(Semaphore::new(0));
    let fetcher = FakeFetcher {
        logs: vec![
            nft_transfer(collection(), Address::repeat_byte(0x22), account(), 10, 0),
            nft_transfer(collection(), Address::repeat_byte(0x22), other_account(), 20, 0),
        ],
        gate: Some(Gate {
            account: account(),
            entered: entered_tx,
            release: Arc::clone(&release),
        }),
        ..Default::default()
    };
    let pipeline = Arc::new(pipeline(fetcher, Ok(Some(proxy()))));
    let mut updates = pipeline.subscribe();

    let first = {
        let pipeline = Arc::clone(&pipeline);
        tokio::spawn(async move { pipeline.load(EventsQuery::new(account(), CHAIN)).await })
    };
    entered_rx.recv().await.unwrap();

    let second = pipeline
        .load(EventsQuery::new(other_account(), CHAIN))
        .await
        .unwrap();
    let bundle = second.events.clone().unwrap();
    assert_eq!(bundle.transfer_to.len(), 1);
    assert_eq!(bundle.transfer_to[0].account, other_account());

    release.add_permits(64);
    assert!(first.await.unwrap().is_none());

    assert_eq!(pipeline.current_generation().await.value(), 2);
    assert_eq!(pipeline.snapshot(), second);
    assert_eq!(*updates.borrow_and_update(), second);
}
