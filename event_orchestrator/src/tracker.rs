use crate::snapshot::{assemble, EventsSnapshot, SnapshotInputs};
use allowance_core::{
    parse_logs, synthesize_from_states, Address, ApprovalEvent, ChainId, EventsError,
    ImplicitApprovalPolicy, LoadState, LogStream, ParseContext, RawLog,
};
use std::collections::HashMap;
use tracing::debug;

/// Identity of one `(account, chain)` request. Results carry the generation
/// they were issued for and are dropped once a newer request has started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Generation(u64);

impl Generation {
    pub fn value(&self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventsQuery {
    pub account: Address,
    pub chain_id: ChainId,
}

impl EventsQuery {
    pub fn new(account: Address, chain_id: ChainId) -> Self {
        Self { account, chain_id }
    }
}

/// A finished fetch
#[derive(Debug, Clone)]
pub enum StreamUpdate {
    Logs(LogStream, Result<Vec<RawLog>, EventsError>),
    Proxy(Result<Option<Address>, EventsError>),
    Secondary(Result<Vec<ApprovalEvent>, EventsError>),
}

/// Holds the per-input state of the current request and derives snapshots
/// from it. Single writer: callers serialize access.
#[derive(Debug, Default)]
pub struct EventsTracker {
    generation: Generation,
    query: Option<EventsQuery>,
    policies: HashMap<ChainId, ImplicitApprovalPolicy>,
    transfer_from: LoadState<Vec<ApprovalEvent>>,
    transfer_to: LoadState<Vec<ApprovalEvent>>,
    approval: LoadState<Vec<ApprovalEvent>>,
    approval_for_all: LoadState<Vec<ApprovalEvent>>,
    proxy: LoadState<Option<Address>>,
    secondary: LoadState<Vec<ApprovalEvent>>,
}

impl EventsTracker {
    pub fn new(policies: HashMap<ChainId, ImplicitApprovalPolicy>) -> Self {
        Self {
            policies,
            ..Self::default()
        }
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn query(&self) -> Option<EventsQuery> {
        self.query
    }

    /// Begin a new request; every input goes back to pending
    pub fn start(&mut self, query: EventsQuery) -> Generation {
        self.generation = Generation(self.generation.0 + 1);
        self.query = Some(query);
        self.transfer_from = LoadState::Pending;
        self.transfer_to = LoadState::Pending;
        self.approval = LoadState::Pending;
        self.approval_for_all = LoadState::Pending;
        self.proxy = LoadState::Pending;
        self.secondary = LoadState::Pending;

        debug!(
            "Generation {} started for {} on chain {}",
            self.generation.0, query.account, query.chain_id
        );
        self.generation
    }

    /// Record a finished fetch. Returns false (and changes nothing) when the
    /// update belongs to an older generation.
    pub fn apply(&mut self, generation: Generation, update: StreamUpdate) -> bool {
        let Some(query) = self.query else {
            return false;
        };
        if generation != self.generation {
            debug!(
                "Discarding result of generation {} (current {})",
                generation.0, self.generation.0
            );
            return false;
        }

        match update {
            StreamUpdate::Logs(stream, result) => {
                let ctx = ParseContext::new(query.chain_id, query.account)
                    .with_direction(stream.transfer_direction());
                let parsed =
                    LoadState::from_result(result).and_then(|logs| parse_logs(&logs, &ctx));
                *self.stream_mut(stream) = parsed;
            }
            StreamUpdate::Proxy(result) => self.proxy = LoadState::from_result(result),
            StreamUpdate::Secondary(result) => self.secondary = LoadState::from_result(result),
        }

        true
    }

    fn stream_mut(&mut self, stream: LogStream) -> &mut LoadState<Vec<ApprovalEvent>> {
        match stream {
            LogStream::TransferFrom => &mut self.transfer_from,
            LogStream::TransferTo => &mut self.transfer_to,
            LogStream::Approval => &mut self.approval,
            LogStream::ApprovalForAll => &mut self.approval_for_all,
        }
    }

    /// Recompute the consumer view from the current inputs
    pub fn snapshot(&self) -> EventsSnapshot {
        let Some(query) = self.query else {
            return EventsSnapshot::idle();
        };

        let policy = self
            .policies
            .get(&query.chain_id)
            .cloned()
            .unwrap_or_default();

        let patches = synthesize_from_states(
            query.account,
            &self.proxy,
            &policy,
            &self.approval,
            &self.approval_for_all,
            &self.transfer_from,
            &self.transfer_to,
        );

        let approval_for_all = self
            .approval_for_all
            .clone()
            .zip(patches)
            .map(|(mut explicit, patches)| {
                explicit.extend(patches);
                explicit
            });

        assemble(SnapshotInputs {
            transfer_from: self.transfer_from.clone(),
            transfer_to: self.transfer_to.clone(),
            approval: self.approval.clone(),
            approval_for_all,
            permit2_approval: self.secondary.clone(),
            proxy: self.proxy.status(),
        })
    }
}
