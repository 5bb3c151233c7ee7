//! Synthesis of implicit operator approvals.
//!
//! Some older NFT collections treat the account's marketplace proxy as an
//! approved operator without ever emitting `ApprovalForAll` for it. Tokens of
//! such a collection can then be moved through the proxy while the chain shows
//! no grant at all. For every collection on the policy list that the account
//! has moved tokens of, we add one inferred grant to the proxy so consumers see
//! a consistent permission history.

use crate::load_state::LoadState;
use crate::types::{ApprovalEvent, ApprovalOrigin, EventPayload};
use alloy_primitives::Address;
use std::collections::BTreeMap;
use tracing::debug;

/// Collections known to implicitly approve the marketplace proxy on one chain
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImplicitApprovalPolicy {
    collections: Vec<Address>,
}

impl ImplicitApprovalPolicy {
    pub fn new(collections: Vec<Address>) -> Self {
        Self { collections }
    }

    pub fn covers(&self, contract: &Address) -> bool {
        self.collections.contains(contract)
    }

    pub fn is_empty(&self) -> bool {
        self.collections.is_empty()
    }
}

/// Synthesize inferred `ApprovalForAll` grants from every observed record.
///
/// `observed` is the union of approval, approval-for-all and transfer records.
/// The result only contains new records and is ordered by position.
pub fn synthesize_patches<'a>(
    account: Address,
    proxy: Option<Address>,
    policy: &ImplicitApprovalPolicy,
    observed: impl IntoIterator<Item = &'a ApprovalEvent>,
) -> Vec<ApprovalEvent> {
    let Some(proxy) = proxy else {
        return Vec::new();
    };
    if policy.is_empty() {
        return Vec::new();
    }

    let observed: Vec<&ApprovalEvent> = observed.into_iter().collect();

    // Earliest qualifying transfer per collection
    let mut earliest: BTreeMap<Address, &ApprovalEvent> = BTreeMap::new();
    for event in observed.iter().copied() {
        if !event.is_transfer() || event.account != account || !policy.covers(&event.contract) {
            continue;
        }
        earliest
            .entry(event.contract)
            .and_modify(|current| {
                if event.position < current.position {
                    *current = event;
                }
            })
            .or_insert(event);
    }

    let mut patches: Vec<ApprovalEvent> = earliest
        .into_values()
        .filter(|transfer| {
            let explicit = observed.iter().any(|event| {
                event.contract == transfer.contract
                    && event.account == account
                    && event.position <= transfer.position
                    && matches!(
                        event.payload,
                        EventPayload::ApprovalForAll {
                            operator,
                            origin: ApprovalOrigin::Observed,
                            ..
                        } if operator == proxy
                    )
            });

            if explicit {
                debug!(
                    "Explicit ApprovalForAll for proxy {} on {} already covers transfer at {}",
                    proxy, transfer.contract, transfer.position
                );
            }
            !explicit
        })
        .map(|transfer| ApprovalEvent {
            chain_id: transfer.chain_id,
            account,
            contract: transfer.contract,
            position: transfer.position.preceding(),
            transaction_hash: None,
            payload: EventPayload::ApprovalForAll {
                operator: proxy,
                approved: true,
                origin: ApprovalOrigin::Inferred,
            },
        })
        .collect();

    patches.sort_by_key(|patch| patch.position);

    if !patches.is_empty() {
        debug!(
            "Synthesized {} implicit ApprovalForAll grants to proxy {} for {}",
            patches.len(),
            proxy,
            account
        );
    }

    patches
}

/// Gated variant: only runs once all four record sets are resolved.
///
/// A proxy that is still resolving (or failed to resolve) yields no patches
/// rather than blocking; the caller reports its state separately.
pub fn synthesize_from_states(
    account: Address,
    proxy: &LoadState<Option<Address>>,
    policy: &ImplicitApprovalPolicy,
    approval: &LoadState<Vec<ApprovalEvent>>,
    approval_for_all: &LoadState<Vec<ApprovalEvent>>,
    transfer_from: &LoadState<Vec<ApprovalEvent>>,
    transfer_to: &LoadState<Vec<ApprovalEvent>>,
) -> LoadState<Vec<ApprovalEvent>> {
    let inputs = approval
        .as_ref()
        .zip(approval_for_all.as_ref())
        .zip(transfer_from.as_ref())
        .zip(transfer_to.as_ref());

    inputs.map(|(((approval, approval_for_all), transfer_from), transfer_to)| {
        let proxy = proxy.ready().copied().flatten();
        synthesize_patches(
            account,
            proxy,
            policy,
            approval
                .iter()
                .chain(approval_for_all.iter())
                .chain(transfer_from.iter())
                .chain(transfer_to.iter()),
        )
    })
}
