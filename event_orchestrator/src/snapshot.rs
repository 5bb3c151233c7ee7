use allowance_core::{ApprovalEvent, EventsBundle, EventsError, LoadState, LoadStatus};
use serde::{Serialize, Serializer};

/// What consumers see after every recomputation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EventsSnapshot {
    /// Present only when every stream loaded without error
    pub events: Option<EventsBundle>,
    pub is_loading: bool,
    #[serde(serialize_with = "serialize_error")]
    pub error: Option<EventsError>,
}

fn serialize_error<S: Serializer>(
    error: &Option<EventsError>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match error {
        Some(e) => serializer.serialize_some(&e.to_string()),
        None => serializer.serialize_none(),
    }
}

impl EventsSnapshot {
    /// No account has been requested yet
    pub fn idle() -> Self {
        Self::default()
    }

    pub fn is_complete(&self) -> bool {
        self.events.is_some()
    }
}

/// Per-stream inputs of a snapshot, in error-priority order
#[derive(Debug, Clone, Default)]
pub struct SnapshotInputs {
    pub transfer_from: LoadState<Vec<ApprovalEvent>>,
    pub transfer_to: LoadState<Vec<ApprovalEvent>>,
    pub approval: LoadState<Vec<ApprovalEvent>>,
    /// Explicit records followed by synthesized patches
    pub approval_for_all: LoadState<Vec<ApprovalEvent>>,
    pub permit2_approval: LoadState<Vec<ApprovalEvent>>,
    /// Proxy resolution, reported after the five streams
    pub proxy: LoadStatus,
}

/// Reduce the inputs into a snapshot. The bundle is only built when nothing
/// is loading and nothing failed.
pub fn assemble(inputs: SnapshotInputs) -> EventsSnapshot {
    let status: LoadStatus = [
        inputs.transfer_from.status(),
        inputs.transfer_to.status(),
        inputs.approval.status(),
        inputs.approval_for_all.status(),
        inputs.permit2_approval.status(),
        inputs.proxy,
    ]
    .into_iter()
    .collect();

    if !status.is_settled_ok() {
        return EventsSnapshot {
            events: None,
            is_loading: status.is_loading,
            error: status.error,
        };
    }

    let events = inputs
        .transfer_from
        .zip(inputs.transfer_to)
        .zip(inputs.approval)
        .zip(inputs.approval_for_all)
        .zip(inputs.permit2_approval)
        .map(
            |((((transfer_from, transfer_to), approval), approval_for_all), permit2_approval)| {
                EventsBundle {
                    transfer_from,
                    transfer_to,
                    approval,
                    approval_for_all,
                    permit2_approval,
                }
            },
        );

    match events {
        LoadState::Ready(bundle) => EventsSnapshot {
            events: Some(bundle),
            is_loading: false,
            error: None,
        },
        other => EventsSnapshot {
            events: None,
            is_loading: other.is_loading(),
            error: other.error().cloned(),
        },
    }
}
