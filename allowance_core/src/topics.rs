use crate::error::{EventsError, Result};
use crate::types::LogFilter;
use alloy_primitives::{keccak256, Address, B256};
use std::sync::OnceLock;

/// A named set of event signatures, i.e. the event part of a contract ABI
#[derive(Debug, Clone, Copy)]
pub struct EventInterface {
    pub name: &'static str,
    events: &'static [(&'static str, &'static str)],
}

/// Events shared by ERC-20 and ERC-721 tokens. The two standards use the same
/// signatures and only differ in which parameters are indexed.
pub const ERC721_INTERFACE: EventInterface = EventInterface {
    name: "ERC721",
    events: &[
        ("Transfer", "Transfer(address,address,uint256)"),
        ("Approval", "Approval(address,address,uint256)"),
        ("ApprovalForAll", "ApprovalForAll(address,address,bool)"),
    ],
};

/// Allowance events of the Permit2 contract
pub const PERMIT2_INTERFACE: EventInterface = EventInterface {
    name: "Permit2",
    events: &[
        ("Approval", "Approval(address,address,address,uint160,uint48)"),
        ("Permit", "Permit(address,address,address,uint160,uint48,uint48)"),
        ("Lockdown", "Lockdown(address,address,address)"),
    ],
};

impl EventInterface {
    pub fn signature(&self, event: &str) -> Option<&'static str> {
        self.events
            .iter()
            .find(|(name, _)| *name == event)
            .map(|(_, signature)| *signature)
    }

    /// Canonical selector (topic 0) of the named event
    pub fn selector(&self, event: &str) -> Result<B256> {
        self.signature(event)
            .map(|signature| keccak256(signature.as_bytes()))
            .ok_or_else(|| EventsError::UnknownEvent {
                interface: self.name.to_string(),
                event: event.to_string(),
            })
    }
}

/// Selectors the parser dispatches on, computed once per process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnownSelectors {
    pub transfer: B256,
    pub approval: B256,
    pub approval_for_all: B256,
    pub permit2_approval: B256,
    pub permit2_permit: B256,
    pub permit2_lockdown: B256,
}

static KNOWN_SELECTORS: OnceLock<KnownSelectors> = OnceLock::new();

/// Selector of an event the built-in tables are known to contain. A missing
/// entry is a bug in the tables, not a runtime condition.
fn hash_signature(interface: &EventInterface, event: &str) -> B256 {
    match interface.selector(event) {
        Ok(selector) => selector,
        Err(e) => panic!("built-in event table is incomplete: {}", e),
    }
}

pub fn known_selectors() -> &'static KnownSelectors {
    KNOWN_SELECTORS.get_or_init(|| KnownSelectors {
        transfer: hash_signature(&ERC721_INTERFACE, "Transfer"),
        approval: hash_signature(&ERC721_INTERFACE, "Approval"),
        approval_for_all: hash_signature(&ERC721_INTERFACE, "ApprovalForAll"),
        permit2_approval: hash_signature(&PERMIT2_INTERFACE, "Approval"),
        permit2_permit: hash_signature(&PERMIT2_INTERFACE, "Permit"),
        permit2_lockdown: hash_signature(&PERMIT2_INTERFACE, "Lockdown"),
    })
}

/// Encode an address as an indexed topic (left-padded to 32 bytes)
pub fn address_to_topic(address: Address) -> B256 {
    address.into_word()
}

/// Decode an indexed address topic. Fails when the upper 12 bytes are not zero.
pub fn topic_to_address(topic: &B256) -> Option<Address> {
    if topic[..12].iter().any(|b| *b != 0) {
        return None;
    }
    Some(Address::from_word(*topic))
}

/// Which way a transfer moved relative to the tracked account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferDirection {
    In,
    Out,
}

/// The four token log streams requested for an account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogStream {
    TransferFrom,
    TransferTo,
    Approval,
    ApprovalForAll,
}

impl LogStream {
    /// Streams in error-priority order
    pub const ALL: [LogStream; 4] = [
        LogStream::TransferFrom,
        LogStream::TransferTo,
        LogStream::Approval,
        LogStream::ApprovalForAll,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            LogStream::TransferFrom => "Transfer (from)",
            LogStream::TransferTo => "Transfer (to)",
            LogStream::Approval => "Approval",
            LogStream::ApprovalForAll => "ApprovalForAll",
        }
    }

    pub fn event_name(&self) -> &'static str {
        match self {
            LogStream::TransferFrom | LogStream::TransferTo => "Transfer",
            LogStream::Approval => "Approval",
            LogStream::ApprovalForAll => "ApprovalForAll",
        }
    }

    pub fn transfer_direction(&self) -> Option<TransferDirection> {
        match self {
            LogStream::TransferFrom => Some(TransferDirection::Out),
            LogStream::TransferTo => Some(TransferDirection::In),
            LogStream::Approval | LogStream::ApprovalForAll => None,
        }
    }

    /// Topic filter selecting this stream's logs for `account`
    pub fn filter(&self, account: Address) -> Result<LogFilter> {
        let selector = ERC721_INTERFACE.selector(self.event_name())?;
        let account_topic = address_to_topic(account);

        let topics = match self {
            // Recipient is the second indexed parameter
            LogStream::TransferTo => vec![Some(selector), None, Some(account_topic)],
            LogStream::TransferFrom | LogStream::Approval | LogStream::ApprovalForAll => {
                vec![Some(selector), Some(account_topic)]
            }
        };

        Ok(LogFilter::with_topics(topics))
    }
}
