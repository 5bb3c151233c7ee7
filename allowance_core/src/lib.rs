//! Domain core for reconstructing an account's token-approval history from
//! event logs: record types, topic derivation, log parsing, implicit-approval
//! synthesis and the load-state reduction used to gate results.

pub mod error;
pub mod load_state;
pub mod parser;
pub mod patch;
pub mod sources;
pub mod topics;
pub mod types;

pub use error::{EventsError, Result};
pub use load_state::{LoadState, LoadStatus};
pub use parser::{parse_log, parse_logs, ParseContext};
pub use patch::{synthesize_from_states, synthesize_patches, ImplicitApprovalPolicy};
pub use sources::{LogFetcher, ProxyResolver, SecondaryEventSource};
pub use topics::{
    address_to_topic, known_selectors, topic_to_address, EventInterface, LogStream,
    TransferDirection, ERC721_INTERFACE, PERMIT2_INTERFACE,
};
pub use types::*;

pub use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
