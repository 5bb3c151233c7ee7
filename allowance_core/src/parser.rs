use crate::error::{EventsError, Result};
use crate::topics::{known_selectors, topic_to_address, TransferDirection};
use crate::types::{
    ApprovalEvent, ApprovalOrigin, ChainId, EventPayload, RawLog, TokenValue,
};
use alloy_primitives::{Address, B256, U256};
use tracing::debug;

const WORD: usize = 32;

/// Context a raw log is parsed in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseContext {
    pub chain_id: ChainId,
    pub account: Address,
    /// Direction implied by the stream the log was fetched from. Without it the
    /// direction of a transfer is inferred from the recipient.
    pub direction: Option<TransferDirection>,
}

impl ParseContext {
    pub fn new(chain_id: ChainId, account: Address) -> Self {
        Self {
            chain_id,
            account,
            direction: None,
        }
    }

    pub fn with_direction(mut self, direction: Option<TransferDirection>) -> Self {
        self.direction = direction;
        self
    }
}

/// Parse a sequence of logs, preserving order. The first malformed log aborts.
pub fn parse_logs(logs: &[RawLog], ctx: &ParseContext) -> Result<Vec<ApprovalEvent>> {
    let events = logs
        .iter()
        .map(|log| parse_log(log, ctx))
        .collect::<Result<Vec<_>>>()?;

    debug!(
        "Parsed {} logs for {} on chain {}",
        events.len(),
        ctx.account,
        ctx.chain_id
    );

    Ok(events)
}

/// Parse one raw log into its canonical record, dispatching on topic 0
pub fn parse_log(log: &RawLog, ctx: &ParseContext) -> Result<ApprovalEvent> {
    let selectors = known_selectors();
    let selector = log
        .topics
        .first()
        .ok_or_else(|| malformed(log, "log has no topics"))?;

    let payload = if *selector == selectors.transfer {
        parse_transfer(log, ctx)?
    } else if *selector == selectors.approval {
        parse_approval(log)?
    } else if *selector == selectors.approval_for_all {
        parse_approval_for_all(log)?
    } else if *selector == selectors.permit2_approval || *selector == selectors.permit2_permit {
        parse_permit2_allowance(log)?
    } else if *selector == selectors.permit2_lockdown {
        parse_permit2_lockdown(log)?
    } else {
        return Err(malformed(log, format!("unrecognized event selector {}", selector)));
    };

    Ok(ApprovalEvent {
        chain_id: ctx.chain_id,
        account: ctx.account,
        contract: log.address,
        position: log.position(),
        transaction_hash: log.transaction_hash,
        payload,
    })
}

fn parse_transfer(log: &RawLog, ctx: &ParseContext) -> Result<EventPayload> {
    let from = address_topic(log, 1)?;
    let to = address_topic(log, 2)?;
    let value = token_value(log)?;

    let direction = match ctx.direction {
        Some(TransferDirection::In) if to != ctx.account => {
            return Err(malformed(log, "incoming transfer is not addressed to the account"));
        }
        Some(TransferDirection::Out) if from != ctx.account => {
            return Err(malformed(log, "outgoing transfer was not sent by the account"));
        }
        Some(direction) => direction,
        None if to == ctx.account => TransferDirection::In,
        None if from == ctx.account => TransferDirection::Out,
        None => return Err(malformed(log, "transfer does not involve the account")),
    };

    Ok(match direction {
        TransferDirection::In => EventPayload::TransferIn { from, value },
        TransferDirection::Out => EventPayload::TransferOut { to, value },
    })
}

fn parse_approval(log: &RawLog) -> Result<EventPayload> {
    let spender = address_topic(log, 2)?;
    let value = token_value(log)?;
    Ok(EventPayload::Approval { spender, value })
}

fn parse_approval_for_all(log: &RawLog) -> Result<EventPayload> {
    expect_topics(log, 3)?;
    let operator = address_topic(log, 2)?;
    let word = data_word(log, 0)?;

    if word[..WORD - 1].iter().any(|b| *b != 0) || word[WORD - 1] > 1 {
        return Err(malformed(log, "approved flag is not a boolean"));
    }

    Ok(EventPayload::ApprovalForAll {
        operator,
        approved: word[WORD - 1] == 1,
        origin: ApprovalOrigin::Observed,
    })
}

/// Permit2 `Approval` and `Permit` share the (owner, token, spender) indexing
/// and start their data with (amount, expiration)
fn parse_permit2_allowance(log: &RawLog) -> Result<EventPayload> {
    expect_topics(log, 4)?;
    let token = address_topic(log, 2)?;
    let spender = address_topic(log, 3)?;
    let amount = U256::from_be_slice(data_word(log, 0)?);
    let expiration = small_uint(log, data_word(log, 1)?)?;

    Ok(EventPayload::Permit2Approval {
        token,
        spender,
        amount,
        expiration,
    })
}

/// `Lockdown(owner indexed, token, spender)` zeroes an allowance
fn parse_permit2_lockdown(log: &RawLog) -> Result<EventPayload> {
    expect_topics(log, 2)?;
    let token = word_address(log, data_word(log, 0)?)?;
    let spender = word_address(log, data_word(log, 1)?)?;

    Ok(EventPayload::Permit2Approval {
        token,
        spender,
        amount: U256::ZERO,
        expiration: 0,
    })
}

/// Fungible events carry the amount in data, NFT events index the token id
fn token_value(log: &RawLog) -> Result<TokenValue> {
    match log.topics.len() {
        3 => {
            if log.data.len() != WORD {
                return Err(malformed(
                    log,
                    format!("expected 32 bytes of data, got {}", log.data.len()),
                ));
            }
            Ok(TokenValue::Amount(U256::from_be_slice(&log.data)))
        }
        4 => {
            if !log.data.is_empty() {
                return Err(malformed(log, "NFT event carries unexpected data"));
            }
            Ok(TokenValue::TokenId(U256::from_be_bytes(log.topics[3].0)))
        }
        n => Err(malformed(log, format!("expected 3 or 4 topics, got {}", n))),
    }
}

fn expect_topics(log: &RawLog, count: usize) -> Result<()> {
    if log.topics.len() != count {
        return Err(malformed(
            log,
            format!("expected {} topics, got {}", count, log.topics.len()),
        ));
    }
    Ok(())
}

fn address_topic(log: &RawLog, index: usize) -> Result<Address> {
    let topic: &B256 = log
        .topics
        .get(index)
        .ok_or_else(|| malformed(log, format!("missing topic {}", index)))?;
    topic_to_address(topic)
        .ok_or_else(|| malformed(log, format!("topic {} is not an address", index)))
}

fn data_word(log: &RawLog, index: usize) -> Result<&[u8]> {
    log.data
        .get(index * WORD..(index + 1) * WORD)
        .ok_or_else(|| malformed(log, format!("data is missing word {}", index)))
}

fn word_address(log: &RawLog, word: &[u8]) -> Result<Address> {
    if word[..12].iter().any(|b| *b != 0) {
        return Err(malformed(log, "data word is not an address"));
    }
    Ok(Address::from_slice(&word[12..]))
}

fn small_uint(log: &RawLog, word: &[u8]) -> Result<u64> {
    if word[..WORD - 8].iter().any(|b| *b != 0) {
        return Err(malformed(log, "integer does not fit in 64 bits"));
    }
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&word[WORD - 8..]);
    Ok(u64::from_be_bytes(bytes))
}

fn malformed(log: &RawLog, message: impl Into<String>) -> EventsError {
    EventsError::parse(log.position(), message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topics::address_to_topic;
    use crate::types::EventKind;
    use alloy_primitives::Bytes;

    fn account() -> Address {
        Address::repeat_byte(0x11)
    }

    fn other() -> Address {
        Address::repeat_byte(0x22)
    }

    fn word(value: u64) -> Vec<u8> {
        U256::from(value).to_be_bytes::<32>().to_vec()
    }

    fn raw(topics: Vec<B256>, data: Vec<u8>) -> RawLog {
        RawLog {
            address: Address::repeat_byte(0xcc),
            topics,
            data: Bytes::from(data),
            block_number: 100,
            transaction_index: 2,
            log_index: 7,
            transaction_hash: Some(B256::repeat_byte(0xee)),
        }
    }

    #[test]
    fn test_parse_erc20_transfer_in() {
        let s = known_selectors();
        let log = raw(
            vec![s.transfer, address_to_topic(other()), address_to_topic(account())],
            word(500),
        );

        let event = parse_log(&log, &ParseContext::new(1, account())).unwrap();
        assert_eq!(event.kind(), EventKind::TransferIn);
        assert_eq!(event.counterparty(), other());
        assert_eq!(event.contract, Address::repeat_byte(0xcc));
        assert_eq!(
            event.payload,
            EventPayload::TransferIn {
                from: other(),
                value: TokenValue::Amount(U256::from(500)),
            }
        );
    }

    #[test]
    fn test_parse_nft_transfer_out() {
        let s = known_selectors();
        let token_id = B256::from(U256::from(1234).to_be_bytes::<32>());
        let log = raw(
            vec![s.transfer, address_to_topic(account()), address_to_topic(other()), token_id],
            vec![],
        );

        let ctx = ParseContext::new(1, account()).with_direction(Some(TransferDirection::Out));
        let event = parse_log(&log, &ctx).unwrap();
        assert_eq!(
            event.payload,
            EventPayload::TransferOut {
                to: other(),
                value: TokenValue::TokenId(U256::from(1234)),
            }
        );
    }

    #[test]
    fn test_self_transfer_follows_stream_direction() {
        let s = known_selectors();
        let log = raw(
            vec![s.transfer, address_to_topic(account()), address_to_topic(account())],
            word(1),
        );

        let out = ParseContext::new(1, account()).with_direction(Some(TransferDirection::Out));
        assert_eq!(parse_log(&log, &out).unwrap().kind(), EventKind::TransferOut);

        let inbound = ParseContext::new(1, account()).with_direction(Some(TransferDirection::In));
        assert_eq!(parse_log(&log, &inbound).unwrap().kind(), EventKind::TransferIn);
    }

    #[test]
    fn test_transfer_against_wrong_direction_is_rejected() {
        let s = known_selectors();
        let log = raw(
            vec![s.transfer, address_to_topic(other()), address_to_topic(account())],
            word(1),
        );

        let ctx = ParseContext::new(1, account()).with_direction(Some(TransferDirection::Out));
        assert!(matches!(parse_log(&log, &ctx), Err(EventsError::Parse { .. })));
    }

    #[test]
    fn test_parse_approval_for_all() {
        let s = known_selectors();
        let log = raw(
            vec![s.approval_for_all, address_to_topic(account()), address_to_topic(other())],
            word(1),
        );

        let event = parse_log(&log, &ParseContext::new(5, account())).unwrap();
        assert_eq!(event.chain_id, 5);
        assert_eq!(
            event.payload,
            EventPayload::ApprovalForAll {
                operator: other(),
                approved: true,
                origin: ApprovalOrigin::Observed,
            }
        );
        assert!(!event.is_inferred());
    }

    #[test]
    fn test_non_boolean_approved_flag_is_rejected() {
        let s = known_selectors();
        let log = raw(
            vec![s.approval_for_all, address_to_topic(account()), address_to_topic(other())],
            word(2),
        );

        let err = parse_log(&log, &ParseContext::new(1, account())).unwrap_err();
        assert_eq!(err, EventsError::parse(log.position(), "approved flag is not a boolean"));
    }

    #[test]
    fn test_parse_erc721_approval() {
        let s = known_selectors();
        let log = raw(
            vec![
                s.approval,
                address_to_topic(account()),
                address_to_topic(other()),
                B256::from(U256::from(9).to_be_bytes::<32>()),
            ],
            vec![],
        );

        let event = parse_log(&log, &ParseContext::new(1, account())).unwrap();
        assert_eq!(
            event.payload,
            EventPayload::Approval {
                spender: other(),
                value: TokenValue::TokenId(U256::from(9)),
            }
        );
    }

    #[test]
    fn test_parse_permit2_approval_and_lockdown() {
        let s = known_selectors();
        let token = Address::repeat_byte(0x33);

        let mut data = word(1_000);
        data.extend(word(1_700_000_000));
        let approval = raw(
            vec![
                s.permit2_approval,
                address_to_topic(account()),
                address_to_topic(token),
                address_to_topic(other()),
            ],
            data,
        );

        let event = parse_log(&approval, &ParseContext::new(1, account())).unwrap();
        assert_eq!(event.token(), token);
        assert_eq!(
            event.payload,
            EventPayload::Permit2Approval {
                token,
                spender: other(),
                amount: U256::from(1_000),
                expiration: 1_700_000_000,
            }
        );

        let mut lockdown_data = address_to_topic(token).to_vec();
        lockdown_data.extend(address_to_topic(other()).to_vec());
        let lockdown = raw(vec![s.permit2_lockdown, address_to_topic(account())], lockdown_data);

        let event = parse_log(&lockdown, &ParseContext::new(1, account())).unwrap();
        assert_eq!(
            event.payload,
            EventPayload::Permit2Approval {
                token,
                spender: other(),
                amount: U256::ZERO,
                expiration: 0,
            }
        );
    }

    #[test]
    fn test_unknown_selector_is_parse_error() {
        let log = raw(vec![B256::repeat_byte(9)], vec![]);
        assert!(matches!(
            parse_log(&log, &ParseContext::new(1, account())),
            Err(EventsError::Parse { .. })
        ));

        let empty = raw(vec![], vec![]);
        assert!(parse_log(&empty, &ParseContext::new(1, account())).is_err());
    }

    #[test]
    fn test_parsing_is_deterministic_and_order_preserving() {
        let s = known_selectors();
        let logs: Vec<RawLog> = (0..3)
            .map(|i| {
                let mut log = raw(
                    vec![s.approval, address_to_topic(account()), address_to_topic(other())],
                    word(i),
                );
                log.log_index = i;
                log
            })
            .collect();

        let ctx = ParseContext::new(1, account());
        let first = parse_logs(&logs, &ctx).unwrap();
        let second = parse_logs(&logs, &ctx).unwrap();

        assert_eq!(first, second);
        assert!(first.windows(2).all(|pair| pair[0].position < pair[1].position));
    }
}
