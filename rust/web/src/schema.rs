//! Binary layout of the table contract's events.
//!
//! Each payload is described once as an ordered list of named 32-byte
//! fields at fixed offsets. [`Layout::read`] checks the payload length
//! against the layout a single time; every typed getter afterwards is
//! infallible with respect to bounds.

use crate::ledger::{LedgerLog, Word};
use fairhand_engine::types::{Address, Amount, HandId, RequestId, Seed};
use sha3::{Digest, Keccak256};
use std::fmt;
use std::sync::OnceLock;
use thiserror::Error;

pub const WORD: usize = 32;

pub const HAND_STARTED_SIGNATURE: &str = "HandStarted(uint256,address,address,uint256,bytes32)";
pub const RANDOM_FULFILLED_SIGNATURE: &str = "RandomFulfilled(uint256,bytes32)";
pub const HAND_SETTLED_SIGNATURE: &str =
    "HandSettled(uint256,address,int256,address,uint256,uint256,uint256)";

/// Keccak-256 of an event signature, i.e. the log's first topic.
pub fn event_topic(signature: &str) -> Word {
    Keccak256::digest(signature.as_bytes()).into()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    HandStarted,
    RandomFulfilled,
    HandSettled,
}

impl EventKind {
    pub const ALL: [EventKind; 3] = [
        EventKind::HandStarted,
        EventKind::RandomFulfilled,
        EventKind::HandSettled,
    ];

    pub fn signature(self) -> &'static str {
        match self {
            EventKind::HandStarted => HAND_STARTED_SIGNATURE,
            EventKind::RandomFulfilled => RANDOM_FULFILLED_SIGNATURE,
            EventKind::HandSettled => HAND_SETTLED_SIGNATURE,
        }
    }

    pub fn topic(self) -> Word {
        static TOPICS: OnceLock<[Word; 3]> = OnceLock::new();
        let topics =
            TOPICS.get_or_init(|| EventKind::ALL.map(|kind| event_topic(kind.signature())));
        topics[self as usize]
    }

    pub fn from_topic(topic: &Word) -> Option<EventKind> {
        EventKind::ALL
            .into_iter()
            .find(|kind| kind.topic() == *topic)
    }

    /// Signature topic plus the indexed arguments.
    pub fn min_topics(self) -> usize {
        match self {
            EventKind::HandStarted | EventKind::HandSettled => 3,
            EventKind::RandomFulfilled => 2,
        }
    }

    pub fn layout(self) -> &'static Layout {
        match self {
            EventKind::HandStarted => &HAND_STARTED_LAYOUT,
            EventKind::RandomFulfilled => &RANDOM_FULFILLED_LAYOUT,
            EventKind::HandSettled => &HAND_SETTLED_LAYOUT,
        }
    }

    fn name(self) -> &'static str {
        match self {
            EventKind::HandStarted => "HandStarted",
            EventKind::RandomFulfilled => "RandomFulfilled",
            EventKind::HandSettled => "HandSettled",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Address,
    Uint,
    Int,
    Bytes32,
    Bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub kind: FieldKind,
    /// Byte offset into the payload.
    pub offset: usize,
}

const fn field(name: &'static str, kind: FieldKind, index: usize) -> Field {
    Field {
        name,
        kind,
        offset: index * WORD,
    }
}

/// Ordered payload fields. `optional` fields follow the required ones and
/// may be absent in older deployments.
#[derive(Debug)]
pub struct Layout {
    pub event: EventKind,
    pub required: &'static [Field],
    pub optional: &'static [Field],
}

pub static HAND_STARTED_LAYOUT: Layout = Layout {
    event: EventKind::HandStarted,
    required: &[
        field("token", FieldKind::Address, 0),
        field("amount", FieldKind::Uint, 1),
        field("request_id", FieldKind::Bytes32, 2),
    ],
    optional: &[field("premium", FieldKind::Bool, 3)],
};

pub static RANDOM_FULFILLED_LAYOUT: Layout = Layout {
    event: EventKind::RandomFulfilled,
    required: &[field("seed", FieldKind::Bytes32, 0)],
    optional: &[],
};

pub static HAND_SETTLED_LAYOUT: Layout = Layout {
    event: EventKind::HandSettled,
    required: &[
        field("pnl", FieldKind::Int, 0),
        field("payout_token", FieldKind::Address, 1),
        field("payout_amount", FieldKind::Uint, 2),
        field("fee_a", FieldKind::Uint, 3),
        field("fee_b", FieldKind::Uint, 4),
    ],
    optional: &[field("premium", FieldKind::Bool, 5)],
};

impl Layout {
    /// Smallest payload that carries every required field.
    pub fn required_len(&self) -> usize {
        self.required
            .iter()
            .map(|f| f.offset + WORD)
            .max()
            .unwrap_or(0)
    }

    fn find(&self, name: &'static str, kind: FieldKind) -> Result<&Field, MalformedEvent> {
        self.required
            .iter()
            .chain(self.optional)
            .find(|f| f.name == name && f.kind == kind)
            .ok_or(MalformedEvent::UnknownField {
                event: self.event,
                field: name,
            })
    }

    /// Bounds-checks `data` against the required fields.
    pub fn read<'a>(&'static self, data: &'a [u8]) -> Result<Payload<'a>, MalformedEvent> {
        let expected = self.required_len();
        if data.len() < expected {
            return Err(MalformedEvent::ShortPayload {
                event: self.event,
                expected,
                actual: data.len(),
            });
        }
        Ok(Payload { layout: self, data })
    }
}

/// A payload already checked against its layout.
#[derive(Debug)]
pub struct Payload<'a> {
    layout: &'static Layout,
    data: &'a [u8],
}

impl Payload<'_> {
    fn word(&self, name: &'static str, kind: FieldKind) -> Result<Option<Word>, MalformedEvent> {
        let field = self.layout.find(name, kind)?;
        Ok(self
            .data
            .get(field.offset..field.offset + WORD)
            .and_then(|bytes| bytes.try_into().ok()))
    }

    fn required(&self, name: &'static str, kind: FieldKind) -> Result<Word, MalformedEvent> {
        // `Layout::read` guarantees every required field is in range.
        self.word(name, kind)?.ok_or(MalformedEvent::ShortPayload {
            event: self.layout.event,
            expected: self.layout.required_len(),
            actual: self.data.len(),
        })
    }

    pub fn address(&self, name: &'static str) -> Result<Address, MalformedEvent> {
        Ok(Address::from_word(&self.required(name, FieldKind::Address)?))
    }

    pub fn uint(&self, name: &'static str) -> Result<Amount, MalformedEvent> {
        word_to_u128(&self.required(name, FieldKind::Uint)?).ok_or(MalformedEvent::Overflow {
            event: self.layout.event,
            field: name,
        })
    }

    pub fn int(&self, name: &'static str) -> Result<i128, MalformedEvent> {
        word_to_i128(&self.required(name, FieldKind::Int)?).ok_or(MalformedEvent::Overflow {
            event: self.layout.event,
            field: name,
        })
    }

    pub fn bytes32(&self, name: &'static str) -> Result<Word, MalformedEvent> {
        self.required(name, FieldKind::Bytes32)
    }

    /// Optional flag; an absent word reads as false.
    pub fn flag(&self, name: &'static str) -> Result<bool, MalformedEvent> {
        Ok(self
            .word(name, FieldKind::Bool)?
            .is_some_and(|w| w.iter().any(|&b| b != 0)))
    }
}

fn word_to_u128(word: &Word) -> Option<u128> {
    let (high, low) = word.split_at(16);
    if high.iter().any(|&b| b != 0) {
        return None;
    }
    low.try_into().ok().map(u128::from_be_bytes)
}

fn word_to_i128(word: &Word) -> Option<i128> {
    let (high, low) = word.split_at(16);
    let value = i128::from_be_bytes(low.try_into().ok()?);
    let sign_fill = if value < 0 { 0xff } else { 0x00 };
    high.iter().all(|&b| b == sign_fill).then_some(value)
}

fn word_to_u64(word: &Word) -> Option<u64> {
    let (high, low) = word.split_at(24);
    if high.iter().any(|&b| b != 0) {
        return None;
    }
    low.try_into().ok().map(u64::from_be_bytes)
}

pub fn uint_word(value: u128) -> Word {
    let mut word = [0u8; WORD];
    word[16..].copy_from_slice(&value.to_be_bytes());
    word
}

pub fn int_word(value: i128) -> Word {
    let mut word = if value < 0 { [0xffu8; WORD] } else { [0u8; WORD] };
    word[16..].copy_from_slice(&value.to_be_bytes());
    word
}

pub fn address_word(address: Address) -> Word {
    let mut word = [0u8; WORD];
    word[12..].copy_from_slice(&address.0);
    word
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MalformedEvent {
    #[error("log has no topics")]
    NoTopics,
    #[error("unrecognized event signature {0}")]
    UnknownSignature(String),
    #[error("{event} needs {expected} topics, got {actual}")]
    TooFewTopics {
        event: EventKind,
        expected: usize,
        actual: usize,
    },
    #[error("{event} payload is {actual} bytes, need at least {expected}")]
    ShortPayload {
        event: EventKind,
        expected: usize,
        actual: usize,
    },
    #[error("{event} field {field} does not fit")]
    Overflow {
        event: EventKind,
        field: &'static str,
    },
    #[error("{event} layout has no field {field}")]
    UnknownField {
        event: EventKind,
        field: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandStarted {
    pub hand_id: HandId,
    pub player: Address,
    pub token: Address,
    pub amount: Amount,
    pub request_id: RequestId,
    pub premium: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RandomFulfilled {
    pub hand_id: HandId,
    pub seed: Seed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandSettled {
    pub hand_id: HandId,
    pub player: Address,
    /// Player profit and loss, signed.
    pub pnl: i128,
    pub payout_token: Address,
    pub payout_amount: Amount,
    pub fee_a: Amount,
    pub fee_b: Amount,
    pub premium: bool,
}

/// A decoded table event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainEvent {
    HandStarted(HandStarted),
    RandomFulfilled(RandomFulfilled),
    HandSettled(HandSettled),
}

impl ChainEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ChainEvent::HandStarted(_) => EventKind::HandStarted,
            ChainEvent::RandomFulfilled(_) => EventKind::RandomFulfilled,
            ChainEvent::HandSettled(_) => EventKind::HandSettled,
        }
    }

    pub fn hand_id(&self) -> HandId {
        match self {
            ChainEvent::HandStarted(e) => e.hand_id,
            ChainEvent::RandomFulfilled(e) => e.hand_id,
            ChainEvent::HandSettled(e) => e.hand_id,
        }
    }

    /// ABI-encodes the event as the contract would emit it.
    pub fn to_log(&self, address: Address) -> LedgerLog {
        let kind = self.kind();
        let mut topics = vec![kind.topic(), uint_word(self.hand_id() as u128)];
        let mut words: Vec<Word> = Vec::new();
        match self {
            ChainEvent::HandStarted(e) => {
                topics.push(address_word(e.player));
                words.extend([address_word(e.token), uint_word(e.amount), e.request_id.0]);
                if e.premium {
                    words.push(uint_word(1));
                }
            }
            ChainEvent::RandomFulfilled(e) => words.push(e.seed.0),
            ChainEvent::HandSettled(e) => {
                topics.push(address_word(e.player));
                words.extend([
                    int_word(e.pnl),
                    address_word(e.payout_token),
                    uint_word(e.payout_amount),
                    uint_word(e.fee_a),
                    uint_word(e.fee_b),
                ]);
                if e.premium {
                    words.push(uint_word(1));
                }
            }
        }
        LedgerLog {
            address,
            topics,
            data: words.concat(),
            block_number: None,
        }
    }
}

fn hex(word: &Word) -> String {
    word.iter().map(|b| format!("{b:02x}")).collect()
}

/// Matches the first topic against the known signatures, checks topic count
/// and payload size, then decodes through the event's layout.
pub fn decode_log(log: &LedgerLog) -> Result<ChainEvent, MalformedEvent> {
    let signature = log.topics.first().ok_or(MalformedEvent::NoTopics)?;
    let kind = EventKind::from_topic(signature)
        .ok_or_else(|| MalformedEvent::UnknownSignature(format!("0x{}", hex(signature))))?;
    if log.topics.len() < kind.min_topics() {
        return Err(MalformedEvent::TooFewTopics {
            event: kind,
            expected: kind.min_topics(),
            actual: log.topics.len(),
        });
    }
    let hand_id = word_to_u64(&log.topics[1]).ok_or(MalformedEvent::Overflow {
        event: kind,
        field: "hand_id",
    })?;
    let payload = kind.layout().read(&log.data)?;

    let event = match kind {
        EventKind::HandStarted => ChainEvent::HandStarted(HandStarted {
            hand_id,
            player: Address::from_word(&log.topics[2]),
            token: payload.address("token")?,
            amount: payload.uint("amount")?,
            request_id: RequestId(payload.bytes32("request_id")?),
            premium: payload.flag("premium")?,
        }),
        EventKind::RandomFulfilled => ChainEvent::RandomFulfilled(RandomFulfilled {
            hand_id,
            seed: Seed(payload.bytes32("seed")?),
        }),
        EventKind::HandSettled => ChainEvent::HandSettled(HandSettled {
            hand_id,
            player: Address::from_word(&log.topics[2]),
            pnl: payload.int("pnl")?,
            payout_token: payload.address("payout_token")?,
            payout_amount: payload.uint("payout_amount")?,
            fee_a: payload.uint("fee_a")?,
            fee_b: payload.uint("fee_b")?,
            premium: payload.flag("premium")?,
        }),
    };
    Ok(event)
}
