//! Domain events lifted from raw anchor events.

use crate::{SyncError, SyncResult};
use num_bigint::BigUint;
use parking_lot::RwLock;
use plasma_chain::Exit;
use plasma_proof::OwnershipState;
use plasma_providers::AnchorEvent;
use plasma_state::{Address, StateObject};
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::debug;

/// Raw name of deposit events.
pub const DEPOSIT_EVENT: &str = "Deposit";
/// Raw name of block submission events.
pub const BLOCK_SUBMITTED_EVENT: &str = "BlockSubmitted";
/// Raw name of exit start events.
pub const EXIT_STARTED_EVENT: &str = "ExitStarted";
/// Raw name of exit finalisation events.
pub const EXIT_FINALIZED_EVENT: &str = "ExitFinalized";

/// A domain event derived from the anchor chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainEvent {
    /// Coins were deposited into the plasma chain.
    Deposit(StateObject),
    /// The operator committed a plasma block.
    BlockSubmitted {
        /// Committed block number.
        number: BigUint,
        /// Sum-tree root of the block.
        root: [u8; 32],
    },
    /// An exit was started for a range.
    ExitStarted(Exit),
    /// An exit was finalised on the anchor chain.
    ExitFinalized {
        /// Token of the exited range.
        token: BigUint,
        /// Start of the exited range.
        start: BigUint,
        /// End of the exited range.
        end: BigUint,
    },
}

impl ChainEvent {
    /// Lift a raw anchor event into a domain event.
    ///
    /// Numeric fields accept JSON numbers, decimal strings and
    /// `0x`-prefixed hex strings; deposits are stamped with the ownership
    /// predicate the client is configured for.
    pub fn from_anchor(
        event: &AnchorEvent,
        ownership_predicate: Address,
    ) -> SyncResult<ChainEvent> {
        match event.name.as_str() {
            DEPOSIT_EVENT => {
                let owner = field_address(event, "owner")?;
                let token = field_biguint(event, "token")?;
                let state = OwnershipState::new(owner, token)
                    .encode()
                    .map_err(|e| malformed(event, &e.to_string()))?;
                Ok(ChainEvent::Deposit(StateObject {
                    start: field_biguint(event, "start")?,
                    end: field_biguint(event, "end")?,
                    block: field_biguint(event, "block")?,
                    predicate: ownership_predicate,
                    state,
                    implicit: false,
                    implicit_start: None,
                    implicit_end: None,
                }))
            }
            BLOCK_SUBMITTED_EVENT => Ok(ChainEvent::BlockSubmitted {
                number: field_biguint(event, "number")?,
                root: field_hash(event, "root")?,
            }),
            EXIT_STARTED_EVENT => Ok(ChainEvent::ExitStarted(Exit {
                id: field_biguint(event, "id")?,
                owner: field_address(event, "owner")?,
                token: field_biguint(event, "token")?,
                start: field_biguint(event, "start")?,
                end: field_biguint(event, "end")?,
                block: BigUint::from(event.block_number),
            })),
            EXIT_FINALIZED_EVENT => Ok(ChainEvent::ExitFinalized {
                token: field_biguint(event, "token")?,
                start: field_biguint(event, "start")?,
                end: field_biguint(event, "end")?,
            }),
            other => Err(SyncError::MalformedEvent {
                event: other.to_string(),
                message: "unrecognised event name".to_string(),
            }),
        }
    }

    /// Name of the local signal this event is emitted under.
    pub fn signal(&self) -> &'static str {
        match self {
            ChainEvent::Deposit(_) => "event:Deposit",
            ChainEvent::BlockSubmitted { .. } => "event:BlockSubmitted",
            ChainEvent::ExitStarted(_) => "event:ExitStarted",
            ChainEvent::ExitFinalized { .. } => "event:ExitFinalized",
        }
    }
}

fn malformed(event: &AnchorEvent, message: &str) -> SyncError {
    SyncError::MalformedEvent {
        event: event.name.clone(),
        message: message.to_string(),
    }
}

/// Parse a big-integer field.
fn field_biguint(event: &AnchorEvent, key: &str) -> SyncResult<BigUint> {
    let value = event
        .fields
        .get(key)
        .ok_or_else(|| malformed(event, &format!("missing field {}", key)))?;

    if let Some(number) = value.as_u64() {
        return Ok(BigUint::from(number));
    }
    if let Some(text) = value.as_str() {
        let parsed = if let Some(hex_digits) = text.strip_prefix("0x") {
            BigUint::parse_bytes(hex_digits.as_bytes(), 16)
        } else {
            BigUint::parse_bytes(text.as_bytes(), 10)
        };
        if let Some(parsed) = parsed {
            return Ok(parsed);
        }
    }
    Err(malformed(event, &format!("bad integer field {}", key)))
}

/// Parse an address field.
fn field_address(event: &AnchorEvent, key: &str) -> SyncResult<Address> {
    let text = event
        .field_str(key)
        .ok_or_else(|| malformed(event, &format!("missing field {}", key)))?;
    text.parse()
        .map_err(|_| malformed(event, &format!("bad address field {}", key)))
}

/// Parse a 32-byte hash field.
fn field_hash(event: &AnchorEvent, key: &str) -> SyncResult<[u8; 32]> {
    let text = event
        .field_str(key)
        .ok_or_else(|| malformed(event, &format!("missing field {}", key)))?;
    let bytes = hex::decode(text.strip_prefix("0x").unwrap_or(text))
        .map_err(|_| malformed(event, &format!("bad hash field {}", key)))?;
    bytes
        .as_slice()
        .try_into()
        .map_err(|_| malformed(event, &format!("hash field {} is not 32 bytes", key)))
}

/// In-process fan-out of domain events, one channel set per signal name.
///
/// Senders that went away are pruned on the next emit; a slow or dead
/// listener never poisons the emitter.
#[derive(Debug, Default)]
pub struct EventFanout {
    channels: RwLock<HashMap<String, Vec<mpsc::Sender<ChainEvent>>>>,
}

impl EventFanout {
    /// Create an empty fan-out.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to a signal with a bounded buffer.
    pub fn subscribe(&self, signal: &str, capacity: usize) -> mpsc::Receiver<ChainEvent> {
        let (tx, rx) = mpsc::channel(capacity);
        self.channels
            .write()
            .entry(signal.to_string())
            .or_default()
            .push(tx);
        rx
    }

    /// Emit an event to every live subscriber of its signal.
    pub async fn emit(&self, event: ChainEvent) {
        let signal = event.signal();
        let senders = {
            let mut channels = self.channels.write();
            if let Some(senders) = channels.get_mut(signal) {
                senders.retain(|s| !s.is_closed());
            }
            channels.get(signal).cloned().unwrap_or_default()
        };
        for sender in senders {
            if sender.send(event.clone()).await.is_err() {
                debug!(signal, "Subscriber dropped during emit");
            }
        }
    }
}
