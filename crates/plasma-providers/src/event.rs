//! Raw anchor-chain events.

use plasma_proof::keccak256;
use serde_json::{Map, Value};

/// A raw contract event observed on the anchor chain.
#[derive(Debug, Clone)]
pub struct AnchorEvent {
    /// Event name as emitted by the contract.
    pub name: String,
    /// Anchor block the event was logged in.
    pub block_number: u64,
    /// Position of the log within its block.
    pub log_index: u64,
    /// Hash of the anchor transaction that emitted the event.
    pub transaction_hash: [u8; 32],
    /// Decoded event fields.
    pub fields: Map<String, Value>,
}

impl AnchorEvent {
    /// Create an event.
    pub fn new(
        name: impl Into<String>,
        block_number: u64,
        log_index: u64,
        transaction_hash: [u8; 32],
        fields: Map<String, Value>,
    ) -> Self {
        Self {
            name: name.into(),
            block_number,
            log_index,
            transaction_hash,
            fields,
        }
    }

    /// Stable identity: keccak256 over the transaction hash and log index.
    ///
    /// Two observations of the same log always collapse to one identity,
    /// which is what event deduplication keys on.
    pub fn identity(&self) -> [u8; 32] {
        let mut data = Vec::with_capacity(40);
        data.extend_from_slice(&self.transaction_hash);
        data.extend_from_slice(&self.log_index.to_be_bytes());
        keccak256(&data)
    }

    /// Fetch a field as a string.
    pub fn field_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(|v| v.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_is_stable() {
        let event = AnchorEvent::new("Deposit", 10, 3, [1u8; 32], Map::new());
        assert_eq!(event.identity(), event.identity());
    }

    #[test]
    fn test_identity_distinguishes_log_index() {
        let a = AnchorEvent::new("Deposit", 10, 3, [1u8; 32], Map::new());
        let b = AnchorEvent::new("Deposit", 10, 4, [1u8; 32], Map::new());
        assert_ne!(a.identity(), b.identity());
    }

    #[test]
    fn test_identity_ignores_block_number() {
        // Identity is the log position, not where the observer saw it.
        let a = AnchorEvent::new("Deposit", 10, 3, [1u8; 32], Map::new());
        let b = AnchorEvent::new("Deposit", 11, 3, [1u8; 32], Map::new());
        assert_eq!(a.identity(), b.identity());
    }
}
