//! Domain-specific identifier types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Miner identifier: the validator's 32-byte public key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MinerId(pub [u8; 32]);

impl MinerId {
    /// Create a MinerId from raw public key bytes.
    ///
    /// # Panics
    ///
    /// Panics if bytes length is not exactly 32.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        assert_eq!(bytes.len(), 32, "MinerId must be exactly 32 bytes");
        let mut arr = [0u8; 32];
        arr.copy_from_slice(bytes);
        Self(arr)
    }

    /// Get the bytes as a slice.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for MinerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MinerId({}..)", &hex::encode(&self.0[..4]))
    }
}

impl fmt::Display for MinerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..", &hex::encode(&self.0[..4]))
    }
}

/// Round number, starting from 1 at genesis.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct RoundNumber(pub u64);

impl RoundNumber {
    /// The first round of the chain.
    pub const FIRST: Self = RoundNumber(1);

    /// Get the next round number.
    pub fn next(self) -> Self {
        RoundNumber(self.0 + 1)
    }
}

impl fmt::Display for RoundNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Round({})", self.0)
    }
}

/// Term number, starting from 1 at genesis.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct TermNumber(pub u64);

impl TermNumber {
    /// The first term of the chain.
    pub const FIRST: Self = TermNumber(1);

    /// Get the next term number.
    pub fn next(self) -> Self {
        TermNumber(self.0 + 1)
    }
}

impl fmt::Display for TermNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Term({})", self.0)
    }
}

/// Block height.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct BlockHeight(pub u64);

impl BlockHeight {
    /// Genesis block height.
    pub const GENESIS: Self = BlockHeight(0);

    /// Get the next block height.
    pub fn next(self) -> Self {
        BlockHeight(self.0 + 1)
    }

    /// Get the previous block height (returns None if at genesis).
    pub fn prev(self) -> Option<Self> {
        if self.0 > 0 {
            Some(BlockHeight(self.0 - 1))
        } else {
            None
        }
    }
}

impl fmt::Display for BlockHeight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Block({})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_height_next_prev() {
        let height = BlockHeight(10);
        assert_eq!(height.next(), BlockHeight(11));
        assert_eq!(height.prev(), Some(BlockHeight(9)));

        assert_eq!(BlockHeight::GENESIS.prev(), None);
        assert_eq!(BlockHeight::GENESIS.next(), BlockHeight(1));
    }

    #[test]
    fn test_round_and_term_next() {
        assert_eq!(RoundNumber::FIRST.next(), RoundNumber(2));
        assert_eq!(TermNumber::FIRST.next(), TermNumber(2));
    }

    #[test]
    fn test_miner_id_bytes() {
        let bytes = [7u8; 32];
        let id = MinerId(bytes);
        assert_eq!(id.as_bytes(), &bytes);
        assert_eq!(id, MinerId::from_bytes(&bytes));
    }
}
