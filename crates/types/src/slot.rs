//! Per-miner round state.

use crate::{BlockHeight, Hash, MinerId, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How a miner's previous-round secret became known.
///
/// A pseudo value must never silently stand in for the real secret, so the
/// provenance is part of the record rather than a detail of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RevealProvenance {
    /// The miner disclosed its own secret in a main-block update.
    Direct,
    /// Reconstructed from a threshold of published decrypted shares.
    Reconstructed,
    /// Deterministic liveness fallback; not verifiable against the commitment.
    Pseudo,
}

/// A revealed previous-round secret together with its provenance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevealedSecret {
    /// The revealed `in_value`.
    pub value: Hash,
    /// How the value became known.
    pub provenance: RevealProvenance,
}

impl RevealedSecret {
    /// A directly disclosed secret.
    pub fn direct(value: Hash) -> Self {
        Self {
            value,
            provenance: RevealProvenance::Direct,
        }
    }

    /// A secret reconstructed from threshold shares.
    pub fn reconstructed(value: Hash) -> Self {
        Self {
            value,
            provenance: RevealProvenance::Reconstructed,
        }
    }

    /// A pseudo fallback value.
    pub fn pseudo(value: Hash) -> Self {
        Self {
            value,
            provenance: RevealProvenance::Pseudo,
        }
    }

    /// Whether the value can be checked against a commitment.
    pub fn is_verifiable(&self) -> bool {
        self.provenance != RevealProvenance::Pseudo
    }
}

/// One miner's state within a round.
///
/// Slots are created when the round is generated and mutated in place as the
/// committee produces blocks: the commitment is filled by the miner's main
/// update, secrets are revealed for the previous round, and counters track
/// produced and missed slots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinerSlot {
    /// The miner this slot belongs to.
    pub miner: MinerId,

    /// Position in the round's time-slot schedule, 1..=N.
    pub order: u32,

    /// Scheduled start of this miner's time slot.
    ///
    /// Always present for a committed round; `None` only during recovery of
    /// a partially decoded candidate.
    pub expected_mining_time: Option<Timestamp>,

    /// Every time this miner actually produced a block this round, append-only.
    pub actual_mining_times: Vec<Timestamp>,

    /// Blocks produced this round (main and tiny).
    pub produced_blocks: u64,

    /// Tiny (filler) blocks produced this round.
    pub produced_tiny_blocks: u64,

    /// Cumulative count of missed time slots, carried across rounds within a term.
    pub missed_time_slots: u64,

    /// This round's commitment: hash of a secret `in_value`.
    pub out_value: Option<Hash>,

    /// The revealed secret from the previous round, if known.
    pub previous_in_value: Option<RevealedSecret>,

    /// Revealed secret xor-combined with all previous-round signatures.
    pub signature: Option<Hash>,

    /// Raw next-round order derived from the signature, before conflict resolution.
    pub supposed_order_of_next_round: u32,

    /// Next-round order after conflict resolution. Zero until assigned.
    pub final_order_of_next_round: u32,

    /// Shares of this miner's `in_value`, encrypted to each peer, keyed by recipient.
    pub encrypted_pieces: BTreeMap<MinerId, Vec<u8>>,

    /// Decrypted shares of this miner's `in_value`, keyed by the peer who
    /// decrypted and published its own piece.
    pub decrypted_pieces: BTreeMap<MinerId, Vec<u8>>,

    /// The deepest height this miner personally considers irreversible.
    pub implied_irreversible_height: BlockHeight,

    /// Whether this miner holds the round's bonus production slot.
    pub is_extra_block_producer: bool,
}

impl MinerSlot {
    /// Create a fresh slot for a generated round.
    pub fn new(miner: MinerId, order: u32, expected_mining_time: Timestamp) -> Self {
        Self {
            miner,
            order,
            expected_mining_time: Some(expected_mining_time),
            actual_mining_times: Vec::new(),
            produced_blocks: 0,
            produced_tiny_blocks: 0,
            missed_time_slots: 0,
            out_value: None,
            previous_in_value: None,
            signature: None,
            supposed_order_of_next_round: 0,
            final_order_of_next_round: 0,
            encrypted_pieces: BTreeMap::new(),
            decrypted_pieces: BTreeMap::new(),
            implied_irreversible_height: BlockHeight::GENESIS,
            is_extra_block_producer: false,
        }
    }

    /// Whether this miner produced at least one block this round.
    pub fn has_produced(&self) -> bool {
        self.produced_blocks > 0
    }

    /// Whether this miner has published its commitment for this round.
    pub fn has_committed(&self) -> bool {
        self.out_value.is_some()
    }

    /// The most recent time this miner produced a block this round.
    pub fn latest_actual_mining_time(&self) -> Option<Timestamp> {
        self.actual_mining_times.last().copied()
    }

    /// Record a produced block at `time`.
    pub fn record_block(&mut self, time: Timestamp, tiny: bool) {
        self.actual_mining_times.push(time);
        self.produced_blocks += 1;
        if tiny {
            self.produced_tiny_blocks += 1;
        }
    }

    /// Update the implied irreversible height, which never decreases once set.
    ///
    /// Returns false (and leaves the slot untouched) if `height` would
    /// regress a non-zero report.
    pub fn update_implied_irreversible_height(&mut self, height: BlockHeight) -> bool {
        if self.implied_irreversible_height.0 > 0 && height < self.implied_irreversible_height {
            return false;
        }
        self.implied_irreversible_height = height;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_slot() -> MinerSlot {
        MinerSlot::new(MinerId([1u8; 32]), 1, Timestamp::from_millis(4_000))
    }

    #[test]
    fn test_record_block_counters() {
        let mut slot = make_slot();
        slot.record_block(Timestamp::from_millis(4_100), false);
        slot.record_block(Timestamp::from_millis(4_500), true);

        assert_eq!(slot.produced_blocks, 2);
        assert_eq!(slot.produced_tiny_blocks, 1);
        assert_eq!(
            slot.latest_actual_mining_time(),
            Some(Timestamp::from_millis(4_500))
        );
        assert!(slot.has_produced());
    }

    #[test]
    fn test_implied_height_never_regresses() {
        let mut slot = make_slot();
        assert!(slot.update_implied_irreversible_height(BlockHeight(100)));
        assert!(!slot.update_implied_irreversible_height(BlockHeight(90)));
        assert_eq!(slot.implied_irreversible_height, BlockHeight(100));
        assert!(slot.update_implied_irreversible_height(BlockHeight(110)));
    }

    #[test]
    fn test_pseudo_secret_is_distinguishable() {
        let direct = RevealedSecret::direct(Hash::from_bytes(b"x"));
        let pseudo = RevealedSecret::pseudo(Hash::from_bytes(b"x"));
        assert!(direct.is_verifiable());
        assert!(!pseudo.is_verifiable());
        assert_ne!(direct, pseudo);
    }
}
