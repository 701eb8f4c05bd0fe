//! Candidate block header payloads.
//!
//! A serialized round snapshot accompanies every block. The wire format
//! itself belongs to the serialization layer; the core only requires that a
//! header decodes into these shapes.

use crate::{BlockHeight, Hash, MinerId, Round, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// What kind of consensus transition a header claims to carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HeaderKind {
    /// Main block: commitment published, previous secret revealed, next-round
    /// candidate order computed.
    Update,
    /// Filler block inside the producer's current slot.
    TinyBlock,
    /// Round termination carrying the generated next round.
    NextRound,
    /// Term termination carrying the first round of the next term.
    NextTerm,
}

impl fmt::Display for HeaderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HeaderKind::Update => "Update",
            HeaderKind::TinyBlock => "TinyBlock",
            HeaderKind::NextRound => "NextRound",
            HeaderKind::NextTerm => "NextTerm",
        };
        write!(f, "{name}")
    }
}

/// A VRF proof and its claimed output, verified against the prior round's
/// published random value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VrfEvidence {
    /// Serialized ECVRF proof bytes.
    pub proof: Vec<u8>,
    /// The random value the proof claims to derive.
    pub random_value: Hash,
}

/// A decoded consensus block header.
///
/// `round` is the snapshot as the producer left it after applying its own
/// change; validation re-derives the same snapshot from local state and
/// compares.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateHeader {
    /// The producer of this block.
    pub sender: MinerId,
    /// Height of the block carrying this header.
    pub height: BlockHeight,
    /// Claimed transition kind.
    pub kind: HeaderKind,
    /// Round snapshot after the producer's change.
    pub round: Round,
    /// Verifiable randomness for this block.
    pub vrf: VrfEvidence,
}

/// The minimal per-slot payload a main-block update carries, extracted from
/// the sender's slot in the header snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedUpdate {
    /// This round's commitment.
    pub out_value: Hash,
    /// Xor-derived signature.
    pub signature: Hash,
    /// Directly revealed previous-round secret, if disclosed.
    pub previous_in_value: Option<Hash>,
    /// When the block was produced.
    pub actual_mining_time: Timestamp,
    /// Candidate next-round order before conflict resolution.
    pub supposed_order_of_next_round: u32,
    /// Sender's view of the deepest irreversible height.
    pub implied_irreversible_height: BlockHeight,
    /// Shares of the sender's secret, encrypted per recipient.
    pub encrypted_pieces: BTreeMap<MinerId, Vec<u8>>,
    /// Shares of other miners' secrets the sender decrypted, keyed by owner.
    pub decrypted_pieces_of_others: BTreeMap<MinerId, Vec<u8>>,
}

impl CandidateHeader {
    /// Extract the sender's update payload from the snapshot.
    ///
    /// Returns None for header kinds that do not carry a main update, or
    /// when the sender's slot is incomplete.
    pub fn extracted_update(&self) -> Option<ExtractedUpdate> {
        if self.kind != HeaderKind::Update {
            return None;
        }
        let slot = self.round.slot(&self.sender)?;
        let out_value = slot.out_value?;
        let signature = slot.signature?;
        let actual_mining_time = slot.latest_actual_mining_time()?;

        // Pieces of others' secrets the sender published: its own entry in
        // every other slot's decrypted map.
        let mut decrypted_pieces_of_others = BTreeMap::new();
        for (owner, other) in &self.round.slots {
            if *owner == self.sender {
                continue;
            }
            if let Some(piece) = other.decrypted_pieces.get(&self.sender) {
                decrypted_pieces_of_others.insert(*owner, piece.clone());
            }
        }

        Some(ExtractedUpdate {
            out_value,
            signature,
            previous_in_value: slot
                .previous_in_value
                .filter(|s| s.is_verifiable())
                .map(|s| s.value),
            actual_mining_time,
            supposed_order_of_next_round: slot.supposed_order_of_next_round,
            implied_irreversible_height: slot.implied_irreversible_height,
            encrypted_pieces: slot.encrypted_pieces.clone(),
            decrypted_pieces_of_others,
        })
    }
}
