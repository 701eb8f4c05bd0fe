//! Outbound consensus events.
//!
//! Processing a header returns these as values; delivery to governance and
//! economic collaborators is the caller's concern.

use aedpos_types::{BlockHeight, MinerId, RevealProvenance, RoundNumber, TermNumber};

/// Something the outside world should hear about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsensusEvent {
    /// The confirmed irreversible height advanced.
    IrreversibleHeightAdvanced {
        /// The newly confirmed height.
        height: BlockHeight,
        /// The round whose reports established it.
        round: RoundNumber,
    },

    /// A miner crossed the missed-slot tolerance and should be replaced.
    ///
    /// Report only; removal is driven by the election collaborator.
    EvilMinerDetected {
        /// The flagged miner.
        miner: MinerId,
        /// Its accumulated missed time slots.
        missed_time_slots: u64,
    },

    /// A new term began with a fresh committee.
    TermChanged {
        /// The new term number.
        term: TermNumber,
    },

    /// A miner's previous-round secret became known.
    SecretRevealed {
        /// Whose secret was revealed.
        miner: MinerId,
        /// The round the reveal was recorded in.
        round: RoundNumber,
        /// How the value became known.
        provenance: RevealProvenance,
    },
}
