//! Validation failures.
//!
//! Every rejection of a candidate header carries a machine-readable reason
//! code. A failure is always fatal to that candidate; nothing in the core
//! retries.

use aedpos_crypto::VrfError;
use aedpos_types::{BlockHeight, MinerId, RoundNumber, TermNumber, Timestamp};
use thiserror::Error;

/// Why a candidate header was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationFailure {
    /// The header does not decode into a checkable shape.
    #[error("malformed header: {0}")]
    MalformedHeader(String),

    /// The sender holds no slot in the current round.
    #[error("miner {0} has no mining permission this round")]
    MiningPermission(MinerId),

    /// The claimed production time falls outside every window granted to
    /// the sender.
    #[error("block time {time} is outside any window granted to {miner}")]
    TimeSlot {
        /// The offending producer.
        miner: MinerId,
        /// The claimed production time.
        time: Timestamp,
    },

    /// A main-update payload is inconsistent with the base round.
    #[error("update value rejected: {0}")]
    UpdateValue(String),

    /// Two producers hold the same resolved next-round order.
    #[error("next-round order {0} is held by more than one producer")]
    DuplicateOrder(u32),

    /// A terminate header does not continue the round sequence.
    #[error("round number {got} does not follow {current}")]
    RoundContinuity {
        /// The round being terminated.
        current: RoundNumber,
        /// The round number the header claims.
        got: RoundNumber,
    },

    /// A terminate header does not continue the term sequence.
    #[error("term number {got} does not follow {current}")]
    TermContinuity {
        /// The current term.
        current: TermNumber,
        /// The term number the header claims.
        got: TermNumber,
    },

    /// A term termination arrived before the term change fell due.
    #[error("term change is not due in round {0}")]
    TermChangeNotDue(RoundNumber),

    /// The header would move the confirmed irreversible height backwards.
    #[error("irreversible height would regress from {current} to {got}")]
    LibRegression {
        /// The currently confirmed height.
        current: BlockHeight,
        /// The height the header claims.
        got: BlockHeight,
    },

    /// The sender has exhausted its tiny block quota for this round.
    #[error("tiny block limit reached for {0}")]
    ContinuousBlocks(MinerId),

    /// The locally derived round does not match the header's snapshot.
    #[error("derived round id {expected} does not match header round id {got}")]
    RoundIdMismatch {
        /// The round id derived from local state.
        expected: u64,
        /// The round id of the header snapshot.
        got: u64,
    },

    /// The local node failed to derive the successor round at all.
    #[error("round generation failed: {0}")]
    RoundGeneration(String),

    /// The VRF evidence does not verify against the prior random value.
    #[error("VRF evidence rejected: {0}")]
    VrfInvalid(#[from] VrfError),
}

impl ValidationFailure {
    /// Stable machine-readable reason code.
    pub fn code(&self) -> &'static str {
        match self {
            ValidationFailure::MalformedHeader(_) => "MALFORMED_HEADER",
            ValidationFailure::MiningPermission(_) => "MINING_PERMISSION",
            ValidationFailure::TimeSlot { .. } => "TIME_SLOT",
            ValidationFailure::UpdateValue(_) => "UPDATE_VALUE",
            ValidationFailure::DuplicateOrder(_) => "DUPLICATE_ORDER",
            ValidationFailure::RoundContinuity { .. } => "ROUND_CONTINUITY",
            ValidationFailure::TermContinuity { .. } => "TERM_CONTINUITY",
            ValidationFailure::TermChangeNotDue(_) => "TERM_CHANGE_NOT_DUE",
            ValidationFailure::LibRegression { .. } => "LIB_REGRESSION",
            ValidationFailure::ContinuousBlocks(_) => "CONTINUOUS_BLOCKS",
            ValidationFailure::RoundIdMismatch { .. } => "ROUND_ID_MISMATCH",
            ValidationFailure::RoundGeneration(_) => "ROUND_GENERATION",
            ValidationFailure::VrfInvalid(_) => "VRF_INVALID",
        }
    }
}
