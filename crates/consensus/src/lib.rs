//! Round-based DPoS consensus core.
//!
//! The committee mines in a fixed per-round schedule of time slots. Every
//! main block publishes a commitment to a fresh secret and reveals the
//! previous one; revealed secrets drive the next round's mining order, and
//! per-miner irreversibility reports drive finality. The whole protocol
//! state lives in [`ConsensusState`]; everything else in this crate is a
//! pure function over rounds.
//!
//! The core is deliberately host-agnostic: block production, storage and
//! networking stay outside, wired in through [`ElectionProvider`] and
//! [`TimeProvider`].

pub mod behaviour;
pub mod command;
pub mod config;
pub mod error;
pub mod events;
pub mod lib_calculator;
pub mod ordering;
pub mod secrets;
pub mod state;
pub mod term;
pub mod traits;
pub mod validation;

pub use behaviour::{BehaviourProvider, ConsensusBehaviour};
pub use command::{command_for, ConsensusCommand};
pub use config::AedposConfig;
pub use error::ValidationFailure;
pub use events::ConsensusEvent;
pub use lib_calculator::{
    advance_irreversible_height, irreversible_candidate, mining_status, quorum, tiny_block_quota,
    MiningStatus,
};
pub use ordering::{
    assign_next_round_order, derive_signature, generate_next_round, supposed_order, OrderingError,
    RoundGenerationError,
};
pub use secrets::{
    decrypt_own_piece, prepare_encrypted_pieces, pseudo_in_value, resolve_missing_reveals,
    sharing_threshold, try_reconstruct_in_value, RevealOutcome,
};
pub use state::ConsensusState;
pub use term::{
    detect_evil_miners, generate_first_round_of_term, replace_miner, ReplacementError,
};
pub use traits::{ElectionProvider, ManualClock, StaticElectionProvider, TimeProvider};
pub use validation::{HeaderValidationProvider, ValidationContext, ValidationPipeline};
