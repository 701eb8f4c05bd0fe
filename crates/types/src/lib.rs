//! Core types for the AEDPoS consensus round state machine.
//!
//! This crate holds the data model only: hashes, identifiers, timestamps,
//! the [`MinerSlot`]/[`Round`] aggregate with its builder, miner lists and
//! decoded header shapes. All protocol logic lives in `aedpos-consensus`.

mod hash;
mod header;
mod identifiers;
mod miner_list;
mod round;
mod round_builder;
mod slot;
mod timestamp;

pub use hash::{Hash, HexError};
pub use header::{CandidateHeader, ExtractedUpdate, HeaderKind, VrfEvidence};
pub use identifiers::{BlockHeight, MinerId, RoundNumber, TermNumber};
pub use miner_list::MinerList;
pub use round::Round;
pub use round_builder::{RoundBuildError, RoundBuilder};
pub use slot::{MinerSlot, RevealProvenance, RevealedSecret};
pub use timestamp::Timestamp;
