//! Commit-reveal primitives.
//!
//! A miner publishes `out_value = commit(in_value)` when it produces its
//! main block, and discloses `in_value` one round later. Anyone can then
//! check the disclosure against the earlier commitment.

use aedpos_types::Hash;

/// Compute the one-way commitment for a secret.
pub fn commit(in_value: &Hash) -> Hash {
    Hash::from_bytes(in_value.as_bytes())
}

/// Check a revealed secret against its commitment.
pub fn reveal_check(in_value: &Hash, out_value: &Hash) -> bool {
    commit(in_value) == *out_value
}
