//! The commit-reveal randomness pipeline.
//!
//! Alongside its commitment, a miner splits its secret into shares
//! encrypted per recipient. Recipients decrypt their own piece and publish
//! it back; once `ceil(2N/3)` distinct pieces are on-chain anyone can
//! reconstruct the secret without the owner cooperating. Reconstruction is
//! preferred over the pseudo fallback, and the pseudo fallback is always
//! recorded as such.

use aedpos_crypto::{
    decrypt_share, encrypt_share, pairwise_key, reconstruct, reveal_check, split, SecretShare,
    SecretSharingError,
};
use aedpos_types::{
    BlockHeight, Hash, MinerId, MinerSlot, RevealProvenance, RevealedSecret, Round,
};
use rand::RngCore;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Shares needed to reconstruct: `ceil(2N/3)`, never all N.
pub fn sharing_threshold(miners_count: usize) -> usize {
    (2 * miners_count).div_ceil(3)
}

/// Split `in_value` into per-recipient encrypted pieces for every other
/// miner of `round`.
///
/// Share evaluation points follow the recipients' round orders, so a piece
/// published later can be attributed to its point without extra metadata.
pub fn prepare_encrypted_pieces(
    in_value: &Hash,
    sender: &MinerId,
    round: &Round,
    rng: &mut impl RngCore,
) -> Result<BTreeMap<MinerId, Vec<u8>>, SecretSharingError> {
    let n = round.miners_count();
    if n <= 1 {
        return Ok(BTreeMap::new());
    }
    let threshold = sharing_threshold(n);
    let shares = split(in_value.as_bytes(), n, threshold, rng)?;

    let mut pieces = BTreeMap::new();
    for slot in round.slots.values() {
        if slot.miner == *sender {
            continue;
        }
        let share = &shares[(slot.order - 1) as usize];
        let key = pairwise_key(sender, &slot.miner);
        pieces.insert(slot.miner, encrypt_share(&key, &share.value));
    }
    Ok(pieces)
}

/// Decrypt the piece `owner` encrypted to `recipient`.
pub fn decrypt_own_piece(owner: &MinerId, recipient: &MinerId, encrypted: &[u8]) -> Vec<u8> {
    decrypt_share(&pairwise_key(owner, recipient), encrypted)
}

/// Try to reconstruct a miner's secret from the decrypted pieces published
/// into its slot.
///
/// Returns None below the threshold or when the reconstruction does not
/// match the recorded commitment; a mismatching value is never surfaced.
pub fn try_reconstruct_in_value(owner_slot: &MinerSlot, round: &Round) -> Option<Hash> {
    let threshold = sharing_threshold(round.miners_count());

    let mut shares = Vec::with_capacity(owner_slot.decrypted_pieces.len());
    for (decryptor, piece) in &owner_slot.decrypted_pieces {
        let Some(slot) = round.slot(decryptor) else {
            continue;
        };
        shares.push(SecretShare {
            index: slot.order,
            value: piece.clone(),
        });
    }
    if shares.len() < threshold {
        return None;
    }

    let bytes = reconstruct(&shares, threshold).ok()?;
    if bytes.len() > Hash::BYTES {
        return None;
    }
    let mut padded = [0u8; Hash::BYTES];
    padded[Hash::BYTES - bytes.len()..].copy_from_slice(&bytes);
    let value = Hash::from_hash_bytes(&padded);

    let out_value = owner_slot.out_value?;
    if !reveal_check(&value, &out_value) {
        warn!(
            miner = %owner_slot.miner,
            "reconstructed secret does not match commitment, discarding"
        );
        return None;
    }
    Some(value)
}

/// Deterministic liveness fallback for a miner whose secret never surfaced.
pub fn pseudo_in_value(miner: &MinerId, height: BlockHeight) -> Hash {
    Hash::from_parts(&[
        b"aedpos-pseudo-in-value",
        miner.as_bytes(),
        &height.0.to_le_bytes(),
    ])
}

/// A reveal settled by [`resolve_missing_reveals`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RevealOutcome {
    /// Whose secret was settled.
    pub miner: MinerId,
    /// The settled value and its provenance.
    pub secret: RevealedSecret,
}

/// Settle every still-missing previous-round reveal in a terminating round.
///
/// Miners that disclosed directly are untouched. For the rest, a threshold
/// reconstruction from the previous round's published pieces is tried
/// first; only when that fails does the pseudo fallback substitute, and the
/// substitution both carries its provenance in the record and counts
/// against the owner as a missed slot.
pub fn resolve_missing_reveals(
    round: &mut Round,
    previous_round: Option<&Round>,
    current_height: BlockHeight,
) -> Vec<RevealOutcome> {
    let mut outcomes = Vec::new();
    let Some(previous) = previous_round else {
        return outcomes;
    };

    for miner in round.miner_list() {
        let settled = round
            .slot(&miner)
            .map(|s| s.previous_in_value.is_some())
            .unwrap_or(true);
        if settled {
            continue;
        }
        let Some(previous_slot) = previous.slot(&miner) else {
            continue;
        };
        if !previous_slot.has_committed() {
            continue;
        }

        let secret = match try_reconstruct_in_value(previous_slot, previous) {
            Some(value) => {
                debug!(miner = %miner, "secret reconstructed from threshold shares");
                RevealedSecret::reconstructed(value)
            }
            None => RevealedSecret::pseudo(pseudo_in_value(&miner, current_height)),
        };

        if let Some(slot) = round.slot_mut(&miner) {
            slot.previous_in_value = Some(secret);
            if secret.provenance == RevealProvenance::Pseudo {
                slot.missed_time_slots += 1;
            }
            outcomes.push(RevealOutcome { miner, secret });
        }
    }
    outcomes
}
