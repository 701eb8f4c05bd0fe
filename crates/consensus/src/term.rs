//! Term transitions and committee maintenance.
//!
//! A term swaps in the whole elected committee; a mid-term replacement
//! swaps one miner in place. Chronically absent miners are reported to the
//! election collaborator but never removed by the core itself.

use crate::config::AedposConfig;
use crate::ordering::RoundGenerationError;
use aedpos_types::{
    BlockHeight, MinerId, MinerList, MinerSlot, Round, RoundBuilder, RoundNumber, TermNumber,
    Timestamp,
};
use indexmap::IndexMap;
use thiserror::Error;
use tracing::{info, warn};

/// Failures while replacing a miner mid-term.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReplacementError {
    /// The outgoing miner holds no slot in the round.
    #[error("miner {0} holds no slot in the round")]
    UnknownMiner(MinerId),

    /// The incoming miner already holds a slot in the round.
    #[error("miner {0} already holds a slot in the round")]
    AlreadyPresent(MinerId),
}

/// Miners whose missed-slot count crossed the tolerance, with the count.
///
/// Report only; removal is the election collaborator's call.
pub fn detect_evil_miners(round: &Round, tolerance: u64) -> Vec<(MinerId, u64)> {
    round
        .slots
        .values()
        .filter(|s| s.missed_time_slots > tolerance)
        .map(|s| {
            warn!(
                miner = %s.miner,
                missed = s.missed_time_slots,
                tolerance,
                "miner exceeded missed-slot tolerance"
            );
            (s.miner, s.missed_time_slots)
        })
        .collect()
}

/// Build the first round of a new term from the election ranking.
///
/// Orders follow the ranking; the top-ranked miner opens the round and
/// holds the bonus slot. All per-round counters start fresh.
#[allow(clippy::too_many_arguments)]
pub fn generate_first_round_of_term(
    ranking: &MinerList,
    term_number: TermNumber,
    round_number: RoundNumber,
    start_time: Timestamp,
    blockchain_age: u64,
    confirmed_irreversible: (BlockHeight, RoundNumber),
    previous_extra_block_producer: Option<MinerId>,
    config: &AedposConfig,
) -> Result<Round, RoundGenerationError> {
    let interval = config.mining_interval;
    let mut builder = RoundBuilder::new(round_number, term_number);
    for (i, miner) in ranking.miners.iter().enumerate() {
        let order = i as u32 + 1;
        builder.add_slot(*miner, order, start_time + interval * (order - 1));
    }
    if let Some(first) = ranking.miners.first() {
        builder.set_extra_block_producer(first)?;
    }
    builder
        .with_miner_list_just_changed(true)
        .with_previous_extra_block_producer(previous_extra_block_producer)
        .with_confirmed_irreversible(confirmed_irreversible.0, confirmed_irreversible.1)
        .with_blockchain_age(blockchain_age);

    let round = builder.seal(interval)?;
    info!(
        term = term_number.0,
        round = round_number.0,
        miners = round.miners_count(),
        "first round of new term generated"
    );
    Ok(round)
}

/// Swap one miner for another in place.
///
/// The incoming miner inherits the slot's order, expected time and the
/// extra-block-producer flag if held; counters, commitments and pieces
/// start fresh. Every other slot is untouched.
pub fn replace_miner(
    round: &mut Round,
    outgoing: &MinerId,
    incoming: MinerId,
) -> Result<(), ReplacementError> {
    if round.contains(&incoming) {
        return Err(ReplacementError::AlreadyPresent(incoming));
    }
    if !round.contains(outgoing) {
        return Err(ReplacementError::UnknownMiner(*outgoing));
    }

    let mut slots = IndexMap::with_capacity(round.slots.len());
    for (miner, slot) in round.slots.drain(..) {
        if miner == *outgoing {
            let fresh = MinerSlot {
                expected_mining_time: slot.expected_mining_time,
                is_extra_block_producer: slot.is_extra_block_producer,
                ..MinerSlot::new(incoming, slot.order, Timestamp::ZERO)
            };
            info!(
                outgoing = %miner,
                incoming = %incoming,
                order = slot.order,
                "miner replaced in place"
            );
            slots.insert(incoming, fresh);
        } else {
            slots.insert(miner, slot);
        }
    }
    round.slots = slots;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use aedpos_types::Hash;
    use std::time::Duration;

    const INTERVAL: Duration = Duration::from_millis(4_000);

    fn miner(n: u8) -> MinerId {
        MinerId([n; 32])
    }

    fn config() -> AedposConfig {
        AedposConfig::default()
    }

    fn make_round(miners: u8) -> Round {
        let mut builder = RoundBuilder::new(RoundNumber(2), TermNumber(1));
        for i in 0..miners {
            builder.add_slot(
                miner(i + 1),
                (i + 1) as u32,
                Timestamp::from_millis(100_000 + i as i64 * 4_000),
            );
        }
        builder.set_extra_block_producer(&miner(2)).unwrap();
        builder.seal(INTERVAL).unwrap()
    }

    #[test]
    fn test_evil_detection_is_strictly_above_tolerance() {
        let mut round = make_round(3);
        round.slot_mut(&miner(1)).unwrap().missed_time_slots = 30;
        round.slot_mut(&miner(2)).unwrap().missed_time_slots = 31;

        let flagged = detect_evil_miners(&round, 30);
        assert_eq!(flagged, vec![(miner(2), 31)]);
    }

    #[test]
    fn test_first_round_of_term_follows_ranking() {
        let ranking = MinerList::new(vec![miner(5), miner(3), miner(8)]);
        let round = generate_first_round_of_term(
            &ranking,
            TermNumber(2),
            RoundNumber(10),
            Timestamp::from_millis(500_000),
            42,
            (BlockHeight(90), RoundNumber(8)),
            Some(miner(1)),
            &config(),
        )
        .unwrap();

        assert_eq!(round.term_number, TermNumber(2));
        assert_eq!(round.round_number, RoundNumber(10));
        assert!(round.is_miner_list_just_changed);
        assert_eq!(round.slot(&miner(5)).unwrap().order, 1);
        assert_eq!(round.slot(&miner(3)).unwrap().order, 2);
        assert_eq!(round.slot(&miner(8)).unwrap().order, 3);
        assert!(round.slot(&miner(5)).unwrap().is_extra_block_producer);
        assert_eq!(round.start_time(), Some(Timestamp::from_millis(500_000)));
        assert_eq!(round.confirmed_irreversible_height, BlockHeight(90));
        assert_eq!(
            round.extra_block_producer_of_previous_round,
            Some(miner(1))
        );
        assert!(!round.uses_fallback_id());
    }

    #[test]
    fn test_replace_miner_preserves_order_and_role() {
        let mut round = make_round(3);
        {
            let slot = round.slot_mut(&miner(2)).unwrap();
            slot.out_value = Some(Hash::from_bytes(b"commit"));
            slot.missed_time_slots = 12;
        }

        replace_miner(&mut round, &miner(2), miner(9)).unwrap();

        assert!(!round.contains(&miner(2)));
        let fresh = round.slot(&miner(9)).unwrap();
        assert_eq!(fresh.order, 2);
        assert_eq!(
            fresh.expected_mining_time,
            Some(Timestamp::from_millis(104_000))
        );
        // Role flag carries over, state does not.
        assert!(fresh.is_extra_block_producer);
        assert!(fresh.out_value.is_none());
        assert_eq!(fresh.missed_time_slots, 0);

        // Iteration order and the other slots are untouched.
        let orders: Vec<u32> = round.slots.values().map(|s| s.order).collect();
        assert_eq!(orders, vec![1, 2, 3]);
        assert_eq!(round.extra_block_producer().unwrap().miner, miner(9));
    }

    #[test]
    fn test_replace_miner_rejects_bad_identities() {
        let mut round = make_round(3);
        assert_eq!(
            replace_miner(&mut round, &miner(9), miner(10)),
            Err(ReplacementError::UnknownMiner(miner(9)))
        );
        assert_eq!(
            replace_miner(&mut round, &miner(1), miner(2)),
            Err(ReplacementError::AlreadyPresent(miner(2)))
        );
    }
}
