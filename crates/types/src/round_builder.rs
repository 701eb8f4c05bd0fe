//! Arena-style construction of sealed rounds.
//!
//! All locally generated rounds go through the builder, which checks the
//! committed-round invariants at seal time: orders are a permutation of
//! 1..=N, the schedule is monotone and evenly spaced, and exactly one slot
//! carries the extra-block-producer flag.

use crate::{MinerId, MinerSlot, Round, RoundNumber, TermNumber, Timestamp};
use indexmap::IndexMap;
use std::collections::HashMap;
use std::time::Duration;

/// Errors produced when sealing an invalid round.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoundBuildError {
    /// The round has no slots.
    #[error("round {0} has no slots")]
    Empty(u64),

    /// Slot orders are not a permutation of 1..=N.
    #[error("slot order {order} is out of range or duplicated (miners: {count})")]
    BadOrder {
        /// The offending order value.
        order: u32,
        /// Number of miners in the round.
        count: usize,
    },

    /// A slot is missing its expected mining time.
    #[error("slot for {0} has no expected mining time")]
    MissingExpectedTime(MinerId),

    /// Expected mining times are not monotone in order or wrongly spaced.
    #[error("schedule is not spaced by the mining interval at order {0}")]
    BadSpacing(u32),

    /// The extra-block-producer flag is carried by zero or multiple slots.
    #[error("round carries {0} extra block producers, expected exactly 1")]
    ExtraProducerCount(usize),

    /// The same miner was added twice.
    #[error("duplicate slot for miner {0}")]
    DuplicateMiner(MinerId),

    /// Referenced miner has no slot in the round being built.
    #[error("miner {0} has no slot in this round")]
    UnknownMiner(MinerId),
}

/// Builder for a new round.
#[derive(Debug)]
pub struct RoundBuilder {
    round_number: RoundNumber,
    term_number: TermNumber,
    slots: Vec<MinerSlot>,
    index: HashMap<MinerId, usize>,
    extra_block_producer_of_previous_round: Option<MinerId>,
    confirmed_irreversible_height: crate::BlockHeight,
    confirmed_irreversible_round: RoundNumber,
    is_miner_list_just_changed: bool,
    blockchain_age: u64,
    duplicate: Option<MinerId>,
}

impl RoundBuilder {
    /// Start building a round.
    pub fn new(round_number: RoundNumber, term_number: TermNumber) -> Self {
        Self {
            round_number,
            term_number,
            slots: Vec::new(),
            index: HashMap::new(),
            extra_block_producer_of_previous_round: None,
            confirmed_irreversible_height: crate::BlockHeight::GENESIS,
            confirmed_irreversible_round: RoundNumber(0),
            is_miner_list_just_changed: false,
            blockchain_age: 0,
            duplicate: None,
        }
    }

    /// Add a fresh slot. Order values are validated at seal time.
    pub fn add_slot(
        &mut self,
        miner: MinerId,
        order: u32,
        expected_mining_time: Timestamp,
    ) -> &mut MinerSlot {
        self.push_slot(MinerSlot::new(miner, order, expected_mining_time))
    }

    /// Add a pre-populated slot (carried-over counters, flags).
    pub fn push_slot(&mut self, slot: MinerSlot) -> &mut MinerSlot {
        if self.index.contains_key(&slot.miner) && self.duplicate.is_none() {
            self.duplicate = Some(slot.miner);
        }
        self.index.insert(slot.miner, self.slots.len());
        self.slots.push(slot);
        self.slots.last_mut().expect("just pushed")
    }

    /// Access a slot added earlier.
    pub fn slot_mut(&mut self, miner: &MinerId) -> Option<&mut MinerSlot> {
        let idx = *self.index.get(miner)?;
        self.slots.get_mut(idx)
    }

    /// Mark a miner as the round's extra block producer.
    ///
    /// Clears the flag on any slot that already carried it.
    pub fn set_extra_block_producer(&mut self, miner: &MinerId) -> Result<(), RoundBuildError> {
        if !self.index.contains_key(miner) {
            return Err(RoundBuildError::UnknownMiner(*miner));
        }
        for slot in &mut self.slots {
            slot.is_extra_block_producer = slot.miner == *miner;
        }
        Ok(())
    }

    /// Record the outgoing round's extra block producer.
    pub fn with_previous_extra_block_producer(&mut self, miner: Option<MinerId>) -> &mut Self {
        self.extra_block_producer_of_previous_round = miner;
        self
    }

    /// Carry over the confirmed irreversible height and its round.
    pub fn with_confirmed_irreversible(
        &mut self,
        height: crate::BlockHeight,
        round: RoundNumber,
    ) -> &mut Self {
        self.confirmed_irreversible_height = height;
        self.confirmed_irreversible_round = round;
        self
    }

    /// Flag the round as carrying a changed miner list.
    pub fn with_miner_list_just_changed(&mut self, changed: bool) -> &mut Self {
        self.is_miner_list_just_changed = changed;
        self
    }

    /// Record the chain age at generation time.
    pub fn with_blockchain_age(&mut self, age: u64) -> &mut Self {
        self.blockchain_age = age;
        self
    }

    /// Validate the committed-round invariants and seal.
    pub fn seal(mut self, interval: Duration) -> Result<Round, RoundBuildError> {
        if let Some(miner) = self.duplicate {
            return Err(RoundBuildError::DuplicateMiner(miner));
        }

        let count = self.slots.len();
        if count == 0 {
            return Err(RoundBuildError::Empty(self.round_number.0));
        }

        // Orders must be a permutation of 1..=N.
        let mut seen = vec![false; count];
        for slot in &self.slots {
            let order = slot.order;
            if order == 0 || order as usize > count || seen[(order - 1) as usize] {
                return Err(RoundBuildError::BadOrder { order, count });
            }
            seen[(order - 1) as usize] = true;
        }

        // Schedule must be fully populated, monotone and evenly spaced.
        self.slots.sort_by_key(|s| s.order);
        let step = interval.as_millis() as i64;
        let mut prev: Option<Timestamp> = None;
        for slot in &self.slots {
            let expected = slot
                .expected_mining_time
                .ok_or(RoundBuildError::MissingExpectedTime(slot.miner))?;
            if let Some(prev) = prev {
                if expected.as_millis() - prev.as_millis() != step {
                    return Err(RoundBuildError::BadSpacing(slot.order));
                }
            }
            prev = Some(expected);
        }

        let extra_count = self.slots.iter().filter(|s| s.is_extra_block_producer).count();
        if extra_count != 1 {
            return Err(RoundBuildError::ExtraProducerCount(extra_count));
        }

        let mut slots = IndexMap::with_capacity(count);
        for slot in self.slots {
            slots.insert(slot.miner, slot);
        }

        Ok(Round {
            round_number: self.round_number,
            term_number: self.term_number,
            slots,
            extra_block_producer_of_previous_round: self.extra_block_producer_of_previous_round,
            confirmed_irreversible_height: self.confirmed_irreversible_height,
            confirmed_irreversible_round: self.confirmed_irreversible_round,
            is_miner_list_just_changed: self.is_miner_list_just_changed,
            blockchain_age: self.blockchain_age,
            fallback_id: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INTERVAL: Duration = Duration::from_millis(4_000);

    fn miner(n: u8) -> MinerId {
        MinerId([n; 32])
    }

    fn time(order: u32) -> Timestamp {
        Timestamp::from_millis(order as i64 * 4_000)
    }

    #[test]
    fn test_seal_valid_round() {
        let mut builder = RoundBuilder::new(RoundNumber(1), TermNumber(1));
        for i in 1..=4u8 {
            builder.add_slot(miner(i), i as u32, time(i as u32));
        }
        builder.set_extra_block_producer(&miner(3)).unwrap();

        let round = builder.seal(INTERVAL).unwrap();
        assert_eq!(round.miners_count(), 4);
        assert_eq!(round.extra_block_producer().unwrap().miner, miner(3));
        // Slots iterate in order.
        let orders: Vec<u32> = round.slots.values().map(|s| s.order).collect();
        assert_eq!(orders, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_seal_rejects_duplicate_order() {
        let mut builder = RoundBuilder::new(RoundNumber(1), TermNumber(1));
        builder.add_slot(miner(1), 1, time(1));
        builder.add_slot(miner(2), 1, time(2));
        builder.set_extra_block_producer(&miner(1)).unwrap();

        assert!(matches!(
            builder.seal(INTERVAL),
            Err(RoundBuildError::BadOrder { order: 1, .. })
        ));
    }

    #[test]
    fn test_seal_rejects_order_out_of_range() {
        let mut builder = RoundBuilder::new(RoundNumber(1), TermNumber(1));
        builder.add_slot(miner(1), 1, time(1));
        builder.add_slot(miner(2), 3, time(2));
        builder.set_extra_block_producer(&miner(1)).unwrap();

        assert!(matches!(
            builder.seal(INTERVAL),
            Err(RoundBuildError::BadOrder { order: 3, .. })
        ));
    }

    #[test]
    fn test_seal_rejects_bad_spacing() {
        let mut builder = RoundBuilder::new(RoundNumber(1), TermNumber(1));
        builder.add_slot(miner(1), 1, Timestamp::from_millis(4_000));
        builder.add_slot(miner(2), 2, Timestamp::from_millis(9_000));
        builder.set_extra_block_producer(&miner(1)).unwrap();

        assert!(matches!(
            builder.seal(INTERVAL),
            Err(RoundBuildError::BadSpacing(2))
        ));
    }

    #[test]
    fn test_seal_requires_exactly_one_extra_producer() {
        let mut builder = RoundBuilder::new(RoundNumber(1), TermNumber(1));
        builder.add_slot(miner(1), 1, time(1));
        builder.add_slot(miner(2), 2, time(2));

        assert!(matches!(
            builder.seal(INTERVAL),
            Err(RoundBuildError::ExtraProducerCount(0))
        ));
    }

    #[test]
    fn test_seal_rejects_duplicate_miner() {
        let mut builder = RoundBuilder::new(RoundNumber(1), TermNumber(1));
        builder.add_slot(miner(1), 1, time(1));
        builder.add_slot(miner(1), 2, time(2));

        assert!(matches!(
            builder.seal(INTERVAL),
            Err(RoundBuildError::DuplicateMiner(_))
        ));
    }
}
