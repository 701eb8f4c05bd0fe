//! The Round aggregate: one complete pass through the miner schedule.

use crate::{BlockHeight, Hash, MinerId, MinerSlot, RoundNumber, TermNumber, Timestamp};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One round of the consensus schedule.
///
/// The slot map is ordered by mining order; iteration always visits miners
/// in schedule order. A round is mutated in place while it is current and
/// becomes immutable once superseded, after which it is retained for a
/// bounded window to support secret reconstruction and LIB calculation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Round {
    /// Round number, monotonically increasing from 1.
    pub round_number: RoundNumber,

    /// Term this round belongs to.
    pub term_number: TermNumber,

    /// Slots keyed by miner, in mining order.
    pub slots: IndexMap<MinerId, MinerSlot>,

    /// The miner that held the previous round's bonus production slot.
    pub extra_block_producer_of_previous_round: Option<MinerId>,

    /// Highest height the protocol currently treats as irreversible.
    pub confirmed_irreversible_height: BlockHeight,

    /// Round in which the confirmed irreversible height was established.
    pub confirmed_irreversible_round: RoundNumber,

    /// Set when the miner list differs from the previous round's.
    pub is_miner_list_just_changed: bool,

    /// Chain age in seconds at the time this round was generated.
    pub blockchain_age: u64,

    /// Explicit identity used only when some expected mining time is absent.
    ///
    /// Committed rounds always carry a full schedule, so for them this field
    /// is never consulted.
    pub fallback_id: u64,
}

impl Round {
    /// Number of miners in this round.
    pub fn miners_count(&self) -> usize {
        self.slots.len()
    }

    /// Whether the given miner holds a slot in this round.
    pub fn contains(&self, miner: &MinerId) -> bool {
        self.slots.contains_key(miner)
    }

    /// Get a miner's slot.
    pub fn slot(&self, miner: &MinerId) -> Option<&MinerSlot> {
        self.slots.get(miner)
    }

    /// Get a miner's slot mutably.
    pub fn slot_mut(&mut self, miner: &MinerId) -> Option<&mut MinerSlot> {
        self.slots.get_mut(miner)
    }

    /// Get the slot at a given mining order.
    pub fn slot_by_order(&self, order: u32) -> Option<&MinerSlot> {
        self.slots.values().find(|s| s.order == order)
    }

    /// Miners in schedule order.
    pub fn miner_list(&self) -> Vec<MinerId> {
        self.slots.keys().copied().collect()
    }

    /// Cheap round-identity fingerprint: the sum of expected mining times.
    ///
    /// Falls back to the explicit `fallback_id` when any expected time is
    /// absent; that path must never be reachable for a committed round.
    pub fn round_id(&self) -> u64 {
        if self.uses_fallback_id() {
            return self.fallback_id;
        }
        self.slots
            .values()
            .filter_map(|s| s.expected_mining_time)
            .map(|t| t.as_millis() as u64)
            .fold(0u64, u64::wrapping_add)
    }

    /// Whether the round-id fallback path would be exercised.
    pub fn uses_fallback_id(&self) -> bool {
        self.slots.values().any(|s| s.expected_mining_time.is_none())
    }

    /// Slots of miners who actually produced at least one block this round.
    pub fn mined_slots(&self) -> impl Iterator<Item = &MinerSlot> {
        self.slots.values().filter(|s| s.has_produced())
    }

    /// The slot at order 1.
    pub fn first_slot(&self) -> Option<&MinerSlot> {
        self.slot_by_order(1)
    }

    /// The slot carrying the extra-block-producer flag.
    pub fn extra_block_producer(&self) -> Option<&MinerSlot> {
        self.slots.values().find(|s| s.is_extra_block_producer)
    }

    /// Scheduled start of the round: the order-1 slot's expected time.
    pub fn start_time(&self) -> Option<Timestamp> {
        self.first_slot().and_then(|s| s.expected_mining_time)
    }

    /// Scheduled time of the bonus production slot, one interval past the
    /// last ordinary slot.
    pub fn expected_extra_block_time(&self, interval: Duration) -> Option<Timestamp> {
        let last = self
            .slots
            .values()
            .filter_map(|s| s.expected_mining_time)
            .max()?;
        Some(last + interval)
    }

    /// Nominal start time of the next round.
    pub fn expected_end_time(&self, interval: Duration) -> Option<Timestamp> {
        self.expected_extra_block_time(interval).map(|t| t + interval)
    }

    /// Total scheduled length of the round, including the bonus slot.
    pub fn total_duration(&self, interval: Duration) -> Duration {
        interval * (self.miners_count() as u32 + 1)
    }

    /// Whether `miner`'s time slot has fully elapsed at `now`.
    pub fn is_time_slot_passed(&self, miner: &MinerId, now: Timestamp, interval: Duration) -> bool {
        match self.slot(miner).and_then(|s| s.expected_mining_time) {
            Some(expected) => now >= expected + interval,
            None => false,
        }
    }

    /// The miner whose slot window contains `now`, if any.
    ///
    /// Past the last ordinary slot the bonus window belongs to the extra
    /// block producer; beyond that nobody is in charge.
    pub fn miner_in_charge_of_time(&self, now: Timestamp, interval: Duration) -> Option<&MinerSlot> {
        for slot in self.slots.values() {
            let expected = slot.expected_mining_time?;
            if now >= expected && now < expected + interval {
                return Some(slot);
            }
        }
        let extra_time = self.expected_extra_block_time(interval)?;
        if now >= extra_time && now < extra_time + interval {
            return self.extra_block_producer();
        }
        None
    }

    /// Arrange a catch-up mining time for a miner that missed its slot:
    /// its own slot position, projected forward whole round lengths until
    /// it lands in the future.
    pub fn arrange_abnormal_mining_time(
        &self,
        miner: &MinerId,
        now: Timestamp,
        interval: Duration,
    ) -> Option<Timestamp> {
        let expected = self.slot(miner)?.expected_mining_time?;
        let round_len = self.total_duration(interval);
        let mut arranged = expected + round_len;
        while arranged <= now {
            arranged = arranged + round_len;
        }
        Some(arranged)
    }

    /// All signatures recorded this round, in schedule order.
    pub fn signatures(&self) -> impl Iterator<Item = &Hash> {
        self.slots.values().filter_map(|s| s.signature.as_ref())
    }

    /// Xor of every signature recorded this round, zero if none.
    pub fn signatures_xor(&self) -> Hash {
        self.signatures().fold(Hash::ZERO, |acc, s| acc.xor(s))
    }

    /// Count of tiny blocks produced by `miner` this round.
    pub fn tiny_blocks_of(&self, miner: &MinerId) -> u64 {
        self.slot(miner).map(|s| s.produced_tiny_blocks).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RoundBuilder;

    fn miner(n: u8) -> MinerId {
        MinerId([n; 32])
    }

    const INTERVAL: Duration = Duration::from_millis(4_000);

    fn make_round(n: u8) -> Round {
        let mut builder = RoundBuilder::new(RoundNumber(2), TermNumber(1));
        for i in 0..n {
            builder.add_slot(
                miner(i + 1),
                (i + 1) as u32,
                Timestamp::from_millis(10_000 + i as i64 * 4_000),
            );
        }
        builder.set_extra_block_producer(&miner(1)).unwrap();
        builder.seal(INTERVAL).unwrap()
    }

    #[test]
    fn test_round_id_sums_expected_times() {
        let round = make_round(3);
        assert_eq!(round.round_id(), 10_000 + 14_000 + 18_000);
        assert!(!round.uses_fallback_id());
    }

    #[test]
    fn test_round_id_fallback_when_time_missing() {
        let mut round = make_round(3);
        round.fallback_id = 42;
        round.slots[0].expected_mining_time = None;
        assert!(round.uses_fallback_id());
        assert_eq!(round.round_id(), 42);
    }

    #[test]
    fn test_miner_in_charge_of_time() {
        let round = make_round(3);

        let slot = round
            .miner_in_charge_of_time(Timestamp::from_millis(10_500), INTERVAL)
            .unwrap();
        assert_eq!(slot.order, 1);

        let slot = round
            .miner_in_charge_of_time(Timestamp::from_millis(14_000), INTERVAL)
            .unwrap();
        assert_eq!(slot.order, 2);

        // Bonus window past the last ordinary slot.
        let slot = round
            .miner_in_charge_of_time(Timestamp::from_millis(22_500), INTERVAL)
            .unwrap();
        assert!(slot.is_extra_block_producer);

        assert!(round
            .miner_in_charge_of_time(Timestamp::from_millis(60_000), INTERVAL)
            .is_none());
    }

    #[test]
    fn test_time_slot_passed() {
        let round = make_round(3);
        let m = miner(1);
        assert!(!round.is_time_slot_passed(&m, Timestamp::from_millis(13_999), INTERVAL));
        assert!(round.is_time_slot_passed(&m, Timestamp::from_millis(14_000), INTERVAL));
    }

    #[test]
    fn test_arrange_abnormal_mining_time_is_future() {
        let round = make_round(3);
        let m = miner(2);
        let now = Timestamp::from_millis(50_000);
        let arranged = round.arrange_abnormal_mining_time(&m, now, INTERVAL).unwrap();
        assert!(arranged > now);
        // Lands on the miner's own slot position modulo the round length.
        let base = 14_000i64;
        let round_len = 16_000i64;
        assert_eq!((arranged.as_millis() - base) % round_len, 0);
    }

    #[test]
    fn test_expected_end_time() {
        let round = make_round(3);
        // Last slot 18_000, extra at 22_000, next round nominally at 26_000.
        assert_eq!(
            round.expected_end_time(INTERVAL),
            Some(Timestamp::from_millis(26_000))
        );
    }
}
