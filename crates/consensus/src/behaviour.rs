//! The per-miner behaviour state machine.
//!
//! Given a round, a miner and the clock, decide the one action the miner
//! must take next. Every caller consumes the resulting variant through an
//! exhaustive match; there is no side channel.

use crate::config::AedposConfig;
use aedpos_types::{MinerId, MinerSlot, Round, RoundNumber, Timestamp};
use std::time::Duration;
use tracing::debug;

/// What a miner should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsensusBehaviour {
    /// Stay idle; no window is open for this miner.
    Nothing,
    /// Produce the main block: publish a commitment, reveal the previous
    /// secret, compute the next-round candidate order.
    ProduceUpdate,
    /// Produce a tiny (filler) block inside an already-claimed slot.
    ProduceFiller,
    /// Terminate the round and carry the generated next round.
    EndRound,
    /// Terminate the term and carry the first round of the next term.
    EndTerm,
}

/// Evaluates [`ConsensusBehaviour`] transitions.
#[derive(Debug, Clone)]
pub struct BehaviourProvider {
    config: AedposConfig,
}

impl BehaviourProvider {
    /// Create a provider over the given configuration.
    pub fn new(config: AedposConfig) -> Self {
        Self { config }
    }

    /// Decide what `miner` should do at `now`.
    ///
    /// `tiny_block_quota` is the health-adjusted filler limit for this
    /// round, computed by the irreversibility module.
    pub fn evaluate(
        &self,
        round: &Round,
        miner: &MinerId,
        now: Timestamp,
        blockchain_start: Timestamp,
        tiny_block_quota: u64,
    ) -> ConsensusBehaviour {
        let interval = self.config.mining_interval;
        let Some(slot) = round.slot(miner) else {
            return ConsensusBehaviour::Nothing;
        };

        // Grace window: the previous round's bonus producer may keep
        // filling until this round's nominal start.
        if self.in_previous_extra_grace(round, slot, now, tiny_block_quota) {
            return ConsensusBehaviour::ProduceFiller;
        }

        if !slot.has_committed() {
            if let Some(expected) = slot.expected_mining_time {
                if now >= expected && !round.is_time_slot_passed(miner, now, interval) {
                    return ConsensusBehaviour::ProduceUpdate;
                }
            }
            return self.termination(round, slot, now, blockchain_start);
        }

        // Committed already: fill the remainder of the slot.
        if !round.is_time_slot_passed(miner, now, interval)
            && slot.produced_tiny_blocks < tiny_block_quota
        {
            return ConsensusBehaviour::ProduceFiller;
        }

        self.termination(round, slot, now, blockchain_start)
    }

    fn in_previous_extra_grace(
        &self,
        round: &Round,
        slot: &MinerSlot,
        now: Timestamp,
        tiny_block_quota: u64,
    ) -> bool {
        if round.extra_block_producer_of_previous_round != Some(slot.miner) {
            return false;
        }
        if slot.produced_tiny_blocks >= tiny_block_quota {
            return false;
        }
        match round.start_time() {
            Some(start) => now.is_before(start),
            None => false,
        }
    }

    /// Whether this miner is the designated terminator at `now`, and if so
    /// which terminate variant applies.
    fn termination(
        &self,
        round: &Round,
        slot: &MinerSlot,
        now: Timestamp,
        blockchain_start: Timestamp,
    ) -> ConsensusBehaviour {
        let interval = self.config.mining_interval;
        let Some(extra_time) = round.expected_extra_block_time(interval) else {
            return ConsensusBehaviour::Nothing;
        };

        let responsible = if slot.is_extra_block_producer {
            now >= extra_time
        } else {
            // Others step in at their own staggered catch-up position once
            // the bonus producer has had its chance.
            match round.arrange_abnormal_mining_time(&slot.miner, extra_time, interval) {
                Some(arranged) => now >= arranged,
                None => false,
            }
        };
        if !responsible {
            return ConsensusBehaviour::Nothing;
        }

        if self.is_term_change_due(round, blockchain_start) {
            debug!(
                round = round.round_number.0,
                term = round.term_number.0,
                miner = %slot.miner,
                "term change due, terminating term"
            );
            ConsensusBehaviour::EndTerm
        } else {
            ConsensusBehaviour::EndRound
        }
    }

    /// Whether at least two thirds of the committee has mined past the
    /// current term's period boundary.
    ///
    /// Single-miner committees, first rounds and administratively disabled
    /// term changes always fall back to plain round termination.
    pub fn is_term_change_due(&self, round: &Round, blockchain_start: Timestamp) -> bool {
        if !self.config.term_change_enabled {
            return false;
        }
        if round.miners_count() == 1 {
            return false;
        }
        if round.round_number == RoundNumber::FIRST {
            return false;
        }

        let boundary = self.term_period_boundary(round, blockchain_start);
        let crossed = round
            .slots
            .values()
            .filter_map(|s| s.latest_actual_mining_time())
            .filter(|t| *t >= boundary)
            .count();
        crossed * 3 >= round.miners_count() * 2
    }

    /// The wall-clock point the current term must not outlive.
    fn term_period_boundary(&self, round: &Round, blockchain_start: Timestamp) -> Timestamp {
        let period = self.config.period_duration;
        blockchain_start + scale_duration(period, round.term_number.0)
    }
}

fn scale_duration(period: Duration, terms: u64) -> Duration {
    Duration::from_millis((period.as_millis() as u64).saturating_mul(terms))
}
