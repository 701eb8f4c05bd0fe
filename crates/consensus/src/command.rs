//! Per-behaviour mining commands.
//!
//! A command tells the production layer when to act and for how long: the
//! arranged mining time, the hard due time past which the action is stale,
//! and the filler quota in force.

use crate::behaviour::ConsensusBehaviour;
use crate::config::AedposConfig;
use aedpos_types::{MinerId, Round, Timestamp};

/// A concrete scheduling instruction derived from a behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsensusCommand {
    /// What to produce.
    pub behaviour: ConsensusBehaviour,
    /// When to start producing.
    pub arranged_mining_time: Timestamp,
    /// Hard deadline; past this the action must be abandoned.
    pub mining_due_time: Timestamp,
    /// Filler blocks still allowed this round.
    pub tiny_block_quota: u64,
}

/// Compute the command for a behaviour already decided by
/// [`crate::BehaviourProvider`].
pub fn command_for(
    config: &AedposConfig,
    round: &Round,
    miner: &MinerId,
    now: Timestamp,
    behaviour: ConsensusBehaviour,
    tiny_block_quota: u64,
) -> ConsensusCommand {
    let interval = config.mining_interval;
    let arranged = match behaviour {
        ConsensusBehaviour::Nothing => {
            // Next chance: the miner's own catch-up position, or a full
            // round away if the schedule is unknown.
            round
                .arrange_abnormal_mining_time(miner, now, interval)
                .unwrap_or(now + round.total_duration(interval))
        }
        ConsensusBehaviour::ProduceUpdate => {
            let expected = round
                .slot(miner)
                .and_then(|s| s.expected_mining_time)
                .unwrap_or(now);
            expected.max(now)
        }
        ConsensusBehaviour::ProduceFiller => now,
        ConsensusBehaviour::EndRound | ConsensusBehaviour::EndTerm => {
            let termination_due = round
                .slot(miner)
                .filter(|s| s.is_extra_block_producer)
                .and_then(|_| round.expected_extra_block_time(interval))
                .or_else(|| {
                    round.expected_extra_block_time(interval).and_then(|due| {
                        round.arrange_abnormal_mining_time(miner, due, interval)
                    })
                })
                .unwrap_or(now);
            termination_due.max(now)
        }
    };

    let due = match behaviour {
        // Fillers must stay inside the window that justified them: the
        // miner's own slot, or the pre-round grace window.
        ConsensusBehaviour::ProduceFiller => filler_due_time(round, miner, now, interval),
        _ => arranged + interval,
    };

    ConsensusCommand {
        behaviour,
        arranged_mining_time: arranged,
        mining_due_time: due,
        tiny_block_quota,
    }
}

fn filler_due_time(
    round: &Round,
    miner: &MinerId,
    now: Timestamp,
    interval: std::time::Duration,
) -> Timestamp {
    if let Some(start) = round.start_time() {
        if now.is_before(start) {
            // Pre-round grace window for the previous bonus producer.
            return start;
        }
    }
    round
        .slot(miner)
        .and_then(|s| s.expected_mining_time)
        .map(|expected| expected + interval)
        .unwrap_or(now + interval)
}

#[cfg(test)]
mod tests {
    use super::*;
    use aedpos_types::{RoundBuilder, RoundNumber, TermNumber};
    use std::time::Duration;

    const INTERVAL: Duration = Duration::from_millis(4_000);

    fn miner(n: u8) -> MinerId {
        MinerId([n; 32])
    }

    fn make_round() -> Round {
        let mut builder = RoundBuilder::new(RoundNumber(2), TermNumber(1));
        for i in 0..3u8 {
            builder.add_slot(
                miner(i + 1),
                (i + 1) as u32,
                Timestamp::from_millis(100_000 + i as i64 * 4_000),
            );
        }
        builder.set_extra_block_producer(&miner(3)).unwrap();
        builder.seal(INTERVAL).unwrap()
    }

    #[test]
    fn test_update_waits_for_slot_start() {
        let round = make_round();
        let config = AedposConfig::default();
        let now = Timestamp::from_millis(103_000);
        let command = command_for(
            &config,
            &round,
            &miner(2),
            now,
            ConsensusBehaviour::ProduceUpdate,
            8,
        );
        assert_eq!(command.arranged_mining_time, Timestamp::from_millis(104_000));
        assert_eq!(command.mining_due_time, Timestamp::from_millis(108_000));
    }

    #[test]
    fn test_update_late_in_slot_starts_immediately() {
        let round = make_round();
        let config = AedposConfig::default();
        let now = Timestamp::from_millis(105_000);
        let command = command_for(
            &config,
            &round,
            &miner(2),
            now,
            ConsensusBehaviour::ProduceUpdate,
            8,
        );
        assert_eq!(command.arranged_mining_time, now);
    }

    #[test]
    fn test_filler_bounded_by_slot_end() {
        let round = make_round();
        let config = AedposConfig::default();
        let now = Timestamp::from_millis(101_000);
        let command = command_for(
            &config,
            &round,
            &miner(1),
            now,
            ConsensusBehaviour::ProduceFiller,
            8,
        );
        assert_eq!(command.arranged_mining_time, now);
        assert_eq!(command.mining_due_time, Timestamp::from_millis(104_000));
    }

    #[test]
    fn test_grace_filler_bounded_by_round_start() {
        let round = make_round();
        let config = AedposConfig::default();
        let now = Timestamp::from_millis(99_000);
        let command = command_for(
            &config,
            &round,
            &miner(3),
            now,
            ConsensusBehaviour::ProduceFiller,
            8,
        );
        assert_eq!(command.mining_due_time, Timestamp::from_millis(100_000));
    }

    #[test]
    fn test_end_round_for_extra_producer() {
        let round = make_round();
        let config = AedposConfig::default();
        let now = Timestamp::from_millis(112_500);
        let command = command_for(
            &config,
            &round,
            &miner(3),
            now,
            ConsensusBehaviour::EndRound,
            8,
        );
        // Bonus window opened at 112_000; already inside it, act now.
        assert_eq!(command.arranged_mining_time, now);
        assert_eq!(command.mining_due_time, now + INTERVAL);
    }

    #[test]
    fn test_nothing_points_at_catch_up_slot() {
        let round = make_round();
        let config = AedposConfig::default();
        let now = Timestamp::from_millis(105_000);
        let command = command_for(
            &config,
            &round,
            &miner(1),
            now,
            ConsensusBehaviour::Nothing,
            8,
        );
        assert!(command.arranged_mining_time > now);
        // Lands on miner 1's own position modulo the round length.
        let offset = command.arranged_mining_time.as_millis() - 100_000;
        assert_eq!(offset % 16_000, 0);
    }
}
