//! Irreversible-height calculation and mining health.
//!
//! Each main update carries the producer's own view of the deepest
//! irreversible height. After a round completes, the rank
//! `floor((count - 1) / 3)` of the ascending reports is the height at
//! least two thirds of reporters stand behind. The confirmed height only
//! ever moves forward.

use crate::config::AedposConfig;
use aedpos_types::{BlockHeight, MinerList, Round, RoundNumber};
use tracing::{debug, info};

/// Reporters needed before a round may move the confirmed height.
pub fn quorum(miners_count: usize) -> usize {
    (2 * miners_count).div_ceil(3)
}

/// The candidate irreversible height implied by a completed round.
///
/// Considers only miners who actually mined and reported a non-zero
/// height; returns None below quorum.
pub fn irreversible_candidate(round: &Round) -> Option<BlockHeight> {
    let mut heights: Vec<BlockHeight> = round
        .mined_slots()
        .map(|s| s.implied_irreversible_height)
        .filter(|h| h.0 > 0)
        .collect();
    if heights.len() < quorum(round.miners_count()) {
        debug!(
            round = round.round_number.0,
            reporters = heights.len(),
            required = quorum(round.miners_count()),
            "not enough irreversibility reporters this round"
        );
        return None;
    }
    heights.sort();
    let rank = (heights.len() - 1) / 3;
    Some(heights[rank])
}

/// The new confirmed height a completed round establishes, if it advances
/// past `previous_confirmed`.
pub fn advance_irreversible_height(
    round: &Round,
    previous_confirmed: BlockHeight,
) -> Option<BlockHeight> {
    let candidate = irreversible_candidate(round)?;
    if candidate > previous_confirmed {
        info!(
            round = round.round_number.0,
            from = previous_confirmed.0,
            to = candidate.0,
            "irreversible height advanced"
        );
        Some(candidate)
    } else {
        None
    }
}

/// How far the chain has drifted from its last irreversible block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MiningStatus {
    /// Finality is keeping up with production.
    Normal,
    /// Finality is lagging; throttle filler production.
    Abnormal,
    /// Finality has stalled; filler production drops to the minimum.
    Severe,
}

/// Classify the current round's drift past the confirmed-irreversible round.
pub fn mining_status(
    current_round: RoundNumber,
    confirmed_round: RoundNumber,
    config: &AedposConfig,
) -> MiningStatus {
    let drift = current_round.0.saturating_sub(confirmed_round.0);
    if drift >= config.severe_round_drift {
        MiningStatus::Severe
    } else if drift >= config.abnormal_round_drift {
        MiningStatus::Abnormal
    } else {
        MiningStatus::Normal
    }
}

/// The filler-block quota in force for `current_round`.
///
/// Under abnormal health the quota shrinks by the committee overlap with
/// the round that last confirmed irreversibility. The comparison window is
/// same-term only; across a term boundary the sets can be disjoint and the
/// shrink factor would collapse the quota to zero for no fault of the new
/// committee.
pub fn tiny_block_quota(
    status: MiningStatus,
    current_round: &Round,
    confirmed_round: Option<&Round>,
    config: &AedposConfig,
) -> u64 {
    match status {
        MiningStatus::Normal => config.tiny_block_limit,
        MiningStatus::Severe => 1,
        MiningStatus::Abnormal => {
            let Some(confirmed) = confirmed_round else {
                return config.tiny_block_limit;
            };
            if confirmed.term_number != current_round.term_number {
                return config.tiny_block_limit;
            }
            let n = current_round.miners_count() as u64;
            let current_list: MinerList = current_round.miner_list().into_iter().collect();
            let confirmed_list: MinerList = confirmed.miner_list().into_iter().collect();
            let overlap = current_list.intersection_count(&confirmed_list) as u64;
            (config.tiny_block_limit * overlap).div_ceil(n).max(1)
        }
    }
}
