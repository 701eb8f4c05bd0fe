//! Next-round order assignment and conflict resolution.
//!
//! Each main update derives a signature from the revealed previous secret
//! and the previous round's signatures, reduces it to a candidate order,
//! and claims that order for the next round. Collisions reassign the
//! *other* holder to the next unused order, probing with wraparound so
//! order N is reachable and order 1 is not handed out twice.

use crate::config::AedposConfig;
use aedpos_types::{
    Hash, MinerId, MinerSlot, Round, RoundBuildError, RoundBuilder,
};
use itertools::Itertools;
use std::collections::{BTreeMap, HashSet, VecDeque};
use thiserror::Error;
use tracing::{debug, warn};

/// Failures while assigning next-round orders.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderingError {
    /// Every candidate order was probed and none was free. Protocol-fatal;
    /// with N miners and N orders this must never happen.
    #[error("no free next-round order after probing all {0} candidates")]
    OrdersExhausted(usize),

    /// The sender holds no slot in the round.
    #[error("miner {0} holds no slot in the round")]
    UnknownSender(MinerId),
}

/// Failures while generating a successor round.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoundGenerationError {
    /// The sealed round violated a committed-round invariant.
    #[error(transparent)]
    Build(#[from] RoundBuildError),

    /// Two producers ended the round holding the same resolved order.
    #[error("producers collide on next-round order {0}")]
    DuplicateFinalOrder(u32),

    /// The outgoing round has no usable schedule to extend.
    #[error("outgoing round {0} has no complete schedule")]
    IncompleteSchedule(u64),
}

/// Derive the signature a miner publishes with its main update.
pub fn derive_signature(revealed_previous_secret: &Hash, previous_round: &Round) -> Hash {
    revealed_previous_secret.xor(&previous_round.signatures_xor())
}

/// Reduce a signature to a candidate next-round order in `[1, N]`.
pub fn supposed_order(signature: &Hash, miners_count: usize) -> u32 {
    (signature.as_u64() % miners_count as u64) as u32 + 1
}

/// Claim `supposed` as the sender's next-round order, displacing any other
/// miner already holding it.
///
/// The displaced miner moves to the next unused order, probing upward with
/// wraparound back into `[1, N]`.
pub fn assign_next_round_order(
    round: &mut Round,
    sender: &MinerId,
    supposed: u32,
) -> Result<(), OrderingError> {
    let n = round.miners_count();
    {
        let slot = round
            .slot_mut(sender)
            .ok_or(OrderingError::UnknownSender(*sender))?;
        slot.supposed_order_of_next_round = supposed;
        slot.final_order_of_next_round = supposed;
    }

    let conflicted: Vec<MinerId> = round
        .slots
        .values()
        .filter(|s| s.miner != *sender && s.final_order_of_next_round == supposed)
        .map(|s| s.miner)
        .collect();

    for other in conflicted {
        let free = next_free_order(round, supposed, n)?;
        warn!(
            order = supposed,
            displaced = %other,
            reassigned_to = free,
            "next-round order collision, reassigning prior holder"
        );
        if let Some(slot) = round.slot_mut(&other) {
            slot.final_order_of_next_round = free;
        }
    }
    Ok(())
}

/// Probe for the next unused order after `supposed`, wrapping into `[1, N]`.
fn next_free_order(round: &Round, supposed: u32, n: usize) -> Result<u32, OrderingError> {
    let taken: HashSet<u32> = round
        .slots
        .values()
        .map(|s| s.final_order_of_next_round)
        .filter(|&o| o != 0)
        .collect();
    for step in 1..=n as u32 {
        let candidate = ((supposed + step - 1) % n as u32) + 1;
        if !taken.contains(&candidate) {
            return Ok(candidate);
        }
    }
    Err(OrderingError::OrdersExhausted(n))
}

/// The order whose holder becomes the next round's bonus producer.
///
/// Derived from the first signed slot of the outgoing round; order 1 by
/// default when nobody produced anything.
pub fn next_extra_block_producer_order(round: &Round) -> u32 {
    let n = round.miners_count();
    round
        .slots
        .values()
        .sorted_by_key(|s| s.order)
        .find_map(|s| s.signature.as_ref())
        .map(|signature| supposed_order(signature, n))
        .unwrap_or(1)
}

/// Generate the successor round from a terminating round.
///
/// Producers land at their resolved orders; unclaimed orders are filled in
/// ascending order by the miners who failed to produce, preserving their
/// relative order. The outgoing bonus producer never lands at order 1.
pub fn generate_next_round(
    current: &Round,
    config: &AedposConfig,
    blockchain_age: u64,
) -> Result<Round, RoundGenerationError> {
    let n = current.miners_count();
    let interval = config.mining_interval;
    let start = current
        .expected_end_time(interval)
        .ok_or(RoundGenerationError::IncompleteSchedule(
            current.round_number.0,
        ))?;

    let mut placements: BTreeMap<u32, MinerId> = BTreeMap::new();
    let mut idle: VecDeque<MinerId> = VecDeque::new();
    for slot in current.slots.values() {
        if slot.has_produced() && slot.final_order_of_next_round != 0 {
            if placements
                .insert(slot.final_order_of_next_round, slot.miner)
                .is_some()
            {
                return Err(RoundGenerationError::DuplicateFinalOrder(
                    slot.final_order_of_next_round,
                ));
            }
        } else {
            idle.push_back(slot.miner);
        }
    }
    for order in 1..=n as u32 {
        if let std::collections::btree_map::Entry::Vacant(entry) = placements.entry(order) {
            if let Some(miner) = idle.pop_front() {
                entry.insert(miner);
            }
        }
    }

    // The outgoing bonus producer must not open the next round too.
    let outgoing_extra = current.extra_block_producer().map(|s| s.miner);
    if n >= 2 && placements.get(&1).copied() == outgoing_extra {
        let first = placements.get(&1).copied();
        let second = placements.get(&2).copied();
        if let (Some(first), Some(second)) = (first, second) {
            debug!(
                miner = %first,
                "outgoing bonus producer landed first, swapping orders 1 and 2"
            );
            placements.insert(1, second);
            placements.insert(2, first);
        }
    }

    let mut builder = RoundBuilder::new(current.round_number.next(), current.term_number);
    for (order, miner) in &placements {
        let expected = start + interval * (order - 1);
        let mut slot = MinerSlot::new(*miner, *order, expected);
        if let Some(previous) = current.slot(miner) {
            slot.missed_time_slots = previous.missed_time_slots;
        }
        builder.push_slot(slot);
    }

    let extra_order = next_extra_block_producer_order(current);
    if let Some(extra_miner) = placements.get(&extra_order).copied() {
        builder.set_extra_block_producer(&extra_miner)?;
    }
    builder
        .with_previous_extra_block_producer(outgoing_extra)
        .with_confirmed_irreversible(
            current.confirmed_irreversible_height,
            current.confirmed_irreversible_round,
        )
        .with_miner_list_just_changed(false)
        .with_blockchain_age(blockchain_age);

    Ok(builder.seal(interval)?)
}
