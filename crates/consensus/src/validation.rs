//! Header validation.
//!
//! A candidate header is checked by a chain of providers, each guarding one
//! protocol concern. Every check runs against the pre-application snapshot
//! of the base round; nothing the candidate claims is copied into state
//! before the comparison that would verify it. The round-identity
//! comparison against the re-derived successor happens after apply, in the
//! state module.

use crate::behaviour::BehaviourProvider;
use crate::config::AedposConfig;
use crate::error::ValidationFailure;
use crate::ordering::{derive_signature, supposed_order};
use aedpos_crypto::reveal_check;
use aedpos_types::{CandidateHeader, HeaderKind, MinerSlot, Round, Timestamp};
use std::collections::HashSet;
use tracing::debug;

/// Everything a provider may look at. All references point at state as it
/// was before the candidate is applied.
pub struct ValidationContext<'a> {
    /// The round the candidate claims to extend or terminate.
    pub base_round: &'a Round,
    /// The round before that, for commit-reveal cross-checks.
    pub previous_round: Option<&'a Round>,
    /// The candidate under test.
    pub header: &'a CandidateHeader,
    /// Wall-clock time at validation.
    pub now: Timestamp,
    /// When the chain started; term periods are measured from here.
    pub blockchain_start: Timestamp,
    /// Protocol parameters.
    pub config: &'a AedposConfig,
    /// The health-adjusted filler quota in force.
    pub tiny_block_quota: u64,
}

/// One guarded protocol concern.
pub trait HeaderValidationProvider: Send + Sync {
    /// Short name for diagnostics.
    fn name(&self) -> &'static str;

    /// Check the candidate; any error rejects it outright.
    fn validate(&self, ctx: &ValidationContext<'_>) -> Result<(), ValidationFailure>;
}

/// The ordered provider chain.
pub struct ValidationPipeline {
    providers: Vec<Box<dyn HeaderValidationProvider>>,
}

impl ValidationPipeline {
    /// The standard chain, in checking order.
    pub fn standard() -> Self {
        Self {
            providers: vec![
                Box::new(MiningPermissionProvider),
                Box::new(TimeSlotProvider),
                Box::new(UpdateValueProvider),
                Box::new(ContinuousBlocksProvider),
                Box::new(RoundTerminateProvider),
                Box::new(NextRoundOrderProvider),
                Box::new(LibInformationProvider),
            ],
        }
    }

    /// Run every provider; the first failure wins.
    pub fn validate(&self, ctx: &ValidationContext<'_>) -> Result<(), ValidationFailure> {
        for provider in &self.providers {
            if let Err(failure) = provider.validate(ctx) {
                debug!(
                    provider = provider.name(),
                    code = failure.code(),
                    sender = %ctx.header.sender,
                    kind = %ctx.header.kind,
                    "candidate header rejected"
                );
                return Err(failure);
            }
        }
        Ok(())
    }
}

/// The sender must hold a slot in the round it claims to act in.
struct MiningPermissionProvider;

impl HeaderValidationProvider for MiningPermissionProvider {
    fn name(&self) -> &'static str {
        "mining_permission"
    }

    fn validate(&self, ctx: &ValidationContext<'_>) -> Result<(), ValidationFailure> {
        if !ctx.base_round.contains(&ctx.header.sender) {
            return Err(ValidationFailure::MiningPermission(ctx.header.sender));
        }
        Ok(())
    }
}

/// The claimed production time must fall in a window granted to the sender.
struct TimeSlotProvider;

impl TimeSlotProvider {
    fn claimed_time(header: &CandidateHeader) -> Result<Timestamp, ValidationFailure> {
        header
            .round
            .slot(&header.sender)
            .and_then(MinerSlot::latest_actual_mining_time)
            .ok_or_else(|| {
                ValidationFailure::MalformedHeader(
                    "no actual mining time recorded for sender".into(),
                )
            })
    }

    fn in_any_window(
        base: &Round,
        slot: &MinerSlot,
        time: Timestamp,
        interval: std::time::Duration,
    ) -> bool {
        let step = interval.as_millis() as i64;

        // Own slot window.
        if let Some(expected) = slot.expected_mining_time {
            let offset = time.as_millis() - expected.as_millis();
            if (0..step).contains(&offset) {
                return true;
            }
            // Staggered catch-up positions: the own slot projected forward
            // whole round lengths.
            let round_len = base.total_duration(interval).as_millis() as i64;
            if offset > 0 && round_len > 0 {
                let laps = offset / round_len;
                if laps >= 1 && (offset - laps * round_len) < step {
                    return true;
                }
            }
        }

        // Bonus window for the round's extra block producer.
        if slot.is_extra_block_producer {
            if let Some(extra) = base.expected_extra_block_time(interval) {
                let offset = time.as_millis() - extra.as_millis();
                if (0..step).contains(&offset) {
                    return true;
                }
            }
        }

        // Pre-round grace window for the previous bonus producer.
        if base.extra_block_producer_of_previous_round == Some(slot.miner) {
            if let Some(start) = base.start_time() {
                if time.is_before(start) {
                    return true;
                }
            }
        }

        false
    }
}

impl HeaderValidationProvider for TimeSlotProvider {
    fn name(&self) -> &'static str {
        "time_slot"
    }

    fn validate(&self, ctx: &ValidationContext<'_>) -> Result<(), ValidationFailure> {
        if !matches!(ctx.header.kind, HeaderKind::Update | HeaderKind::TinyBlock) {
            return Ok(());
        }
        let time = Self::claimed_time(ctx.header)?;
        let slot = ctx
            .base_round
            .slot(&ctx.header.sender)
            .ok_or(ValidationFailure::MiningPermission(ctx.header.sender))?;

        if !Self::in_any_window(ctx.base_round, slot, time, ctx.config.mining_interval) {
            return Err(ValidationFailure::TimeSlot {
                miner: ctx.header.sender,
                time,
            });
        }
        Ok(())
    }
}

/// A main update must carry a sound payload and leave other slots alone.
struct UpdateValueProvider;

impl HeaderValidationProvider for UpdateValueProvider {
    fn name(&self) -> &'static str {
        "update_value"
    }

    fn validate(&self, ctx: &ValidationContext<'_>) -> Result<(), ValidationFailure> {
        if ctx.header.kind != HeaderKind::Update {
            return Ok(());
        }
        let update = ctx.header.extracted_update().ok_or_else(|| {
            ValidationFailure::MalformedHeader("update payload incomplete".into())
        })?;

        if update.out_value.is_zero() {
            return Err(ValidationFailure::UpdateValue("empty commitment".into()));
        }

        // The candidate next-round order is derived from the published
        // signature, never chosen. This also pins the order into [1, N].
        let n = ctx.base_round.miners_count();
        if update.supposed_order_of_next_round != supposed_order(&update.signature, n) {
            return Err(ValidationFailure::UpdateValue(
                "next-round order does not follow from the signature".into(),
            ));
        }

        let base_slot = ctx
            .base_round
            .slot(&ctx.header.sender)
            .ok_or(ValidationFailure::MiningPermission(ctx.header.sender))?;
        if base_slot.has_committed() {
            return Err(ValidationFailure::UpdateValue(
                "sender already committed this round".into(),
            ));
        }

        // The revealed previous secret must match the previous round's
        // commitment when one exists, and a disclosed secret in turn pins
        // the signature the order was derived from.
        if let Some(revealed) = update.previous_in_value {
            let prior_out_value = ctx
                .previous_round
                .and_then(|r| r.slot(&ctx.header.sender))
                .and_then(|s| s.out_value);
            if let Some(out_value) = prior_out_value {
                if !reveal_check(&revealed, &out_value) {
                    return Err(ValidationFailure::UpdateValue(
                        "revealed secret does not match prior commitment".into(),
                    ));
                }
            }
            if let Some(previous) = ctx.previous_round {
                if update.signature != derive_signature(&revealed, previous) {
                    return Err(ValidationFailure::UpdateValue(
                        "signature does not follow from the revealed secret".into(),
                    ));
                }
            }
        }

        // No tampering with anyone else's slot. Conflict resolution may
        // legitimately move another miner's final order, and publishing
        // decrypted pieces adds entries to other slots, so those two fields
        // are exempt.
        for (miner, base) in &ctx.base_round.slots {
            if *miner == ctx.header.sender {
                continue;
            }
            let candidate = ctx.header.round.slot(miner).ok_or_else(|| {
                ValidationFailure::UpdateValue(format!("slot for {miner} dropped from snapshot"))
            })?;
            let untouched = candidate.out_value == base.out_value
                && candidate.signature == base.signature
                && candidate.supposed_order_of_next_round == base.supposed_order_of_next_round
                && candidate.implied_irreversible_height == base.implied_irreversible_height
                && candidate.order == base.order;
            if !untouched {
                return Err(ValidationFailure::UpdateValue(format!(
                    "slot for {miner} tampered with"
                )));
            }
        }
        Ok(())
    }
}

/// Tiny blocks stop once the sender's filler quota is spent.
struct ContinuousBlocksProvider;

impl HeaderValidationProvider for ContinuousBlocksProvider {
    fn name(&self) -> &'static str {
        "continuous_blocks"
    }

    fn validate(&self, ctx: &ValidationContext<'_>) -> Result<(), ValidationFailure> {
        if ctx.header.kind != HeaderKind::TinyBlock {
            return Ok(());
        }
        let produced = ctx.base_round.tiny_blocks_of(&ctx.header.sender);
        if produced >= ctx.tiny_block_quota {
            return Err(ValidationFailure::ContinuousBlocks(ctx.header.sender));
        }
        Ok(())
    }
}

/// Terminate headers must continue the round/term sequence and carry a
/// complete schedule.
struct RoundTerminateProvider;

impl HeaderValidationProvider for RoundTerminateProvider {
    fn name(&self) -> &'static str {
        "round_terminate"
    }

    fn validate(&self, ctx: &ValidationContext<'_>) -> Result<(), ValidationFailure> {
        if !matches!(ctx.header.kind, HeaderKind::NextRound | HeaderKind::NextTerm) {
            return Ok(());
        }
        let base = ctx.base_round;
        let next = &ctx.header.round;

        if next.round_number != base.round_number.next() {
            return Err(ValidationFailure::RoundContinuity {
                current: base.round_number,
                got: next.round_number,
            });
        }
        let expected_term = match ctx.header.kind {
            HeaderKind::NextTerm => base.term_number.next(),
            _ => base.term_number,
        };
        if next.term_number != expected_term {
            return Err(ValidationFailure::TermContinuity {
                current: base.term_number,
                got: next.term_number,
            });
        }
        if next.uses_fallback_id() {
            return Err(ValidationFailure::MalformedHeader(
                "carried round has an incomplete schedule".into(),
            ));
        }

        // Only a miner standing at a legitimate termination position may
        // close the round: the bonus producer once its slot opens, anyone
        // else at its staggered catch-up position after that.
        let slot = base
            .slot(&ctx.header.sender)
            .ok_or(ValidationFailure::MiningPermission(ctx.header.sender))?;
        let interval = ctx.config.mining_interval;
        let extra_time = base.expected_extra_block_time(interval).ok_or_else(|| {
            ValidationFailure::MalformedHeader("terminating round has no schedule".into())
        })?;
        let due = if slot.is_extra_block_producer {
            Some(extra_time)
        } else {
            base.arrange_abnormal_mining_time(&slot.miner, extra_time, interval)
        };
        match due {
            Some(due) if ctx.now >= due => {}
            _ => {
                return Err(ValidationFailure::TimeSlot {
                    miner: ctx.header.sender,
                    time: ctx.now,
                })
            }
        }

        // A term may only end once the change actually fell due.
        if ctx.header.kind == HeaderKind::NextTerm {
            let behaviour = BehaviourProvider::new(ctx.config.clone());
            if !behaviour.is_term_change_due(base, ctx.blockchain_start) {
                return Err(ValidationFailure::TermChangeNotDue(base.round_number));
            }
        }
        Ok(())
    }
}

/// Orders in a carried next round must be a permutation of `1..=N`, and the
/// terminating round's resolved orders must not collide.
struct NextRoundOrderProvider;

impl HeaderValidationProvider for NextRoundOrderProvider {
    fn name(&self) -> &'static str {
        "next_round_order"
    }

    fn validate(&self, ctx: &ValidationContext<'_>) -> Result<(), ValidationFailure> {
        if !matches!(ctx.header.kind, HeaderKind::NextRound | HeaderKind::NextTerm) {
            return Ok(());
        }

        // Producers of the terminating round must hold distinct resolved
        // orders; a collision here escaped conflict resolution.
        let mut seen = HashSet::new();
        for slot in ctx.base_round.slots.values() {
            if slot.has_produced() && slot.final_order_of_next_round != 0 {
                if !seen.insert(slot.final_order_of_next_round) {
                    return Err(ValidationFailure::DuplicateOrder(
                        slot.final_order_of_next_round,
                    ));
                }
            }
        }

        // The carried round's schedule must cover 1..=N exactly.
        let n = ctx.header.round.miners_count() as u32;
        let orders: HashSet<u32> = ctx.header.round.slots.values().map(|s| s.order).collect();
        for order in 1..=n {
            if !orders.contains(&order) {
                return Err(ValidationFailure::DuplicateOrder(order));
            }
        }
        Ok(())
    }
}

/// Irreversibility claims may only move forward.
struct LibInformationProvider;

impl HeaderValidationProvider for LibInformationProvider {
    fn name(&self) -> &'static str {
        "lib_information"
    }

    fn validate(&self, ctx: &ValidationContext<'_>) -> Result<(), ValidationFailure> {
        let base = ctx.base_round;
        let claimed = ctx.header.round.confirmed_irreversible_height;
        if claimed < base.confirmed_irreversible_height {
            return Err(ValidationFailure::LibRegression {
                current: base.confirmed_irreversible_height,
                got: claimed,
            });
        }

        if ctx.header.kind == HeaderKind::Update {
            if let Some(update) = ctx.header.extracted_update() {
                let implied = update.implied_irreversible_height;
                if implied > ctx.header.height {
                    return Err(ValidationFailure::UpdateValue(
                        "implied irreversible height exceeds block height".into(),
                    ));
                }
                if let Some(base_slot) = base.slot(&ctx.header.sender) {
                    let prior = base_slot.implied_irreversible_height;
                    if prior.0 > 0 && implied < prior {
                        return Err(ValidationFailure::LibRegression {
                            current: prior,
                            got: implied,
                        });
                    }
                }
            }
        }
        Ok(())
    }
}
