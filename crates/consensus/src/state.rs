//! The consensus state machine.
//!
//! One instance per chain. Processing is block-by-block: a candidate
//! header comes in, is verified against the prior state, and either
//! rejects with a [`ValidationFailure`] or commits and returns the events
//! it caused. Candidate validation never mutates shared state; apply works
//! on a clone and commits at the end.

use crate::behaviour::BehaviourProvider;
use crate::command::{command_for, ConsensusCommand};
use crate::config::AedposConfig;
use crate::error::ValidationFailure;
use crate::events::ConsensusEvent;
use crate::lib_calculator::{advance_irreversible_height, mining_status, tiny_block_quota};
use crate::ordering::{assign_next_round_order, generate_next_round};
use crate::secrets::resolve_missing_reveals;
use crate::term::{detect_evil_miners, generate_first_round_of_term};
use crate::traits::{ElectionProvider, TimeProvider};
use crate::validation::{ValidationContext, ValidationPipeline};
use aedpos_crypto::{VrfError, VrfProof, VrfPublicKey};
use aedpos_types::{
    BlockHeight, CandidateHeader, Hash, HeaderKind, MinerId, RevealProvenance, RevealedSecret,
    Round, RoundNumber, Timestamp,
};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info};

/// The only mutable state of the core.
pub struct ConsensusState {
    config: AedposConfig,
    behaviour: BehaviourProvider,
    pipeline: ValidationPipeline,
    election: Arc<dyn ElectionProvider>,
    time: Arc<dyn TimeProvider>,

    /// Retained rounds, keyed by round number. Superseded rounds stay for
    /// a bounded window to serve reconstruction and irreversibility.
    rounds: BTreeMap<u64, Round>,
    current_round_number: RoundNumber,
    current_height: BlockHeight,
    blockchain_start: Timestamp,

    /// The last verified VRF output; the alpha for the next proof.
    random_value: Hash,

    /// Miners already reported over the missed-slot tolerance. Counters
    /// persist across rounds, so without this ledger every later round
    /// termination would repeat the report.
    reported_evil_miners: BTreeSet<MinerId>,
}

impl ConsensusState {
    /// Boot a chain instance from its first round.
    pub fn new(
        config: AedposConfig,
        election: Arc<dyn ElectionProvider>,
        time: Arc<dyn TimeProvider>,
        first_round: Round,
        blockchain_start: Timestamp,
    ) -> Self {
        let current_round_number = first_round.round_number;
        let mut rounds = BTreeMap::new();
        rounds.insert(current_round_number.0, first_round);
        Self {
            behaviour: BehaviourProvider::new(config.clone()),
            pipeline: ValidationPipeline::standard(),
            config,
            election,
            time,
            rounds,
            current_round_number,
            current_height: BlockHeight::GENESIS,
            blockchain_start,
            random_value: Hash::ZERO,
            reported_evil_miners: BTreeSet::new(),
        }
    }

    /// The round currently being mined.
    pub fn current_round(&self) -> &Round {
        // The current round is inserted at construction and on every
        // termination, so the map always holds it.
        self.rounds
            .get(&self.current_round_number.0)
            .unwrap_or_else(|| unreachable!("current round {} retained", self.current_round_number))
    }

    /// The round before the current one, while still retained.
    pub fn previous_round(&self) -> Option<&Round> {
        self.current_round_number
            .0
            .checked_sub(1)
            .and_then(|n| self.rounds.get(&n))
    }

    /// A retained round by number.
    pub fn round(&self, number: RoundNumber) -> Option<&Round> {
        self.rounds.get(&number.0)
    }

    /// Height of the last processed block.
    pub fn current_height(&self) -> BlockHeight {
        self.current_height
    }

    /// The confirmed irreversible height.
    pub fn confirmed_irreversible_height(&self) -> BlockHeight {
        self.current_round().confirmed_irreversible_height
    }

    /// The last verified random value.
    pub fn random_value(&self) -> Hash {
        self.random_value
    }

    /// The filler quota in force for the current round.
    pub fn tiny_block_quota(&self) -> u64 {
        let current = self.current_round();
        let status = mining_status(
            current.round_number,
            current.confirmed_irreversible_round,
            &self.config,
        );
        let confirmed = self.rounds.get(&current.confirmed_irreversible_round.0);
        tiny_block_quota(status, current, confirmed, &self.config)
    }

    /// What `miner` should do right now, with its scheduling window.
    pub fn consensus_command(&self, miner: &MinerId) -> ConsensusCommand {
        let now = self.time.now();
        let quota = self.tiny_block_quota();
        let current = self.current_round();
        let behaviour =
            self.behaviour
                .evaluate(current, miner, now, self.blockchain_start, quota);
        command_for(&self.config, current, miner, now, behaviour, quota)
    }

    /// Validate and apply one candidate header.
    ///
    /// On success the state advances and the caused events are returned;
    /// on failure the state is untouched and the candidate is dead.
    pub fn process(
        &mut self,
        header: &CandidateHeader,
    ) -> Result<Vec<ConsensusEvent>, ValidationFailure> {
        self.check_shape(header)?;
        self.verify_vrf(header)?;

        let quota = self.tiny_block_quota();
        let ctx = ValidationContext {
            base_round: self.current_round(),
            previous_round: self.previous_round(),
            header,
            now: self.time.now(),
            blockchain_start: self.blockchain_start,
            config: &self.config,
            tiny_block_quota: quota,
        };
        self.pipeline.validate(&ctx)?;

        let events = match header.kind {
            HeaderKind::Update => self.apply_update(header)?,
            HeaderKind::TinyBlock => self.apply_tiny_block(header)?,
            HeaderKind::NextRound => self.apply_termination(header, false)?,
            HeaderKind::NextTerm => self.apply_termination(header, true)?,
        };

        self.current_height = header.height;
        self.random_value = header.vrf.random_value;
        self.evict_old_rounds();

        debug!(
            sender = %header.sender,
            kind = %header.kind,
            height = header.height.0,
            round = self.current_round_number.0,
            "header committed"
        );
        Ok(events)
    }

    fn check_shape(&self, header: &CandidateHeader) -> Result<(), ValidationFailure> {
        if header.round.miners_count() == 0 {
            return Err(ValidationFailure::MalformedHeader(
                "carried round has no slots".into(),
            ));
        }
        if header.height <= self.current_height {
            return Err(ValidationFailure::MalformedHeader(format!(
                "height {} does not extend {}",
                header.height, self.current_height
            )));
        }
        Ok(())
    }

    fn verify_vrf(&self, header: &CandidateHeader) -> Result<(), ValidationFailure> {
        let public_key = VrfPublicKey::from_bytes(*header.sender.as_bytes())?;
        let proof = VrfProof::from_bytes(&header.vrf.proof)?;
        let output = public_key.verify(self.random_value.as_bytes(), &proof)?;
        if Hash::from_hash_bytes(&output) != header.vrf.random_value {
            return Err(ValidationFailure::VrfInvalid(VrfError::VerificationFailed));
        }
        Ok(())
    }

    fn apply_update(
        &mut self,
        header: &CandidateHeader,
    ) -> Result<Vec<ConsensusEvent>, ValidationFailure> {
        let update = header.extracted_update().ok_or_else(|| {
            ValidationFailure::MalformedHeader("update payload incomplete".into())
        })?;
        let round_number = self.current_round_number;
        let mut round = self.current_round().clone();
        let mut events = Vec::new();

        {
            let slot = round
                .slot_mut(&header.sender)
                .ok_or(ValidationFailure::MiningPermission(header.sender))?;
            slot.record_block(update.actual_mining_time, false);
            slot.out_value = Some(update.out_value);
            slot.signature = Some(update.signature);
            slot.update_implied_irreversible_height(update.implied_irreversible_height);
            slot.encrypted_pieces = update.encrypted_pieces.clone();
            if let Some(revealed) = update.previous_in_value {
                slot.previous_in_value = Some(RevealedSecret::direct(revealed));
                events.push(ConsensusEvent::SecretRevealed {
                    miner: header.sender,
                    round: round_number,
                    provenance: RevealProvenance::Direct,
                });
            }
        }

        // The sender's published pieces of other miners' secrets land in
        // the owners' slots.
        for (owner, piece) in &update.decrypted_pieces_of_others {
            if let Some(slot) = round.slot_mut(owner) {
                slot.decrypted_pieces.insert(header.sender, piece.clone());
            }
        }

        assign_next_round_order(&mut round, &header.sender, update.supposed_order_of_next_round)
            .map_err(|e| ValidationFailure::UpdateValue(e.to_string()))?;

        self.commit_round_checked(round, header)?;
        Ok(events)
    }

    fn apply_tiny_block(
        &mut self,
        header: &CandidateHeader,
    ) -> Result<Vec<ConsensusEvent>, ValidationFailure> {
        let time = header
            .round
            .slot(&header.sender)
            .and_then(|s| s.latest_actual_mining_time())
            .ok_or_else(|| {
                ValidationFailure::MalformedHeader(
                    "no actual mining time recorded for sender".into(),
                )
            })?;

        let mut round = self.current_round().clone();
        let slot = round
            .slot_mut(&header.sender)
            .ok_or(ValidationFailure::MiningPermission(header.sender))?;
        slot.record_block(time, true);

        self.commit_round_checked(round, header)?;
        Ok(Vec::new())
    }

    /// Shared tail of both terminate paths: settle reveals, advance the
    /// irreversible height, derive the successor, compare identities.
    fn apply_termination(
        &mut self,
        header: &CandidateHeader,
        term_change: bool,
    ) -> Result<Vec<ConsensusEvent>, ValidationFailure> {
        let round_number = self.current_round_number;
        let mut events = Vec::new();

        let previous = self.previous_round().cloned();
        let mut current = self.current_round().clone();

        for outcome in resolve_missing_reveals(&mut current, previous.as_ref(), header.height) {
            events.push(ConsensusEvent::SecretRevealed {
                miner: outcome.miner,
                round: round_number,
                provenance: outcome.secret.provenance,
            });
        }

        let mut confirmed = (
            current.confirmed_irreversible_height,
            current.confirmed_irreversible_round,
        );
        if let Some(height) = advance_irreversible_height(&current, confirmed.0) {
            confirmed = (height, round_number);
            events.push(ConsensusEvent::IrreversibleHeightAdvanced {
                height,
                round: round_number,
            });
        }

        // One report per offence; subsequent terminations stay quiet while
        // the counter remains over the line.
        let mut newly_reported = Vec::new();
        for (miner, missed_time_slots) in
            detect_evil_miners(&current, self.config.missed_slot_tolerance)
        {
            if self.reported_evil_miners.contains(&miner) {
                continue;
            }
            newly_reported.push(miner);
            events.push(ConsensusEvent::EvilMinerDetected {
                miner,
                missed_time_slots,
            });
        }

        let blockchain_age = self
            .time
            .now()
            .duration_since(self.blockchain_start)
            .as_secs();
        let mut next = if term_change {
            let ranking = self.election.next_term_ranking();
            if ranking.is_empty() {
                return Err(ValidationFailure::RoundGeneration(
                    "election ranking is empty".into(),
                ));
            }
            let start = current
                .expected_end_time(self.config.mining_interval)
                .ok_or_else(|| {
                    ValidationFailure::RoundGeneration("no schedule to extend".into())
                })?;
            generate_first_round_of_term(
                &ranking,
                current.term_number.next(),
                current.round_number.next(),
                start,
                blockchain_age,
                confirmed,
                current.extra_block_producer().map(|s| s.miner),
                &self.config,
            )
            .map_err(|e| ValidationFailure::RoundGeneration(e.to_string()))?
        } else {
            generate_next_round(&current, &self.config, blockchain_age)
                .map_err(|e| ValidationFailure::RoundGeneration(e.to_string()))?
        };
        next.confirmed_irreversible_height = confirmed.0;
        next.confirmed_irreversible_round = confirmed.1;

        // The carried snapshot must be the same round we derive locally.
        if next.round_id() != header.round.round_id() {
            return Err(ValidationFailure::RoundIdMismatch {
                expected: next.round_id(),
                got: header.round.round_id(),
            });
        }

        if term_change {
            events.push(ConsensusEvent::TermChanged {
                term: next.term_number,
            });
            info!(
                term = next.term_number.0,
                round = next.round_number.0,
                "term changed"
            );
        }

        // Missed-slot counters start fresh with a new committee, so the
        // report ledger does too.
        if term_change {
            self.reported_evil_miners.clear();
        } else {
            self.reported_evil_miners.extend(newly_reported);
        }

        let next_number = next.round_number;
        self.rounds.insert(round_number.0, current);
        self.rounds.insert(next_number.0, next);
        self.current_round_number = next_number;
        Ok(events)
    }

    /// Commit an in-round mutation after the identity check against the
    /// header's snapshot.
    fn commit_round_checked(
        &mut self,
        round: Round,
        header: &CandidateHeader,
    ) -> Result<(), ValidationFailure> {
        if round.round_id() != header.round.round_id() {
            return Err(ValidationFailure::RoundIdMismatch {
                expected: round.round_id(),
                got: header.round.round_id(),
            });
        }
        self.rounds.insert(round.round_number.0, round);
        Ok(())
    }

    fn evict_old_rounds(&mut self) {
        // Health evaluation reaches back as far as the severe drift, so the
        // retention window never shrinks below it.
        let window = self
            .config
            .kept_rounds
            .max(self.config.severe_round_drift);
        let keep_from = self.current_round_number.0.saturating_sub(window);
        self.rounds.retain(|&number, _| number >= keep_from);
    }
}
