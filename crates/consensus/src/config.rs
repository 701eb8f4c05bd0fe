//! Protocol configuration.

use std::time::Duration;

/// Tunable parameters of the consensus core.
///
/// Defaults match the reference deployment: four-second slots, eight tiny
/// blocks per slot, weekly terms.
#[derive(Debug, Clone)]
pub struct AedposConfig {
    /// Length of one time slot.
    pub mining_interval: Duration,

    /// Tiny (filler) blocks a miner may produce per round under normal
    /// conditions. Shrinks when the chain falls behind on irreversibility.
    pub tiny_block_limit: u64,

    /// Length of one term period. A term change becomes due once two thirds
    /// of the committee has mined past the current term's period boundary.
    pub period_duration: Duration,

    /// Whether round termination may escalate to a term change at all.
    pub term_change_enabled: bool,

    /// Missed time slots a miner may accumulate before being reported to
    /// the election collaborator.
    pub missed_slot_tolerance: u64,

    /// How many blocks before a term boundary the election ranking is
    /// expected to be frozen by the election collaborator. The core itself
    /// never snapshots the ranking; this parameter is surfaced so callers
    /// implementing [`crate::ElectionProvider`] share one policy knob.
    /// Zero means no freeze window.
    pub ranking_freeze_blocks: u64,

    /// How many superseded rounds to retain for secret reconstruction and
    /// irreversibility lookups before eviction. The effective window never
    /// shrinks below `severe_round_drift`, which health evaluation reaches
    /// back to.
    pub kept_rounds: u64,

    /// Round drift past the last irreversible block at which mining health
    /// is considered abnormal.
    pub abnormal_round_drift: u64,

    /// Round drift at which mining health is considered severe.
    pub severe_round_drift: u64,
}

impl Default for AedposConfig {
    fn default() -> Self {
        Self {
            mining_interval: Duration::from_millis(4_000),
            tiny_block_limit: 8,
            period_duration: Duration::from_secs(7 * 24 * 60 * 60),
            term_change_enabled: true,
            missed_slot_tolerance: 30,
            ranking_freeze_blocks: 0,
            kept_rounds: 32,
            abnormal_round_drift: 8,
            severe_round_drift: 64,
        }
    }
}

impl AedposConfig {
    /// Set the time slot length.
    pub fn with_mining_interval(mut self, interval: Duration) -> Self {
        self.mining_interval = interval;
        self
    }

    /// Set the tiny block limit per round.
    pub fn with_tiny_block_limit(mut self, limit: u64) -> Self {
        self.tiny_block_limit = limit;
        self
    }

    /// Set the term period length.
    pub fn with_period_duration(mut self, period: Duration) -> Self {
        self.period_duration = period;
        self
    }

    /// Enable or disable term changes.
    pub fn with_term_change_enabled(mut self, enabled: bool) -> Self {
        self.term_change_enabled = enabled;
        self
    }

    /// Set the missed-slot tolerance.
    pub fn with_missed_slot_tolerance(mut self, tolerance: u64) -> Self {
        self.missed_slot_tolerance = tolerance;
        self
    }

    /// Set the election-ranking freeze window.
    pub fn with_ranking_freeze_blocks(mut self, blocks: u64) -> Self {
        self.ranking_freeze_blocks = blocks;
        self
    }

    /// Set the retained-round window.
    pub fn with_kept_rounds(mut self, rounds: u64) -> Self {
        self.kept_rounds = rounds;
        self
    }

    /// Set the mining-health drift thresholds.
    pub fn with_round_drift_thresholds(mut self, abnormal: u64, severe: u64) -> Self {
        self.abnormal_round_drift = abnormal;
        self.severe_round_drift = severe;
        self
    }
}
