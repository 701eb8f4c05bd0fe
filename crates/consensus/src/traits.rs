//! Collaborator seams.
//!
//! The core consumes two read-only external services: the election ranking
//! for new terms and a wall-clock oracle. Both are held as `Arc<dyn ..>` so
//! hosts can swap implementations without touching the state machine.

use aedpos_types::{MinerList, Timestamp};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::RwLock;
use std::time::Duration;

/// Source of the elected validator ranking.
///
/// Lookups must be side-effect-free and synchronous; retry policy belongs
/// to the caller, never to the core.
pub trait ElectionProvider: Send + Sync {
    /// Ranked identities for the next term's first round.
    fn next_term_ranking(&self) -> MinerList;

    /// Target committee size.
    fn validator_count(&self) -> u32;
}

/// Wall-clock oracle. Must be monotonic.
pub trait TimeProvider: Send + Sync {
    /// Current time.
    fn now(&self) -> Timestamp;
}

/// An election provider backed by a replaceable in-memory ranking.
#[derive(Debug, Default)]
pub struct StaticElectionProvider {
    ranking: RwLock<MinerList>,
}

impl StaticElectionProvider {
    /// Create with an initial ranking.
    pub fn new(ranking: MinerList) -> Self {
        Self {
            ranking: RwLock::new(ranking),
        }
    }

    /// Replace the ranking, e.g. after an election round settles.
    pub fn set_ranking(&self, ranking: MinerList) {
        if let Ok(mut guard) = self.ranking.write() {
            *guard = ranking;
        }
    }
}

impl ElectionProvider for StaticElectionProvider {
    fn next_term_ranking(&self) -> MinerList {
        self.ranking
            .read()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    fn validator_count(&self) -> u32 {
        self.ranking
            .read()
            .map(|guard| guard.len() as u32)
            .unwrap_or(0)
    }
}

/// A manually driven clock, mainly for simulations and tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    /// Create a clock set to `now`.
    pub fn new(now: Timestamp) -> Self {
        Self {
            now: AtomicI64::new(now.as_millis()),
        }
    }

    /// Jump to an absolute time.
    pub fn set(&self, now: Timestamp) {
        self.now.store(now.as_millis(), Ordering::SeqCst);
    }

    /// Move forward.
    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(by.as_millis() as i64, Ordering::SeqCst);
    }
}

impl TimeProvider for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_millis(self.now.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aedpos_types::MinerId;

    #[test]
    fn test_static_election_ranking_replacement() {
        let provider = StaticElectionProvider::new(MinerList::new(vec![MinerId([1; 32])]));
        assert_eq!(provider.validator_count(), 1);

        provider.set_ranking(MinerList::new(vec![MinerId([2; 32]), MinerId([3; 32])]));
        assert_eq!(provider.validator_count(), 2);
        assert!(provider.next_term_ranking().contains(&MinerId([3; 32])));
    }

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::new(Timestamp::from_millis(1_000));
        clock.advance(Duration::from_secs(4));
        assert_eq!(clock.now(), Timestamp::from_millis(5_000));
        clock.set(Timestamp::from_millis(100));
        assert_eq!(clock.now(), Timestamp::from_millis(100));
    }
}
