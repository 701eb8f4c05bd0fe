//! Ordered miner lists.

use crate::MinerId;
use serde::{Deserialize, Serialize};

/// An ordered list of miner identities, e.g. the ranked output of the
/// election collaborator for a new term.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MinerList {
    /// Miners in ranking order.
    pub miners: Vec<MinerId>,
}

impl MinerList {
    /// Create from an ordered list of identities.
    pub fn new(miners: Vec<MinerId>) -> Self {
        Self { miners }
    }

    /// Number of miners.
    pub fn len(&self) -> usize {
        self.miners.len()
    }

    /// Whether the list is empty.
    pub fn is_empty(&self) -> bool {
        self.miners.is_empty()
    }

    /// Whether the given miner appears in the list.
    pub fn contains(&self, miner: &MinerId) -> bool {
        self.miners.contains(miner)
    }

    /// Count of miners present in both lists.
    pub fn intersection_count(&self, other: &MinerList) -> usize {
        self.miners.iter().filter(|m| other.contains(m)).count()
    }
}

impl FromIterator<MinerId> for MinerList {
    fn from_iter<I: IntoIterator<Item = MinerId>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn miner(n: u8) -> MinerId {
        MinerId([n; 32])
    }

    #[test]
    fn test_intersection_count() {
        let a = MinerList::new(vec![miner(1), miner(2), miner(3)]);
        let b = MinerList::new(vec![miner(2), miner(3), miner(4)]);
        assert_eq!(a.intersection_count(&b), 2);

        let disjoint = MinerList::new(vec![miner(8), miner(9)]);
        assert_eq!(a.intersection_count(&disjoint), 0);
    }
}
