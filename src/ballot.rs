use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A `NodeId` is a unique value that identifies an acceptor or a proposer
/// within the simulated cluster.
pub type NodeId = u32;

/// Ballot numbering is an increasing number in order to order proposals
/// across multiple proposers. Ballots are unique in that ballot numbers between
/// proposers are unique (the second component is the owning proposer) and it is
/// algorithmically increasing per proposer.
#[derive(PartialEq, Hash, Eq, Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Ballot(pub u64, pub NodeId);

impl Ballot {
    /// Smallest ballot owned by proposer `n` that is greater than `self`,
    /// `None` once the counter is exhausted.
    pub fn higher_for(&self, n: NodeId) -> Option<Ballot> {
        // the pid alone breaks the tie when it is larger
        if self.1 < n {
            Some(Ballot(self.0, n))
        } else {
            self.0.checked_add(1).map(|c| Ballot(c, n))
        }
    }

    /// Counter portion of the ballot.
    pub fn counter(&self) -> u64 {
        self.0
    }

    /// Proposer owning the ballot.
    pub fn pid(&self) -> NodeId {
        self.1
    }
}

impl PartialOrd for Ballot {
    fn partial_cmp(&self, other: &Ballot) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ballot {
    fn cmp(&self, other: &Ballot) -> Ordering {
        match self.0.cmp(&other.0) {
            Ordering::Equal => self.1.cmp(&other.1),
            o => o,
        }
    }
}

impl fmt::Display for Ballot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.p{}", self.0, self.1)
    }
}
