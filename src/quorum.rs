use crate::ballot::NodeId;
use crate::error::ConfigError;
use crate::membership::Membership;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Minimum number of acceptor responses required to conclude each phase.
///
/// Sizes are free parameters rather than a fixed majority. The read quorum
/// concludes Phase 1 and is counted over stable members only, the write quorum
/// concludes Phase 2 and is counted over every member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quorum {
    pub read: usize,
    pub write: usize,
}

impl Quorum {
    pub fn new(read: usize, write: usize) -> Quorum {
        Quorum { read, write }
    }

    /// Simple majority for both phases over `n` acceptors.
    pub fn majority(n: usize) -> Quorum {
        let q = 1 + n / 2;
        Quorum { read: q, write: q }
    }

    /// Checks that the quorum is reachable under `membership` and that any
    /// read quorum intersects any write quorum.
    pub fn validate(&self, membership: &Membership) -> Result<(), ConfigError> {
        let stable = membership.stable().len();
        let members = membership.len();
        if self.read == 0 || self.read > stable {
            return Err(ConfigError::ReadQuorum {
                read: self.read,
                stable,
            });
        }
        if self.write == 0 || self.write > members {
            return Err(ConfigError::WriteQuorum {
                write: self.write,
                members,
            });
        }
        if self.read + self.write <= members {
            return Err(ConfigError::NonIntersecting {
                read: self.read,
                write: self.write,
                members,
            });
        }
        Ok(())
    }
}

/// Distinct responders of one phase, counted against two thresholds: one
/// over stable members and one over every member. A responder is counted
/// once no matter how many messages it sends.
///
/// Phase 1 of a write needs `read` stable promises (which intersect every
/// write quorum) and `write` promises overall. Phase 1 of a read only needs
/// the stable threshold, Phase 2 only the overall one.
#[derive(Clone, Debug, Default)]
pub struct QuorumSet {
    stable: BTreeSet<NodeId>,
    all: BTreeSet<NodeId>,
    stable_needed: usize,
    all_needed: usize,
}

impl QuorumSet {
    pub fn new(stable_needed: usize, all_needed: usize) -> QuorumSet {
        QuorumSet {
            stable_needed,
            all_needed,
            ..QuorumSet::default()
        }
    }

    /// Promises concluding Phase 1 of a write.
    pub fn write_promises(quorum: &Quorum) -> QuorumSet {
        QuorumSet::new(quorum.read, quorum.write)
    }

    /// Promises concluding Phase 1 of a read.
    pub fn read_promises(quorum: &Quorum) -> QuorumSet {
        QuorumSet::new(quorum.read, 0)
    }

    /// Acceptances concluding Phase 2.
    pub fn accepts(quorum: &Quorum) -> QuorumSet {
        QuorumSet::new(0, quorum.write)
    }

    /// Records a response from `node`. Returns false if it was already
    /// counted.
    pub fn insert(&mut self, node: NodeId, stable: bool) -> bool {
        if !self.all.insert(node) {
            return false;
        }
        if stable {
            self.stable.insert(node);
        }
        true
    }

    /// Flag indicating whether both thresholds are met.
    pub fn has_quorum(&self) -> bool {
        self.stable.len() >= self.stable_needed && self.all.len() >= self.all_needed
    }

    /// Flag indicating quorum can no longer be reached when only
    /// `stable_alive` stable members and `members_alive` members in total
    /// have not refused the phase.
    pub fn unreachable(&self, stable_alive: usize, members_alive: usize) -> bool {
        stable_alive < self.stable_needed || members_alive < self.all_needed
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.all.contains(&node)
    }

    pub fn is_empty(&self) -> bool {
        self.all.is_empty()
    }

    /// Number of distinct responders
    pub fn len(&self) -> usize {
        self.all.len()
    }

    /// Number of distinct responders that are stable members
    pub fn stable_len(&self) -> usize {
        self.stable.len()
    }
}
