//! Versioned membership snapshots and reconfiguration safety.
//!
//! A [`Membership`] is never mutated. Growing the acceptor set first produces a
//! snapshot in which the new acceptors are *introducing*: they are addressed by
//! every Prepare and Accept, count toward write quorums, but their promises do
//! not count toward read quorums until they are promoted to stable.
//!
//! Proposers are built against one snapshot. While old and new proposers run
//! concurrently, every pair of quorums they may use must share an acceptor;
//! [`transition_is_safe`] checks this for a pair of snapshots.
use crate::ballot::NodeId;
use crate::error::ConfigError;
use crate::quorum::Quorum;
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    epoch: u64,
    stable: Vec<NodeId>,
    introducing: BTreeSet<NodeId>,
}

impl Membership {
    /// Initial snapshot (epoch 0) of stable acceptors.
    pub fn new(stable: Vec<NodeId>) -> Result<Membership, ConfigError> {
        Membership::with_introducing(stable, Vec::new())
    }

    /// Snapshot with an explicit set of acceptors being introduced.
    pub fn with_introducing(
        stable: Vec<NodeId>,
        introducing: Vec<NodeId>,
    ) -> Result<Membership, ConfigError> {
        if stable.is_empty() {
            return Err(ConfigError::EmptyMembership);
        }
        let mut seen = BTreeSet::new();
        for id in stable.iter().chain(introducing.iter()) {
            if !seen.insert(*id) {
                return Err(ConfigError::DuplicateMember(*id));
            }
        }
        Ok(Membership {
            epoch: 0,
            stable,
            introducing: introducing.into_iter().collect(),
        })
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn stable(&self) -> &[NodeId] {
        &self.stable
    }

    pub fn introducing(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.introducing.iter().cloned()
    }

    /// Every addressed acceptor: stable members in order, then introducing
    /// members in ascending order.
    pub fn members(&self) -> Vec<NodeId> {
        self.stable
            .iter()
            .cloned()
            .chain(self.introducing.iter().cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.stable.len() + self.introducing.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.stable.contains(&id) || self.introducing.contains(&id)
    }

    pub fn is_introducing(&self, id: NodeId) -> bool {
        self.introducing.contains(&id)
    }

    /// Adds acceptors in the introducing state.
    pub fn introduce<I>(&self, ids: I) -> Result<Membership, ConfigError>
    where
        I: IntoIterator<Item = NodeId>,
    {
        let mut next = self.successor();
        for id in ids {
            if next.contains(id) {
                return Err(ConfigError::DuplicateMember(id));
            }
            next.introducing.insert(id);
        }
        info!(
            "Membership epoch {} introduces {:?}",
            next.epoch, next.introducing
        );
        Ok(next)
    }

    /// Moves every introducing acceptor to the stable set.
    pub fn promote(&self) -> Membership {
        let mut next = self.successor();
        let promoted = std::mem::take(&mut next.introducing);
        info!("Membership epoch {} promotes {:?}", next.epoch, promoted);
        next.stable.extend(promoted);
        next
    }

    /// Removes acceptors from the membership.
    pub fn remove<I>(&self, ids: I) -> Result<Membership, ConfigError>
    where
        I: IntoIterator<Item = NodeId>,
    {
        let mut next = self.successor();
        for id in ids {
            next.stable.retain(|m| *m != id);
            next.introducing.remove(&id);
        }
        if next.stable.is_empty() {
            return Err(ConfigError::EmptyMembership);
        }
        info!("Membership epoch {} keeps {:?}", next.epoch, next.members());
        Ok(next)
    }

    fn successor(&self) -> Membership {
        Membership {
            epoch: self.epoch + 1,
            stable: self.stable.clone(),
            introducing: self.introducing.clone(),
        }
    }
}

/// Smallest possible intersection of a quorum of `qa` acceptors drawn from
/// `a` and a quorum of `qb` acceptors drawn from `b`.
pub fn min_overlap(a: &[NodeId], qa: usize, b: &[NodeId], qb: usize) -> usize {
    let a: BTreeSet<NodeId> = a.iter().cloned().collect();
    let b: BTreeSet<NodeId> = b.iter().cloned().collect();
    let common = a.intersection(&b).count();
    let only_a = a.len() - common;
    let only_b = b.len() - common;

    // each quorum is forced into the common part only once it
    // exhausts the acceptors the other side cannot see
    let forced_a = qa.saturating_sub(only_a);
    let forced_b = qb.saturating_sub(only_b);
    (forced_a + forced_b).saturating_sub(common)
}

/// Verifies that proposers built against `old` and `new` may run concurrently:
/// each configuration is valid on its own, and every read or write quorum of
/// one intersects every read or write quorum of the other.
pub fn transition_is_safe(
    old: &Membership,
    old_quorum: &Quorum,
    new: &Membership,
    new_quorum: &Quorum,
) -> Result<(), ConfigError> {
    old_quorum.validate(old)?;
    new_quorum.validate(new)?;

    let old_read = old.stable();
    let old_write = old.members();
    let new_read = new.stable();
    let new_write = new.members();

    let pairs = [
        (&old_write[..], old_quorum.write, new_read, new_quorum.read),
        (old_read, old_quorum.read, &new_write[..], new_quorum.write),
        (&old_write[..], old_quorum.write, &new_write[..], new_quorum.write),
        (old_read, old_quorum.read, new_read, new_quorum.read),
    ];

    if pairs
        .iter()
        .any(|(a, qa, b, qb)| min_overlap(a, *qa, b, *qb) == 0)
    {
        return Err(ConfigError::UnsafeTransition {
            old: old.epoch,
            new: new.epoch,
        });
    }
    Ok(())
}
