//! Error taxonomy for proposals, configuration and the simulation substrate.
//!
//! Proposal failures are split in two: [`Recoverable`] conditions caused by
//! contention, message loss or reconfiguration, which a caller retries with a
//! fresh ballot, and [`Fatal`] protocol invariant violations, which signal a bug
//! and must not be retried.
use crate::ballot::{Ballot, NodeId};
use thiserror::Error;

/// Refusal of a change function to produce a new value, e.g. a version
/// mismatch in the versioned register layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("change rejected: {reason}")]
pub struct ChangeRejected {
    /// Human readable explanation
    pub reason: String,
}

impl ChangeRejected {
    pub fn new<S: Into<String>>(reason: S) -> ChangeRejected {
        ChangeRejected {
            reason: reason.into(),
        }
    }
}

/// Failures that are safe to retry with a new ballot.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Recoverable {
    /// Phase 1 was rejected by enough acceptors that quorum became unreachable.
    #[error("concurrent proposal holds higher ballot {0}")]
    Conflict(Ballot),
    /// Phase 1 did not collect a quorum of promises before the deadline.
    #[error("prepare phase did not reach quorum before the deadline")]
    ProposeNoQuorum,
    /// Phase 2 did not collect a quorum before the deadline. The value may
    /// or may not have been committed.
    #[error("accept phase did not reach quorum, outcome unknown")]
    AcceptUnknown,
    /// Phase 2 was rejected by enough acceptors that quorum became unreachable.
    #[error("ballot ownership lost to {0} during accept phase")]
    LeadershipLost(Ballot),
    /// Phase 2 saw competing ballots but reached neither quorum.
    #[error("ballot ownership contested during accept phase, outcome unknown")]
    LeadershipUnknown,
    /// The change function refused the current value.
    #[error(transparent)]
    ChangeRejected(#[from] ChangeRejected),
    /// The proposer was built against a membership snapshot that has been
    /// superseded by reconfiguration.
    #[error("membership epoch {0} has been superseded")]
    StaleMembership(u64),
}

/// Protocol invariant violations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Fatal {
    /// Acceptors only reject ballots below their promise.
    #[error("acceptor {acceptor} rejected {proposed} citing non-greater ballot {promised}")]
    RejectNotHigher {
        acceptor: NodeId,
        proposed: Ballot,
        promised: Ballot,
    },
    /// Acceptors never promise a ballot below a ballot they have accepted.
    #[error("acceptor {acceptor} promised {proposed} while holding a value accepted at {accepted}")]
    AcceptedAboveProposal {
        acceptor: NodeId,
        proposed: Ballot,
        accepted: Ballot,
    },
    /// The proposer ran out of ballot numbers.
    #[error("ballot counter exhausted for proposer {0}")]
    BallotExhausted(NodeId),
}

/// Outcome of a failed proposal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProposeError {
    #[error(transparent)]
    Recoverable(#[from] Recoverable),
    #[error("invariant violation: {0}")]
    Fatal(#[from] Fatal),
}

impl From<ChangeRejected> for ProposeError {
    fn from(e: ChangeRejected) -> ProposeError {
        ProposeError::Recoverable(Recoverable::ChangeRejected(e))
    }
}

/// Flat classification of [`ProposeError`], used by retry policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Conflict,
    ProposeNoQuorum,
    AcceptUnknown,
    LeadershipLost,
    LeadershipUnknown,
    ChangeRejected,
    StaleMembership,
    InvariantViolation,
}

impl ProposeError {
    /// Indicator that the caller may retry the operation.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ProposeError::Recoverable(_))
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ProposeError::Recoverable(Recoverable::Conflict(_)) => ErrorKind::Conflict,
            ProposeError::Recoverable(Recoverable::ProposeNoQuorum) => ErrorKind::ProposeNoQuorum,
            ProposeError::Recoverable(Recoverable::AcceptUnknown) => ErrorKind::AcceptUnknown,
            ProposeError::Recoverable(Recoverable::LeadershipLost(_)) => ErrorKind::LeadershipLost,
            ProposeError::Recoverable(Recoverable::LeadershipUnknown) => {
                ErrorKind::LeadershipUnknown
            }
            ProposeError::Recoverable(Recoverable::ChangeRejected(_)) => ErrorKind::ChangeRejected,
            ProposeError::Recoverable(Recoverable::StaleMembership(_)) => {
                ErrorKind::StaleMembership
            }
            ProposeError::Fatal(_) => ErrorKind::InvariantViolation,
        }
    }
}

/// Invalid configuration of quorums, membership or the simulated network.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("membership must contain at least one stable acceptor")]
    EmptyMembership,
    #[error("acceptor {0} appears more than once in the membership")]
    DuplicateMember(NodeId),
    /// Ballots are only unique while every proposer has its own pid.
    #[error("proposer pid {0} is used more than once")]
    DuplicateProposer(NodeId),
    #[error("read quorum {read} must be within 1..={stable} stable acceptors")]
    ReadQuorum { read: usize, stable: usize },
    #[error("write quorum {write} must be within 1..={members} acceptors")]
    WriteQuorum { write: usize, members: usize },
    #[error("read quorum {read} and write quorum {write} do not intersect across {members} acceptors")]
    NonIntersecting {
        read: usize,
        write: usize,
        members: usize,
    },
    #[error("quorums of epoch {old} and epoch {new} may be disjoint")]
    UnsafeTransition { old: u64, new: u64 },
    #[error("stability {0} must be within [0, 1]")]
    Stability(f64),
    #[error("proposer timeout must be positive")]
    Timeout,
    #[error("invalid value {value:?} for {var}")]
    Env { var: &'static str, value: String },
}

/// Failures of the simulation scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SimError {
    /// No task is runnable and no timer is pending, yet the awaited future has
    /// not completed.
    #[error("simulation stalled at tick {now} before the awaited task completed")]
    Stalled { now: u64 },
    /// A spawned task was dropped before producing its output.
    #[error("task was dropped before completion")]
    Canceled,
}
