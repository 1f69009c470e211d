use crate::ballot::{Ballot, NodeId};
use crate::config::ProposerConfig;
use crate::error::{ChangeRejected, ConfigError, Fatal, ProposeError, Recoverable};
use crate::membership::Membership;
use crate::messages::{Envelope, Payload, Request, Response};
use crate::network::{Mailbox, Network};
use crate::quorum::{Quorum, QuorumSet};
use crate::sim::{SimContext, Ticks};
use bytes::Bytes;
use futures::future::{self, Either};
use log::{debug, info, trace, warn};
use std::cell::Cell;
use std::collections::BTreeSet;
use std::rc::Rc;

/// Outcome of a successful round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Committed {
    /// Committed value, `None` when a read found the key empty
    pub value: Option<Bytes>,
    /// Ballot the value is committed at, `None` when nothing was committed
    pub ballot: Option<Ballot>,
}

pub type ProposalResult = Result<Committed, ProposeError>;

/// Progress of a single proposal round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundState {
    Init,
    /// PREPARE sent, collecting PROMISE messages
    Preparing,
    PromiseQuorumReached,
    PrepareFailed,
    /// ACCEPT sent, collecting ACCEPTED messages
    Accepting,
    Committed,
    AcceptFailed,
}

impl RoundState {
    /// Flag indicating the round has finished, successfully or not.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RoundState::PrepareFailed | RoundState::Committed | RoundState::AcceptFailed
        )
    }

    fn can_move_to(self, next: RoundState) -> bool {
        use self::RoundState::*;
        matches!(
            (self, next),
            (Init, Preparing)
                | (Preparing, PromiseQuorumReached)
                | (Preparing, PrepareFailed)
                | (PromiseQuorumReached, Accepting)
                | (PromiseQuorumReached, Committed)
                | (PromiseQuorumReached, PrepareFailed)
                | (Accepting, Committed)
                | (Accepting, AcceptFailed)
        )
    }
}

/// The proposer is a role within paxos that acts as a coordinator for a key
/// in that it attempts to own a ballot via Phase 1. Once it has received a
/// quorum of promises, it applies the caller's change function to the value
/// with the highest accepted ballot already seen (key to the Paxos
/// algorithm) and sends the result with ACCEPT messages in Phase 2.
///
/// Every call to [`Proposer::propose`] or [`Proposer::read`] runs one round
/// with a fresh ballot. Rounds for different keys, and competing rounds for
/// the same key, may run concurrently.
pub struct Proposer {
    config: ProposerConfig,
    network: Network,
    /// Highest ballot used or observed thus far
    highest: Cell<Option<Ballot>>,
    retired: Cell<bool>,
    last_state: Cell<RoundState>,
}

impl Proposer {
    pub fn new(config: ProposerConfig, network: Network) -> Result<Proposer, ConfigError> {
        config.validate()?;
        Ok(Proposer {
            config,
            network,
            highest: Cell::new(None),
            retired: Cell::new(false),
            last_state: Cell::new(RoundState::Init),
        })
    }

    pub fn pid(&self) -> NodeId {
        self.config.pid
    }

    pub fn config(&self) -> &ProposerConfig {
        &self.config
    }

    pub fn membership(&self) -> &Membership {
        &self.config.membership
    }

    pub fn ctx(&self) -> &SimContext {
        self.network.ctx()
    }

    /// Marks the proposer as built against a superseded membership. Later
    /// rounds fail with `StaleMembership`.
    pub fn retire(&self) {
        if !self.retired.replace(true) {
            info!(
                "Proposer {} retired with membership epoch {}",
                self.config.pid,
                self.config.membership.epoch()
            );
        }
    }

    pub fn is_retired(&self) -> bool {
        self.retired.get()
    }

    /// Highest ballot that the proposer has used or seen
    pub fn highest_observed_ballot(&self) -> Option<Ballot> {
        self.highest.get()
    }

    /// State the most recently updated round has reached
    pub fn last_round_state(&self) -> RoundState {
        self.last_state.get()
    }

    /// Overrides the highest seen value, if ballot is the highest seen
    fn observe_ballot(&self, ballot: Ballot) {
        if self.highest.get() < Some(ballot) {
            self.highest.set(Some(ballot));
        }
    }

    /// Ballot strictly greater than every ballot used or observed.
    fn next_ballot(&self) -> Result<Ballot, Fatal> {
        let pid = self.config.pid;
        let ballot = match self.highest.get() {
            None => Ballot(self.config.pidtime, pid),
            Some(highest) => highest
                .higher_for(pid)
                .ok_or(Fatal::BallotExhausted(pid))?,
        };
        self.highest.set(Some(ballot));
        Ok(ballot)
    }

    fn ensure_current(&self) -> Result<(), ProposeError> {
        if self.retired.get() {
            return Err(Recoverable::StaleMembership(self.config.membership.epoch()).into());
        }
        Ok(())
    }

    /// Replaces the value of `key` with the result of `change`, which
    /// receives the value accepted at the highest ballot reported in Phase 1.
    pub async fn propose<F>(&self, key: &str, change: F) -> ProposalResult
    where
        F: FnOnce(Option<&Bytes>) -> Result<Bytes, ChangeRejected>,
    {
        self.ensure_current()?;
        let mut round = Round::open(self, key)?;

        let promised = round.prepare(QuorumSet::write_promises(&self.config.quorum)).await?;
        let current = promised.accepted.as_ref().map(|(_, v)| v);
        let value = match change(current) {
            Ok(value) => value,
            Err(e) => {
                debug!("Proposer {} change for {} rejected: {}", self.pid(), key, e);
                round.transition(RoundState::PrepareFailed);
                return Err(e.into());
            }
        };

        if let Err(e) = self.ensure_current() {
            return Err(round.fail(RoundState::PrepareFailed, e));
        }
        round.accept(value.clone()).await?;
        Ok(Committed {
            value: Some(value),
            ballot: Some(round.ballot),
        })
    }

    /// Reads the committed value of `key`.
    ///
    /// When the highest accepted value found in Phase 1 is already held by a
    /// write quorum (or no value is found at all), it is returned without
    /// Phase 2. Otherwise it is written back at the round's ballot so that
    /// later reads cannot observe an older value.
    pub async fn read(&self, key: &str) -> ProposalResult {
        self.ensure_current()?;
        let mut round = Round::open(self, key)?;

        let promised = round.prepare(QuorumSet::read_promises(&self.config.quorum)).await?;
        match promised.accepted {
            None => {
                round.transition(RoundState::Committed);
                Ok(Committed {
                    value: None,
                    ballot: None,
                })
            }
            Some((ballot, value)) if promised.confirmations >= self.config.quorum.write => {
                round.transition(RoundState::Committed);
                Ok(Committed {
                    value: Some(value),
                    ballot: Some(ballot),
                })
            }
            Some((_, value)) => {
                if let Err(e) = self.ensure_current() {
                    return Err(round.fail(RoundState::PrepareFailed, e));
                }
                round.accept(value.clone()).await?;
                Ok(Committed {
                    value: Some(value),
                    ballot: Some(round.ballot),
                })
            }
        }
    }
}

/// Result of a successful Phase 1.
struct Promised {
    /// Value accepted at the highest ballot among the promises
    accepted: Option<(Ballot, Bytes)>,
    /// Number of promises reporting that same ballot
    confirmations: usize,
}

/// A single ballot's attempt at a key. The mailbox deregisters from the
/// network when the round is dropped, so late responses are discarded.
struct Round<'p> {
    proposer: &'p Proposer,
    key: String,
    ballot: Ballot,
    mailbox: Mailbox,
    state: RoundState,
}

impl<'p> Round<'p> {
    fn open(proposer: &'p Proposer, key: &str) -> Result<Round<'p>, ProposeError> {
        let ballot = proposer.next_ballot()?;
        Ok(Round {
            proposer,
            key: key.to_string(),
            ballot,
            mailbox: proposer.network.open_round(),
            state: RoundState::Init,
        })
    }

    fn ctx(&self) -> &SimContext {
        self.proposer.network.ctx()
    }

    fn transition(&mut self, next: RoundState) {
        debug_assert!(
            self.state.can_move_to(next),
            "invalid round transition {:?} -> {:?}",
            self.state,
            next
        );
        trace!(
            "Proposer {} {} {} at {}: {:?} -> {:?}",
            self.proposer.pid(),
            self.key,
            self.ballot,
            self.ctx().now(),
            self.state,
            next
        );
        self.state = next;
        self.proposer.last_state.set(next);
    }

    fn broadcast(&self, request: Request) {
        let from = self.proposer.pid();
        for to in self.proposer.membership().members() {
            self.proposer.network.send(Envelope::request(
                self.mailbox.round(),
                from,
                to,
                request.clone(),
            ));
        }
    }

    /// Waits for the next response of this round, `None` once `deadline`
    /// passes.
    async fn next_response(&mut self, deadline: Ticks) -> Option<(NodeId, Response)> {
        loop {
            let timeout = self.proposer.network.ctx().sleep_until(deadline);
            let envelope = match future::select(self.mailbox.recv(), timeout).await {
                Either::Left((Some(envelope), _)) => envelope,
                Either::Left((None, _)) | Either::Right(_) => return None,
            };
            let from = envelope.from;
            match envelope.payload {
                Payload::Response(response) if response.ballot() == self.ballot => {
                    return Some((from, response));
                }
                payload => warn!(
                    "Proposer {} ignoring unexpected {:?} from {}",
                    self.proposer.pid(),
                    payload,
                    from
                ),
            }
        }
    }

    fn fail(&mut self, state: RoundState, err: impl Into<ProposeError>) -> ProposeError {
        let err = err.into();
        debug!(
            "Proposer {} {} {} failed: {}",
            self.proposer.pid(),
            self.key,
            self.ballot,
            err
        );
        self.transition(state);
        err
    }

    /// Phase 1: PREPARE to every member until the promise quorum is reached.
    async fn prepare(&mut self, mut quorum: QuorumSet) -> Result<Promised, ProposeError> {
        self.transition(RoundState::Preparing);
        self.broadcast(Request::Prepare {
            key: self.key.clone(),
            ballot: self.ballot,
        });

        let proposer = self.proposer;
        let membership = proposer.membership();
        let deadline = self.ctx().now() + proposer.config.timeout;
        let mut responded = BTreeSet::new();
        let mut stable_left = membership.stable().len();
        let mut members_left = membership.len();
        let mut accepted: Option<(Ballot, Bytes)> = None;
        let mut reported: Vec<Ballot> = Vec::new();

        while !quorum.has_quorum() {
            let (from, response) = match self.next_response(deadline).await {
                Some(r) => r,
                None => return Err(self.fail(RoundState::PrepareFailed, Recoverable::ProposeNoQuorum)),
            };
            if !membership.contains(from) || !responded.insert(from) {
                continue;
            }
            let stable = !membership.is_introducing(from);

            match response {
                Response::Promise {
                    accepted: last, ..
                } => {
                    if let Some((ballot, value)) = last {
                        if ballot > self.ballot {
                            let err = Fatal::AcceptedAboveProposal {
                                acceptor: from,
                                proposed: self.ballot,
                                accepted: ballot,
                            };
                            return Err(self.fail(RoundState::PrepareFailed, err));
                        }
                        reported.push(ballot);
                        if accepted.as_ref().map_or(true, |(b, _)| ballot > *b) {
                            accepted = Some((ballot, value));
                        }
                    }
                    if !stable {
                        trace!("Promise from introducing acceptor {} not counted toward read quorum", from);
                    }
                    quorum.insert(from, stable);
                }
                Response::Reject { promised, .. } => {
                    if promised <= self.ballot {
                        let err = Fatal::RejectNotHigher {
                            acceptor: from,
                            proposed: self.ballot,
                            promised,
                        };
                        return Err(self.fail(RoundState::PrepareFailed, err));
                    }
                    self.proposer.observe_ballot(promised);
                    members_left -= 1;
                    if stable {
                        stable_left -= 1;
                    }
                    if quorum.unreachable(stable_left, members_left) {
                        let err = Recoverable::Conflict(promised);
                        return Err(self.fail(RoundState::PrepareFailed, err));
                    }
                }
                Response::Accepted { .. } => {
                    warn!(
                        "Proposer {} received ACCEPTED from {} during prepare",
                        self.proposer.pid(),
                        from
                    );
                }
            }
        }

        let confirmations = accepted
            .as_ref()
            .map_or(0, |(b, _)| reported.iter().filter(|r| *r == b).count());
        debug!(
            "Quorum reached for Phase 1 of {} {}, highest accepted {:?} ({} confirmations)",
            self.key,
            self.ballot,
            accepted.as_ref().map(|(b, _)| *b),
            confirmations
        );
        self.transition(RoundState::PromiseQuorumReached);
        Ok(Promised {
            accepted,
            confirmations,
        })
    }

    /// Phase 2: ACCEPT to every member until the write quorum is reached.
    async fn accept(&mut self, value: Bytes) -> Result<(), ProposeError> {
        self.transition(RoundState::Accepting);
        self.broadcast(Request::Accept {
            key: self.key.clone(),
            ballot: self.ballot,
            value,
        });

        let proposer = self.proposer;
        let membership = proposer.membership();
        let deadline = self.ctx().now() + proposer.config.timeout;
        let mut accepts = QuorumSet::accepts(&proposer.config.quorum);
        let mut responded = BTreeSet::new();
        let mut stable_left = membership.stable().len();
        let mut members_left = membership.len();
        let mut rejects = 0;

        while !accepts.has_quorum() {
            let (from, response) = match self.next_response(deadline).await {
                Some(r) => r,
                None if rejects > 0 => {
                    return Err(self.fail(RoundState::AcceptFailed, Recoverable::LeadershipUnknown))
                }
                None => return Err(self.fail(RoundState::AcceptFailed, Recoverable::AcceptUnknown)),
            };
            if let Response::Promise { .. } = response {
                trace!("Proposer {} late PROMISE from {}", self.proposer.pid(), from);
                continue;
            }
            if !membership.contains(from) || !responded.insert(from) {
                continue;
            }

            match response {
                Response::Accepted { .. } => {
                    accepts.insert(from, !membership.is_introducing(from));
                }
                Response::Reject { promised, .. } => {
                    if promised <= self.ballot {
                        let err = Fatal::RejectNotHigher {
                            acceptor: from,
                            proposed: self.ballot,
                            promised,
                        };
                        return Err(self.fail(RoundState::AcceptFailed, err));
                    }
                    self.proposer.observe_ballot(promised);
                    rejects += 1;
                    members_left -= 1;
                    if !membership.is_introducing(from) {
                        stable_left -= 1;
                    }
                    if accepts.unreachable(stable_left, members_left) {
                        let err = Recoverable::LeadershipLost(promised);
                        return Err(self.fail(RoundState::AcceptFailed, err));
                    }
                }
                Response::Promise { .. } => {}
            }
        }

        debug!("Committed {} at {}", self.key, self.ballot);
        self.transition(RoundState::Committed);
        Ok(())
    }
}

/// Proposers built against the same membership snapshot.
pub struct ProposerSet {
    membership: Membership,
    proposers: Vec<Rc<Proposer>>,
}

impl ProposerSet {
    /// Builds one proposer per `(pid, pidtime)` pair. Pids must be distinct.
    pub fn build<I>(
        network: &Network,
        membership: &Membership,
        quorum: Quorum,
        timeout: Ticks,
        pids: I,
    ) -> Result<ProposerSet, ConfigError>
    where
        I: IntoIterator<Item = (NodeId, u64)>,
    {
        let mut seen = BTreeSet::new();
        let proposers = pids
            .into_iter()
            .map(|(pid, pidtime)| {
                if !seen.insert(pid) {
                    return Err(ConfigError::DuplicateProposer(pid));
                }
                let config = ProposerConfig::new(pid, pidtime, quorum, membership.clone())
                    .with_timeout(timeout);
                Proposer::new(config, network.clone()).map(Rc::new)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ProposerSet {
            membership: membership.clone(),
            proposers,
        })
    }

    pub fn membership(&self) -> &Membership {
        &self.membership
    }

    pub fn len(&self) -> usize {
        self.proposers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proposers.is_empty()
    }

    pub fn proposers(&self) -> &[Rc<Proposer>] {
        &self.proposers
    }

    /// Uniformly picks a proposer with the simulation RNG.
    pub fn pick(&self, ctx: &SimContext) -> Option<Rc<Proposer>> {
        if self.proposers.is_empty() {
            return None;
        }
        let i = ctx.random_int(self.proposers.len() as u64) as usize;
        self.proposers.get(i).cloned()
    }

    /// Retires every proposer of the set.
    pub fn retire(&self) {
        for p in &self.proposers {
            p.retire();
        }
    }
}
