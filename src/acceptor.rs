use crate::ballot::{Ballot, NodeId};
use crate::messages::{Key, Request, Response};
use bytes::Bytes;
use log::debug;
use std::collections::HashMap;

/// Paxos memory for a single key
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Slot {
    /// last promised (or accepted) ballot
    pub promised: Option<Ballot>,
    /// last accepted ballot/value pair
    pub accepted: Option<(Ballot, Bytes)>,
}

/// Encoding of the Acceptor (in-memory Paxos memory) role.
///
/// Every key is an independent single-decree instance. Handlers run to
/// completion without suspending, so operations on one key are linearized
/// by the scheduler.
#[derive(Debug)]
pub struct Acceptor {
    id: NodeId,
    slots: HashMap<Key, Slot>,
}

impl Acceptor {
    pub fn new(id: NodeId) -> Acceptor {
        Acceptor {
            id,
            slots: HashMap::new(),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Handler for a PREPARE message sent from a proposer. The result is either a PROMISE
    /// to the proposer to not accept ballots < proposal or a REJECT if a ballot has been
    /// promised with a ballot > proposal.
    pub fn prepare(&mut self, key: &str, ballot: Ballot) -> Response {
        let slot = self.slots.entry(key.to_string()).or_default();
        match slot.promised.filter(|b| *b > ballot) {
            Some(promised) => {
                debug!(
                    "Acceptor {} rejecting PREPARE {} for {} with greater {}",
                    self.id, ballot, key, promised
                );
                Response::Reject { ballot, promised }
            }
            None => {
                debug!("Acceptor {} promising {} for {}", self.id, ballot, key);
                slot.promised = Some(ballot);
                Response::Promise {
                    ballot,
                    accepted: slot.accepted.clone(),
                }
            }
        }
    }

    /// Handler for an ACCEPT message, which is sent from a proposer when a quorum
    /// for the Phase 1 PREPARE has been made from acceptors. Opposing ballots may still
    /// happen in Phase 2, in which case a REJECT is sent.
    pub fn accept(&mut self, key: &str, ballot: Ballot, value: Bytes) -> Response {
        let slot = self.slots.entry(key.to_string()).or_default();
        match slot.promised.filter(|b| *b > ballot) {
            Some(promised) => {
                debug!(
                    "Acceptor {} rejecting ACCEPT {} for {} with greater {}",
                    self.id, ballot, key, promised
                );
                Response::Reject { ballot, promised }
            }
            None => {
                debug!("Acceptor {} accepting {} for {}", self.id, ballot, key);
                // an acceptor may miss the PREPARE yet take part in the
                // Phase 2 quorum, so the promise moves up with the ACCEPT
                slot.promised = Some(ballot);
                slot.accepted = Some((ballot, value));
                Response::Accepted { ballot }
            }
        }
    }

    /// Dispatches a wire request to the matching handler.
    pub fn handle(&mut self, request: Request) -> Response {
        match request {
            Request::Prepare { key, ballot } => self.prepare(&key, ballot),
            Request::Accept { key, ballot, value } => self.accept(&key, ballot, value),
        }
    }

    /// Ballot of the last promise for `key`
    pub fn promised(&self, key: &str) -> Option<Ballot> {
        self.slots.get(key).and_then(|s| s.promised)
    }

    /// Last accepted ballot/value pair for `key`
    pub fn accepted(&self, key: &str) -> Option<(Ballot, Bytes)> {
        self.slots.get(key).and_then(|s| s.accepted.clone())
    }

    /// Keys with state, in ascending order
    pub fn keys(&self) -> Vec<Key> {
        let mut keys: Vec<Key> = self.slots.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Full state ordered by key
    pub fn snapshot(&self) -> Vec<(Key, Slot)> {
        let mut slots: Vec<(Key, Slot)> = self
            .slots
            .iter()
            .map(|(k, s)| (k.clone(), s.clone()))
            .collect();
        slots.sort_by(|a, b| a.0.cmp(&b.0));
        slots
    }
}
