use crate::ballot::{Ballot, NodeId};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of an independent register. Each key runs its own
/// single-decree consensus.
pub type Key = String;

/// Identifier of a proposal round. Responses are routed back to the round
/// that sent the request, late responses for finished rounds are discarded.
#[derive(Serialize, Deserialize, PartialEq, Eq, Hash, Clone, Copy, Debug, PartialOrd, Ord)]
pub struct RoundId(pub u64);

/// Messages sent from proposers to acceptors.
#[derive(Serialize, Deserialize, PartialEq, Eq, Clone, Debug)]
pub enum Request {
    /// `PREPARE` is the Phase 1a message asking an acceptor to not
    /// accept ballots lower than `ballot` for `key`.
    Prepare { key: Key, ballot: Ballot },
    /// `ACCEPT` is the Phase 2a message asking an acceptor to accept
    /// `value` for `key`. It is predicated on the proposer holding a
    /// quorum of promises for `ballot`.
    Accept {
        key: Key,
        ballot: Ballot,
        value: Bytes,
    },
}

impl Request {
    pub fn key(&self) -> &str {
        match self {
            Request::Prepare { key, .. } | Request::Accept { key, .. } => key,
        }
    }

    pub fn ballot(&self) -> Ballot {
        match self {
            Request::Prepare { ballot, .. } | Request::Accept { ballot, .. } => *ballot,
        }
    }
}

/// Messages sent from acceptors back to proposers.
#[derive(Serialize, Deserialize, PartialEq, Eq, Clone, Debug)]
pub enum Response {
    /// `PROMISE` is the Phase 1b reply. The acceptor will not accept ballots
    /// less than `ballot` and reports its last accepted ballot/value pair.
    Promise {
        ballot: Ballot,
        accepted: Option<(Ballot, Bytes)>,
    },
    /// `ACCEPTED` is the Phase 2b reply.
    Accepted { ballot: Ballot },
    /// `REJECT` is sent in reply to a `PREPARE` or `ACCEPT` whose ballot
    /// precedes the acceptor's last promise.
    Reject { ballot: Ballot, promised: Ballot },
}

impl Response {
    /// Ballot of the request this response answers.
    pub fn ballot(&self) -> Ballot {
        match self {
            Response::Promise { ballot, .. }
            | Response::Accepted { ballot }
            | Response::Reject { ballot, .. } => *ballot,
        }
    }
}

#[derive(Serialize, Deserialize, PartialEq, Eq, Clone, Debug)]
pub enum Payload {
    Request(Request),
    Response(Response),
}

/// A message in flight between a proposer round and an acceptor.
#[derive(Serialize, Deserialize, PartialEq, Eq, Clone, Debug)]
pub struct Envelope {
    /// Round that sent the request, or that the response is addressed to
    pub round: RoundId,
    /// Sending node
    pub from: NodeId,
    /// Destination node
    pub to: NodeId,
    pub payload: Payload,
}

impl Envelope {
    pub fn request(round: RoundId, from: NodeId, to: NodeId, request: Request) -> Envelope {
        Envelope {
            round,
            from,
            to,
            payload: Payload::Request(request),
        }
    }

    /// Creates a reply travelling back to the sender of `self`.
    pub fn reply(&self, response: Response) -> Envelope {
        Envelope {
            round: self.round,
            from: self.to,
            to: self.from,
            payload: Payload::Response(response),
        }
    }
}

impl fmt::Display for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.payload {
            Payload::Request(Request::Prepare { key, ballot }) => write!(
                f,
                "{} -> {} PREPARE({}, {})",
                self.from, self.to, key, ballot
            ),
            Payload::Request(Request::Accept { key, ballot, value }) => write!(
                f,
                "{} -> {} ACCEPT({}, {}, {} bytes)",
                self.from,
                self.to,
                key,
                ballot,
                value.len()
            ),
            Payload::Response(Response::Promise { ballot, accepted }) => write!(
                f,
                "{} -> {} PROMISE({}, accepted={:?})",
                self.from,
                self.to,
                ballot,
                accepted.as_ref().map(|(b, _)| *b)
            ),
            Payload::Response(Response::Accepted { ballot }) => {
                write!(f, "{} -> {} ACCEPTED({})", self.from, self.to, ballot)
            }
            Payload::Response(Response::Reject { ballot, promised }) => write!(
                f,
                "{} -> {} REJECT({}, promised={})",
                self.from, self.to, ballot, promised
            ),
        }
    }
}
