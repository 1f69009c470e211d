//! Client sessions and the commit events they publish.
//!
//! A [`Session`] issues operations on behalf of one client and reports every
//! successful write or read to a [`CommitObserver`], typically a consistency
//! checker or a [`History`] used by tests.
use crate::ballot::Ballot;
use crate::error::ChangeRejected;
use crate::messages::Key;
use crate::proposer::{ProposalResult, Proposer};
use crate::sim::Ticks;
use bytes::Bytes;
use log::debug;
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitKind {
    Write,
    Read,
}

/// A committed operation as seen by the client that issued it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitEvent {
    pub key: Key,
    pub value: Option<Bytes>,
    pub ballot: Option<Ballot>,
    pub client_id: String,
    /// Virtual time the operation was issued
    pub started: Ticks,
    /// Virtual time the operation completed
    pub timestamp: Ticks,
    pub kind: CommitKind,
}

pub trait CommitObserver {
    fn on_commit(&self, event: &CommitEvent);
}

/// In-memory log of commit events.
#[derive(Clone, Default)]
pub struct History {
    events: Rc<RefCell<Vec<CommitEvent>>>,
}

impl History {
    pub fn new() -> History {
        History::default()
    }

    pub fn events(&self) -> Vec<CommitEvent> {
        self.events.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.events.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.borrow().is_empty()
    }

    /// Events for `key` in completion order.
    pub fn for_key(&self, key: &str) -> Vec<CommitEvent> {
        self.events
            .borrow()
            .iter()
            .filter(|e| e.key == key)
            .cloned()
            .collect()
    }

    /// Number of writes committed by `client_id`
    pub fn writes_by(&self, client_id: &str) -> usize {
        self.events
            .borrow()
            .iter()
            .filter(|e| e.kind == CommitKind::Write && e.client_id == client_id)
            .count()
    }
}

impl CommitObserver for History {
    fn on_commit(&self, event: &CommitEvent) {
        self.events.borrow_mut().push(event.clone());
    }
}

/// Operations issued on behalf of a single client.
pub struct Session {
    client_id: String,
    proposer: Rc<Proposer>,
    observer: Rc<dyn CommitObserver>,
}

impl Session {
    pub fn new<S: Into<String>>(
        client_id: S,
        proposer: Rc<Proposer>,
        observer: Rc<dyn CommitObserver>,
    ) -> Session {
        Session {
            client_id: client_id.into(),
            proposer,
            observer,
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn proposer(&self) -> &Rc<Proposer> {
        &self.proposer
    }

    /// Routes later operations through `proposer`.
    pub fn set_proposer(&mut self, proposer: Rc<Proposer>) {
        self.proposer = proposer;
    }

    pub async fn propose<F>(&self, key: &str, change: F) -> ProposalResult
    where
        F: FnOnce(Option<&Bytes>) -> Result<Bytes, ChangeRejected>,
    {
        let started = self.now();
        let res = self.proposer.propose(key, change).await;
        self.publish(key, started, CommitKind::Write, &res);
        res
    }

    pub async fn read(&self, key: &str) -> ProposalResult {
        let started = self.now();
        let res = self.proposer.read(key).await;
        self.publish(key, started, CommitKind::Read, &res);
        res
    }

    fn now(&self) -> Ticks {
        self.proposer.ctx().now()
    }

    fn publish(&self, key: &str, started: Ticks, kind: CommitKind, res: &ProposalResult) {
        match res {
            Ok(committed) => {
                let event = CommitEvent {
                    key: key.to_string(),
                    value: committed.value.clone(),
                    ballot: committed.ballot,
                    client_id: self.client_id.clone(),
                    started,
                    timestamp: self.now(),
                    kind,
                };
                self.observer.on_commit(&event);
            }
            Err(e) => debug!("{} {:?} on {} failed: {}", self.client_id, kind, key, e),
        }
    }
}
