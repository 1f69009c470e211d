//! Simulated message passing between proposers and acceptors.
//!
//! Every envelope travels through a [`Chain`] of [`Proxy`] stages that may
//! delay, reorder, drop or record it. Requests arrive at registered
//! acceptors, whose responses travel back through the same chain into the
//! mailbox of the round that sent the request.
mod logging;
mod lossy;
mod proxy;
mod shuffling;

pub use self::logging::{LoggingProxy, Record, Recorder};
pub use self::lossy::LossyProxy;
pub use self::proxy::{Chain, Next, Proxy, Sink};
pub use self::shuffling::ShufflingProxy;

use crate::acceptor::Acceptor;
use crate::ballot::NodeId;
use crate::messages::{Envelope, Payload, RoundId};
use crate::sim::SimContext;
use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures::stream::StreamExt;
use log::trace;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

struct Inner {
    ctx: SimContext,
    chain: Chain,
    acceptors: RefCell<HashMap<NodeId, Rc<RefCell<Acceptor>>>>,
    mailboxes: RefCell<HashMap<RoundId, UnboundedSender<Envelope>>>,
    next_round: Cell<u64>,
}

/// Handle to the simulated network. Clones share the same chain, acceptors
/// and mailboxes.
#[derive(Clone)]
pub struct Network {
    inner: Rc<Inner>,
}

impl Network {
    pub fn new(ctx: SimContext, chain: Chain) -> Network {
        Network {
            inner: Rc::new(Inner {
                ctx,
                chain,
                acceptors: RefCell::new(HashMap::new()),
                mailboxes: RefCell::new(HashMap::new()),
                next_round: Cell::new(0),
            }),
        }
    }

    pub fn ctx(&self) -> &SimContext {
        &self.inner.ctx
    }

    /// Makes `acceptor` reachable under its id, replacing any previous
    /// acceptor with the same id.
    pub fn register(&self, acceptor: Acceptor) -> Rc<RefCell<Acceptor>> {
        let id = acceptor.id();
        let acceptor = Rc::new(RefCell::new(acceptor));
        self.inner
            .acceptors
            .borrow_mut()
            .insert(id, acceptor.clone());
        acceptor
    }

    pub fn acceptor(&self, id: NodeId) -> Option<Rc<RefCell<Acceptor>>> {
        self.inner.acceptors.borrow().get(&id).cloned()
    }

    /// Registered acceptor ids in ascending order
    pub fn acceptor_ids(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self.inner.acceptors.borrow().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Registers a mailbox for a new round. Responses addressed to the round
    /// are dropped once the mailbox is dropped.
    pub fn open_round(&self) -> Mailbox {
        let round = RoundId(self.inner.next_round.get());
        self.inner.next_round.set(round.0 + 1);
        let (tx, rx) = unbounded();
        self.inner.mailboxes.borrow_mut().insert(round, tx);
        Mailbox {
            round,
            rx,
            network: self.clone(),
        }
    }

    /// Number of rounds currently accepting responses
    pub fn open_rounds(&self) -> usize {
        self.inner.mailboxes.borrow().len()
    }

    /// Schedules delivery of `envelope` as an independent task.
    pub fn send(&self, envelope: Envelope) {
        let network = self.clone();
        drop(self.inner.ctx.spawn(async move {
            network.inner.chain.transmit(envelope, &network).await;
        }));
    }
}

impl Sink for Network {
    fn arrive(&self, envelope: Envelope) {
        match &envelope.payload {
            Payload::Request(request) => {
                let acceptor = self.acceptor(envelope.to);
                match acceptor {
                    Some(acceptor) => {
                        let response = acceptor.borrow_mut().handle(request.clone());
                        self.send(envelope.reply(response));
                    }
                    None => trace!("no acceptor {}, dropping {}", envelope.to, envelope),
                }
            }
            Payload::Response(_) => {
                let mailbox = self.inner.mailboxes.borrow().get(&envelope.round).cloned();
                match mailbox {
                    Some(tx) => {
                        if let Err(e) = tx.unbounded_send(envelope) {
                            trace!("round closed, dropping {}", e.into_inner());
                        }
                    }
                    None => trace!("dropping stale {}", envelope),
                }
            }
        }
    }
}

/// Receiving end of a round's responses.
pub struct Mailbox {
    round: RoundId,
    rx: UnboundedReceiver<Envelope>,
    network: Network,
}

impl Mailbox {
    pub fn round(&self) -> RoundId {
        self.round
    }

    /// Next response addressed to the round.
    pub fn recv(&mut self) -> futures::stream::Next<'_, UnboundedReceiver<Envelope>> {
        self.rx.next()
    }
}

impl Drop for Mailbox {
    fn drop(&mut self) {
        self.network
            .inner
            .mailboxes
            .borrow_mut()
            .remove(&self.round);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ballot::Ballot;
    use crate::config::SimConfig;
    use crate::messages::{Request, Response};
    use assert_matches::assert_matches;

    fn prepare(round: RoundId, to: NodeId) -> Envelope {
        Envelope::request(
            round,
            10,
            to,
            Request::Prepare {
                key: "key1".into(),
                ballot: Ballot(1, 10),
            },
        )
    }

    #[test]
    fn request_reply_through_chain() {
        let ctx = SimContext::new(SimConfig::new(5, 1000));
        ctx.timer().start();
        let recorder = Recorder::new();
        let chain = Chain::new()
            .with(ShufflingProxy::new(ctx.clone(), 3, 10))
            .with(LoggingProxy::new(ctx.clone(), recorder.clone()));
        let network = Network::new(ctx.clone(), chain);
        let acceptor = network.register(Acceptor::new(0));

        let net = network.clone();
        let reply = ctx
            .block_on(async move {
                let mut mailbox = net.open_round();
                net.send(prepare(mailbox.round(), 0));
                mailbox.recv().await
            })
            .unwrap();

        assert_matches!(
            reply,
            Some(Envelope {
                from: 0,
                to: 10,
                payload: Payload::Response(Response::Promise { accepted: None, .. }),
                ..
            })
        );
        assert_eq!(acceptor.borrow().promised("key1"), Some(Ballot(1, 10)));
        // both hops were recorded and each took at least the base delay
        let records = recorder.records();
        assert_eq!(records.len(), 2);
        assert!(records[0].at >= 3);
        assert!(records[1].at >= records[0].at + 3);
        assert_eq!(network.open_rounds(), 0);
    }

    #[test]
    fn stale_and_misaddressed_messages_are_dropped() {
        let ctx = SimContext::new(SimConfig::new(5, 1000));
        ctx.timer().start();
        let network = Network::new(ctx.clone(), Chain::new());
        let acceptor = network.register(Acceptor::new(0));
        assert_eq!(network.acceptor_ids(), vec![0]);

        // the round is closed before the reply comes back
        let round = network.open_round();
        let id = round.round();
        drop(round);
        network.send(prepare(id, 0));
        // nobody is registered as acceptor 7
        network.send(prepare(RoundId(99), 7));

        let timer = ctx.timer();
        ctx.block_on(async move { timer.thread().await }).unwrap();
        assert_eq!(acceptor.borrow().promised("key1"), Some(Ballot(1, 10)));
        assert_eq!(network.open_rounds(), 0);
    }
}
