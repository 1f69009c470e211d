use crate::messages::Envelope;
use futures::future::{self, LocalBoxFuture};
use std::rc::Rc;

/// A stage of the simulated network.
///
/// A stage receives every envelope in flight together with the rest of the
/// chain. It forwards by running `next` (possibly after awaiting a clock delay)
/// or drops the envelope by returning without running it.
pub trait Proxy {
    fn deliver<'a>(&'a self, envelope: Envelope, next: Next<'a>) -> LocalBoxFuture<'a, ()>;
}

/// Terminal of a chain, where envelopes arrive after every stage let them
/// through.
pub trait Sink {
    fn arrive(&self, envelope: Envelope);
}

enum Tail<'a> {
    Sink(&'a dyn Sink),
    Next(Box<Next<'a>>),
}

/// Remainder of a chain as seen by a stage.
pub struct Next<'a> {
    stages: &'a [Rc<dyn Proxy>],
    tail: Tail<'a>,
}

impl<'a> Next<'a> {
    /// Continuation that hands envelopes straight to `sink`.
    pub fn sink(sink: &'a dyn Sink) -> Next<'a> {
        Next {
            stages: &[],
            tail: Tail::Sink(sink),
        }
    }

    /// Passes the envelope to the following stage.
    pub fn run(self, envelope: Envelope) -> LocalBoxFuture<'a, ()> {
        match self.stages.split_first() {
            Some((stage, rest)) => stage.deliver(
                envelope,
                Next {
                    stages: rest,
                    tail: self.tail,
                },
            ),
            None => match self.tail {
                Tail::Sink(sink) => {
                    sink.arrive(envelope);
                    Box::pin(future::ready(()))
                }
                Tail::Next(next) => next.run(envelope),
            },
        }
    }
}

/// Ordered composition of stages. A chain is itself a stage, so chains
/// nest; an empty chain delivers immediately.
#[derive(Clone, Default)]
pub struct Chain {
    stages: Vec<Rc<dyn Proxy>>,
}

impl Chain {
    pub fn new() -> Chain {
        Chain::default()
    }

    /// Appends a stage after the existing ones.
    pub fn with<P: Proxy + 'static>(mut self, stage: P) -> Chain {
        self.stages.push(Rc::new(stage));
        self
    }

    pub fn push(&mut self, stage: Rc<dyn Proxy>) {
        self.stages.push(stage);
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Sends `envelope` through every stage into `sink`.
    pub fn transmit<'a>(&'a self, envelope: Envelope, sink: &'a dyn Sink) -> LocalBoxFuture<'a, ()> {
        Next {
            stages: &self.stages,
            tail: Tail::Sink(sink),
        }
        .run(envelope)
    }
}

impl Proxy for Chain {
    fn deliver<'a>(&'a self, envelope: Envelope, next: Next<'a>) -> LocalBoxFuture<'a, ()> {
        Next {
            stages: &self.stages,
            tail: Tail::Next(Box::new(next)),
        }
        .run(envelope)
    }
}
