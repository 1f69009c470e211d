use super::proxy::{Next, Proxy};
use crate::messages::Envelope;
use crate::sim::{SimContext, Ticks};
use futures::future::LocalBoxFuture;
use log::trace;
use std::cell::RefCell;
use std::rc::Rc;

/// An envelope observed at a point in virtual time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub at: Ticks,
    pub envelope: Envelope,
}

/// Shared, append-only log of observed envelopes. Two runs with the same
/// seed produce equal recordings.
#[derive(Clone, Default)]
pub struct Recorder {
    records: Rc<RefCell<Vec<Record>>>,
}

impl Recorder {
    pub fn new() -> Recorder {
        Recorder::default()
    }

    pub fn record(&self, at: Ticks, envelope: &Envelope) {
        self.records.borrow_mut().push(Record {
            at,
            envelope: envelope.clone(),
        });
    }

    pub fn len(&self) -> usize {
        self.records.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.borrow().is_empty()
    }

    /// Copy of every record so far.
    pub fn records(&self) -> Vec<Record> {
        self.records.borrow().clone()
    }

    /// Records rendered one per line as `[tick] envelope`.
    pub fn lines(&self) -> Vec<String> {
        self.records
            .borrow()
            .iter()
            .map(|r| format!("[{}] {}", r.at, r.envelope))
            .collect()
    }
}

/// Stage that records and logs every envelope passing through without
/// affecting delivery or timing.
pub struct LoggingProxy {
    ctx: SimContext,
    recorder: Recorder,
}

impl LoggingProxy {
    pub fn new(ctx: SimContext, recorder: Recorder) -> LoggingProxy {
        LoggingProxy { ctx, recorder }
    }

    pub fn recorder(&self) -> &Recorder {
        &self.recorder
    }
}

impl Proxy for LoggingProxy {
    fn deliver<'a>(&'a self, envelope: Envelope, next: Next<'a>) -> LocalBoxFuture<'a, ()> {
        let now = self.ctx.now();
        trace!("[{}] {}", now, envelope);
        self.recorder.record(now, &envelope);
        next.run(envelope)
    }
}
