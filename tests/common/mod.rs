#![allow(dead_code)]

use paxos_register::register::{self, Versioned};
use paxos_register::{
    Acceptor, Backoff, Chain, CommitEvent, CommitKind, CommitObserver, ErrorKind, JoinHandle,
    LoggingProxy, LossyProxy, Network, NodeId, ProposerSet, Recorder, Session, ShufflingProxy,
    SimConfig, SimContext, Ticks,
};
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;

pub const MAX_TIME_DELAY: Ticks = 1000;
/// Longest a scenario waits for a client to make progress
pub const PROGRESS_LIMIT: Ticks = 2_000_000;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Simulated world with a lossy, shuffling, recorded network.
pub struct World {
    pub ctx: SimContext,
    pub network: Network,
    pub recorder: Recorder,
}

impl World {
    pub fn new(seed: u64, stability: f64) -> World {
        let ctx = SimContext::new(SimConfig::new(seed, MAX_TIME_DELAY));
        let recorder = Recorder::new();
        let chain = Chain::new()
            .with(LossyProxy::new(ctx.clone(), stability).unwrap())
            .with(ShufflingProxy::new(ctx.clone(), 3, 10))
            .with(LoggingProxy::new(ctx.clone(), recorder.clone()));
        let network = Network::new(ctx.clone(), chain);
        World {
            ctx,
            network,
            recorder,
        }
    }

    pub fn add_acceptors(&self, ids: &[NodeId]) {
        for id in ids {
            self.network.register(Acceptor::new(*id));
        }
    }

    /// Accepted value of every key on every acceptor, ordered.
    pub fn acceptor_states(&self) -> Vec<(NodeId, Vec<(String, Option<Versioned<u64>>)>)> {
        self.network
            .acceptor_ids()
            .into_iter()
            .map(|id| {
                let acceptor = self.network.acceptor(id).unwrap();
                let slots = acceptor
                    .borrow()
                    .snapshot()
                    .into_iter()
                    .map(|(key, slot)| {
                        let value = slot
                            .accepted
                            .map(|(_, bytes)| register::decode::<u64>(&bytes).unwrap());
                        (key, value)
                    })
                    .collect();
                (id, slots)
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Observation {
    started: Ticks,
    completed: Ticks,
    version: u64,
    kind: CommitKind,
    client_id: String,
}

/// Oracle for increment workloads.
///
/// Every committed value must carry `value == version`, acknowledged writes
/// never share a version, and an operation never observes a version older
/// than one committed before it started.
#[derive(Default)]
pub struct IncConsistencyChecker {
    observations: RefCell<BTreeMap<String, Vec<Observation>>>,
    violations: RefCell<Vec<String>>,
}

impl IncConsistencyChecker {
    pub fn new() -> Rc<IncConsistencyChecker> {
        Rc::new(IncConsistencyChecker::default())
    }

    pub fn violations(&self) -> Vec<String> {
        self.violations.borrow().clone()
    }

    pub fn assert_consistent(&self) {
        let violations = self.violations();
        assert!(violations.is_empty(), "violations: {:#?}", violations);
    }

    /// Highest version acknowledged for `key`
    pub fn max_version(&self, key: &str) -> Option<u64> {
        self.observations
            .borrow()
            .get(key)
            .and_then(|o| o.iter().map(|o| o.version).max())
    }

    pub fn writes(&self) -> usize {
        self.observations
            .borrow()
            .values()
            .flatten()
            .filter(|o| o.kind == CommitKind::Write)
            .count()
    }

    fn violation(&self, msg: String) {
        log::error!("{}", msg);
        self.violations.borrow_mut().push(msg);
    }
}

impl CommitObserver for IncConsistencyChecker {
    fn on_commit(&self, event: &CommitEvent) {
        let value = match event.value.as_ref() {
            Some(bytes) => match register::decode::<u64>(bytes) {
                Ok(v) => v,
                Err(e) => return self.violation(format!("{}: {}", event.key, e)),
            },
            // reads of keys that were never written
            None => return,
        };
        if value.value != value.version {
            self.violation(format!(
                "{} on {} committed value {} at version {}",
                event.client_id, event.key, value.value, value.version
            ));
        }

        let mut observations = self.observations.borrow_mut();
        let history = observations.entry(event.key.clone()).or_default();
        let preceding = history
            .iter()
            .filter(|o| o.completed < event.started)
            .map(|o| o.version)
            .max();
        if let Some(preceding) = preceding {
            let stale = match event.kind {
                CommitKind::Write => value.version <= preceding,
                CommitKind::Read => value.version < preceding,
            };
            if stale {
                self.violation(format!(
                    "{} {:?} on {} observed version {} after version {} was acknowledged",
                    event.client_id, event.kind, event.key, value.version, preceding
                ));
            }
        }
        if event.kind == CommitKind::Write {
            if let Some(other) = history
                .iter()
                .find(|o| o.kind == CommitKind::Write && o.version == value.version)
            {
                self.violation(format!(
                    "{} and {} both wrote version {} of {}",
                    other.client_id, event.client_id, value.version, event.key
                ));
            }
        }
        history.push(Observation {
            started: event.started,
            completed: event.timestamp,
            version: value.version,
            kind: event.kind,
            client_id: event.client_id.clone(),
        });
    }
}

#[derive(Debug, Default)]
pub struct ClientStats {
    pub writes: Cell<u64>,
    pub recoverable: Cell<u64>,
    pub rejected_changes: Cell<u64>,
}

/// Client that increments random keys through random proposers until it is
/// stopped.
pub struct IncClient {
    id: String,
    stop: Rc<Cell<bool>>,
    stats: Rc<ClientStats>,
    handle: Option<JoinHandle<()>>,
}

impl IncClient {
    pub fn spawn(
        ctx: &SimContext,
        id: &str,
        proposers: Rc<ProposerSet>,
        keys: &[&str],
        checker: Rc<IncConsistencyChecker>,
    ) -> IncClient {
        let stop = Rc::new(Cell::new(false));
        let stats = Rc::new(ClientStats::default());
        let keys: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
        let handle = ctx.spawn(run_inc(
            ctx.clone(),
            id.to_string(),
            proposers,
            keys,
            checker,
            stop.clone(),
            stats.clone(),
        ));
        IncClient {
            id: id.to_string(),
            stop,
            stats,
            handle: Some(handle),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn writes(&self) -> u64 {
        self.stats.writes.get()
    }

    pub fn stats(&self) -> &ClientStats {
        &self.stats
    }

    /// Waits until the client has acknowledged more than `steps` further
    /// writes.
    pub async fn progress(&self, ctx: &SimContext, steps: u64) {
        let target = self.writes() + steps;
        let limit = ctx.now() + PROGRESS_LIMIT;
        while self.writes() <= target {
            assert!(ctx.now() < limit, "{} made no progress", self.id);
            ctx.after(10).await;
        }
    }

    /// Lets the in-flight operation finish, then ends the client.
    pub async fn stop(&mut self) {
        self.stop.set(true);
        if let Some(handle) = self.handle.take() {
            handle.await.unwrap();
        }
    }
}

async fn run_inc(
    ctx: SimContext,
    id: String,
    proposers: Rc<ProposerSet>,
    keys: Vec<String>,
    checker: Rc<IncConsistencyChecker>,
    stop: Rc<Cell<bool>>,
    stats: Rc<ClientStats>,
) {
    let mut known: BTreeMap<String, Versioned<u64>> = BTreeMap::new();
    let mut backoff = Backoff::new(ctx.clone(), 8);
    let mut session = Session::new(id.clone(), proposers.proposers()[0].clone(), checker);

    while !stop.get() {
        let key = keys[ctx.random_int(keys.len() as u64) as usize].clone();
        session.set_proposer(proposers.pick(&ctx).unwrap());

        let res = match known.get(&key) {
            Some(v) => {
                session
                    .propose(&key, register::write_if(v.version, v.value + 1))
                    .await
            }
            None => {
                let inc = |v: Option<u64>| v.map_or(0, |x| x + 1);
                session.propose(&key, register::update(inc)).await
            }
        };

        match res {
            Ok(committed) => {
                let value = committed.value.unwrap();
                known.insert(key, register::decode::<u64>(&value).unwrap());
                stats.writes.set(stats.writes.get() + 1);
                backoff.reset();
            }
            Err(e) if e.kind() == ErrorKind::ChangeRejected => {
                // someone else moved the register, start over from its value
                known.remove(&key);
                stats.rejected_changes.set(stats.rejected_changes.get() + 1);
            }
            Err(e) if e.is_recoverable() => {
                stats.recoverable.set(stats.recoverable.get() + 1);
                backoff.wait().await;
            }
            Err(e) => panic!("{} hit an invariant violation: {}", id, e),
        }
    }
}

/// Client that reads every key once, retrying until each read commits.
pub struct ReadAllKeysClient;

impl ReadAllKeysClient {
    pub fn spawn(
        ctx: &SimContext,
        id: &str,
        proposers: Rc<ProposerSet>,
        keys: &[&str],
        checker: Rc<IncConsistencyChecker>,
    ) -> JoinHandle<Vec<(String, Option<Versioned<u64>>)>> {
        let ctx = ctx.clone();
        let id = id.to_string();
        let keys: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
        let spawner = ctx.clone();
        spawner.spawn(async move {
            let mut backoff = Backoff::new(ctx.clone(), 8);
            let mut session = Session::new(id.clone(), proposers.proposers()[0].clone(), checker);
            let mut values = Vec::new();
            for key in keys {
                loop {
                    session.set_proposer(proposers.pick(&ctx).unwrap());
                    match session.read(&key).await {
                        Ok(committed) => {
                            let value = register::decode_opt::<u64>(committed.value.as_ref()).unwrap();
                            values.push((key, value));
                            backoff.reset();
                            break;
                        }
                        Err(e) if e.is_recoverable() => backoff.wait().await,
                        Err(e) => panic!("{} hit an invariant violation: {}", id, e),
                    }
                }
            }
            values
        })
    }
}
