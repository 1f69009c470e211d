//! Deterministic simulation substrate.
//!
//! A [`SimContext`] owns a virtual clock, a seeded random number generator and
//! a single-threaded cooperative executor. Every suspension point in the crate
//! goes through it, so two runs with the same seed produce the same schedule,
//! the same message order and the same results.
//!
//! Virtual time only moves when no task is runnable: the executor then pops
//! the earliest scheduled wake-up and jumps the clock to its deadline.
mod events;
mod sleep;
mod task;

pub use self::sleep::{Drained, Sleep};
pub use self::task::JoinHandle;

use self::events::{EventQueue, ScheduledWake};
use self::task::{LocalTask, ReadyQueue, TaskId, TaskWaker};
use crate::config::SimConfig;
use crate::error::SimError;
use futures::channel::oneshot;
use log::trace;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::future::Future;
use std::rc::Rc;
use std::sync::Arc;
use std::task::{Context, Waker};

/// Unit of virtual time.
pub type Ticks = u64;

struct SimState {
    now: Ticks,
    started: bool,
    rng: ChaCha8Rng,
    timers: EventQueue,
    next_sequence: u64,
    tasks: HashMap<TaskId, LocalTask>,
    next_task: u64,
    idle: Vec<(Rc<Cell<bool>>, Waker)>,
}

/// Handle to the simulated world. Cloning is cheap and every clone refers to
/// the same clock, RNG and executor.
#[derive(Clone)]
pub struct SimContext {
    config: SimConfig,
    state: Rc<RefCell<SimState>>,
    ready: Arc<ReadyQueue>,
}

impl SimContext {
    pub fn new(config: SimConfig) -> SimContext {
        let state = SimState {
            now: 0,
            started: false,
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            timers: EventQueue::default(),
            next_sequence: 0,
            tasks: HashMap::new(),
            next_task: 0,
            idle: Vec::new(),
        };
        SimContext {
            config,
            state: Rc::new(RefCell::new(state)),
            ready: Arc::new(ReadyQueue::default()),
        }
    }

    pub fn seed(&self) -> u64 {
        self.config.seed
    }

    pub fn max_time_delay(&self) -> Ticks {
        self.config.max_time_delay
    }

    /// Current virtual time.
    pub fn now(&self) -> Ticks {
        self.state.borrow().now
    }

    /// Suspends the caller for `ticks` units of virtual time.
    pub fn after(&self, ticks: Ticks) -> Sleep {
        let deadline = self.now().saturating_add(ticks);
        Sleep::new(self.clone(), deadline)
    }

    /// Alias of [`SimContext::after`].
    pub fn sleep(&self, ticks: Ticks) -> Sleep {
        self.after(ticks)
    }

    /// Suspends the caller until virtual time reaches `deadline`.
    pub fn sleep_until(&self, deadline: Ticks) -> Sleep {
        Sleep::new(self.clone(), deadline)
    }

    /// Uniform draw in `[0, 1)`.
    pub fn random(&self) -> f64 {
        self.state.borrow_mut().rng.random::<f64>()
    }

    /// Uniform draw in `[0, bound)`, zero when `bound` is zero.
    pub fn random_int(&self, bound: u64) -> u64 {
        if bound == 0 {
            return 0;
        }
        self.state.borrow_mut().rng.random_range(0..bound)
    }

    /// Random delay in `[0, max_time_delay)`.
    pub fn random_delay(&self) -> Ticks {
        self.random_int(self.config.max_time_delay)
    }

    /// Sleeps for a random delay.
    pub fn pause(&self) -> Sleep {
        let delay = self.random_delay();
        self.after(delay)
    }

    /// Control over the advance of virtual time.
    pub fn timer(&self) -> Timer {
        Timer { ctx: self.clone() }
    }

    /// Schedules `future` as an independent task. Tasks run in FIFO order of
    /// readiness.
    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + 'static,
        F::Output: 'static,
    {
        let (tx, rx) = oneshot::channel();
        let task = async move {
            let _ = tx.send(future.await);
        };
        let id = {
            let mut state = self.state.borrow_mut();
            let id = TaskId(state.next_task);
            state.next_task += 1;
            state.tasks.insert(id, Box::pin(task));
            id
        };
        self.ready.push(id);
        JoinHandle::new(rx)
    }

    /// Drives the simulation until `future` completes.
    ///
    /// Tasks spawned by `future` that are still running when it completes
    /// stay parked and resume on the next call.
    pub fn block_on<F>(&self, future: F) -> Result<F::Output, SimError>
    where
        F: Future + 'static,
        F::Output: 'static,
    {
        let mut handle = self.spawn(future);
        loop {
            if let Some(output) = handle.try_take() {
                return Ok(output);
            }
            if !self.step() {
                return handle.try_take().ok_or(SimError::Stalled { now: self.now() });
            }
        }
    }

    /// Runs a single unit of work. Returns false when nothing can progress.
    fn step(&self) -> bool {
        if let Some(id) = self.ready.pop() {
            self.poll_task(id);
            return true;
        }
        if self.advance() {
            return true;
        }
        self.wake_idle()
    }

    fn poll_task(&self, id: TaskId) {
        let task = self.state.borrow_mut().tasks.remove(&id);
        // tasks may be woken after they have completed
        let mut task = match task {
            Some(task) => task,
            None => return,
        };
        let waker = futures::task::waker(Arc::new(TaskWaker {
            id,
            ready: self.ready.clone(),
        }));
        let mut cx = Context::from_waker(&waker);
        if task.as_mut().poll(&mut cx).is_pending() {
            self.state.borrow_mut().tasks.insert(id, task);
        }
    }

    /// Moves the clock to the earliest pending wake-up and fires it.
    fn advance(&self) -> bool {
        let waker = {
            let mut state = self.state.borrow_mut();
            if !state.started {
                return false;
            }
            match state.timers.pop_earliest() {
                Some(wake) => {
                    if wake.time() > state.now {
                        trace!("advancing clock {} -> {}", state.now, wake.time());
                        state.now = wake.time();
                    }
                    wake.into_waker()
                }
                None => return false,
            }
        };
        waker.wake();
        true
    }

    fn wake_idle(&self) -> bool {
        let idle = {
            let mut state = self.state.borrow_mut();
            if state.timers.has_pending() || state.idle.is_empty() {
                return false;
            }
            std::mem::take(&mut state.idle)
        };
        for (fired, waker) in idle {
            fired.set(true);
            waker.wake();
        }
        true
    }

    pub(crate) fn schedule_wake(&self, deadline: Ticks, waker: Waker) -> Rc<Cell<bool>> {
        let cancelled = Rc::new(Cell::new(false));
        let mut state = self.state.borrow_mut();
        let sequence = state.next_sequence;
        state.next_sequence += 1;
        state
            .timers
            .schedule(ScheduledWake::new(deadline, sequence, waker, cancelled.clone()));
        cancelled
    }

    pub(crate) fn register_idle(&self, waker: Waker) -> Rc<Cell<bool>> {
        let fired = Rc::new(Cell::new(false));
        self.state.borrow_mut().idle.push((fired.clone(), waker));
        fired
    }
}

/// Switch that lets virtual time flow.
///
/// Until [`Timer::start`] is called, sleeping tasks stay parked and only
/// immediately runnable work executes, which lets a scenario wire up its
/// actors before anything is delivered.
#[derive(Clone)]
pub struct Timer {
    ctx: SimContext,
}

impl Timer {
    pub fn start(&self) {
        self.ctx.state.borrow_mut().started = true;
    }

    pub fn is_started(&self) -> bool {
        self.ctx.state.borrow().started
    }

    /// Resolves once no task is runnable and no wake-up is pending.
    pub fn thread(&self) -> Drained {
        Drained::new(self.ctx.clone())
    }
}
