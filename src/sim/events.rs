use super::Ticks;
use std::cell::Cell;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::rc::Rc;
use std::task::Waker;

/// A wake-up scheduled for a specific virtual time.
#[derive(Debug)]
pub(crate) struct ScheduledWake {
    time: Ticks,
    // tie-break for wake-ups at the same tick
    sequence: u64,
    waker: Waker,
    cancelled: Rc<Cell<bool>>,
}

impl ScheduledWake {
    pub(crate) fn new(
        time: Ticks,
        sequence: u64,
        waker: Waker,
        cancelled: Rc<Cell<bool>>,
    ) -> ScheduledWake {
        ScheduledWake {
            time,
            sequence,
            waker,
            cancelled,
        }
    }

    pub(crate) fn time(&self) -> Ticks {
        self.time
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.get()
    }

    pub(crate) fn into_waker(self) -> Waker {
        self.waker
    }
}

impl PartialEq for ScheduledWake {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.sequence == other.sequence
    }
}

impl Eq for ScheduledWake {}

impl PartialOrd for ScheduledWake {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledWake {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max heap, earliest (time, sequence) must pop first
        match other.time.cmp(&self.time) {
            Ordering::Equal => other.sequence.cmp(&self.sequence),
            o => o,
        }
    }
}

/// Wake-ups ordered by virtual time, then by scheduling order.
#[derive(Debug, Default)]
pub(crate) struct EventQueue {
    heap: BinaryHeap<ScheduledWake>,
}

impl EventQueue {
    pub(crate) fn schedule(&mut self, wake: ScheduledWake) {
        self.heap.push(wake);
    }

    /// Removes the earliest wake-up that has not been cancelled.
    pub(crate) fn pop_earliest(&mut self) -> Option<ScheduledWake> {
        while let Some(wake) = self.heap.pop() {
            if !wake.is_cancelled() {
                return Some(wake);
            }
        }
        None
    }

    /// Flag indicating that a live wake-up is still pending.
    pub(crate) fn has_pending(&self) -> bool {
        self.heap.iter().any(|w| !w.is_cancelled())
    }
}
