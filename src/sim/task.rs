use crate::error::SimError;
use futures::channel::oneshot;
use futures::task::ArcWake;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct TaskId(pub(crate) u64);

pub(crate) type LocalTask = Pin<Box<dyn Future<Output = ()>>>;

/// FIFO of tasks that have been woken and are waiting to be polled.
#[derive(Debug, Default)]
pub(crate) struct ReadyQueue {
    queue: Mutex<VecDeque<TaskId>>,
}

impl ReadyQueue {
    pub(crate) fn push(&self, id: TaskId) {
        let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
        queue.push_back(id);
    }

    pub(crate) fn pop(&self) -> Option<TaskId> {
        let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
        queue.pop_front()
    }
}

pub(crate) struct TaskWaker {
    pub(crate) id: TaskId,
    pub(crate) ready: Arc<ReadyQueue>,
}

impl ArcWake for TaskWaker {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        arc_self.ready.push(arc_self.id);
    }
}

/// Handle to the output of a spawned task.
#[must_use = "dropping the handle detaches the task"]
pub struct JoinHandle<T> {
    rx: oneshot::Receiver<T>,
}

impl<T> JoinHandle<T> {
    pub(crate) fn new(rx: oneshot::Receiver<T>) -> JoinHandle<T> {
        JoinHandle { rx }
    }

    /// Takes the output if the task has completed.
    pub fn try_take(&mut self) -> Option<T> {
        self.rx.try_recv().ok().flatten()
    }
}

impl<T> Future for JoinHandle<T> {
    type Output = Result<T, SimError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|r| r.map_err(|_| SimError::Canceled))
    }
}
