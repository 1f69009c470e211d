use super::{SimContext, Ticks};
use std::cell::Cell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

/// Future that completes once virtual time reaches its deadline.
///
/// The wake-up is registered on first poll. Dropping the future before the
/// deadline cancels the wake-up so that abandoned timeouts never advance the
/// clock.
#[must_use = "futures do nothing unless polled"]
pub struct Sleep {
    ctx: SimContext,
    deadline: Ticks,
    registered: Option<Rc<Cell<bool>>>,
}

impl Sleep {
    pub(crate) fn new(ctx: SimContext, deadline: Ticks) -> Sleep {
        Sleep {
            ctx,
            deadline,
            registered: None,
        }
    }

    pub fn deadline(&self) -> Ticks {
        self.deadline
    }
}

impl Future for Sleep {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let this = self.get_mut();
        if this.ctx.now() >= this.deadline {
            return Poll::Ready(());
        }
        if this.registered.is_none() {
            let cancelled = this.ctx.schedule_wake(this.deadline, cx.waker().clone());
            this.registered = Some(cancelled);
        }
        Poll::Pending
    }
}

impl Drop for Sleep {
    fn drop(&mut self) {
        if let Some(cancelled) = self.registered.take() {
            cancelled.set(true);
        }
    }
}

/// Future resolving once every runnable task is parked and no wake-up is
/// pending.
#[must_use = "futures do nothing unless polled"]
pub struct Drained {
    ctx: SimContext,
    fired: Option<Rc<Cell<bool>>>,
}

impl Drained {
    pub(crate) fn new(ctx: SimContext) -> Drained {
        Drained { ctx, fired: None }
    }
}

impl Future for Drained {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let this = self.get_mut();
        match &this.fired {
            Some(fired) if fired.get() => Poll::Ready(()),
            Some(_) => Poll::Pending,
            None => {
                this.fired = Some(this.ctx.register_idle(cx.waker().clone()));
                Poll::Pending
            }
        }
    }
}
