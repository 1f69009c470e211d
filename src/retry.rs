use crate::sim::{SimContext, Sleep, Ticks};

/// Exponential backoff with full jitter, measured in virtual ticks. Jitter is
/// drawn from the simulation RNG so retries are reproducible.
pub struct Backoff {
    ctx: SimContext,
    max: Ticks,
    v: Ticks,
    initial: Ticks,
}

impl Backoff {
    /// Creates an iterator that relays backoff, capped at the context's
    /// maximum time delay.
    pub fn new(ctx: SimContext, initial: Ticks) -> Backoff {
        let max = ctx.max_time_delay();
        Backoff {
            ctx,
            max,
            v: initial,
            initial,
        }
    }

    /// Sets the maximum wait.
    pub fn set_max(&mut self, max: Ticks) {
        self.max = max;
    }

    /// Resets the backoff to the initial backoff.
    pub fn reset(&mut self) {
        self.v = self.initial;
    }

    fn apply_jitter(&self, ticks: Ticks) -> Ticks {
        self.ctx.random_int(ticks.saturating_add(1))
    }

    pub fn next_wait(&mut self) -> Ticks {
        let v = self.v;
        if v > self.max {
            self.apply_jitter(self.max)
        } else {
            self.v = v.saturating_mul(2);
            self.apply_jitter(v)
        }
    }

    /// Sleeps for the next wait.
    pub fn wait(&mut self) -> Sleep {
        let ticks = self.next_wait();
        self.ctx.after(ticks)
    }
}
