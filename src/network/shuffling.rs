use super::proxy::{Next, Proxy};
use crate::messages::Envelope;
use crate::sim::{SimContext, Ticks};
use futures::future::{FutureExt, LocalBoxFuture};

/// Stage that holds each envelope for `base + random_int(variance)` ticks.
/// Independent delays reorder envelopes in flight.
pub struct ShufflingProxy {
    ctx: SimContext,
    base: Ticks,
    variance: Ticks,
}

impl ShufflingProxy {
    pub fn new(ctx: SimContext, base: Ticks, variance: Ticks) -> ShufflingProxy {
        ShufflingProxy {
            ctx,
            base,
            variance,
        }
    }
}

impl Proxy for ShufflingProxy {
    fn deliver<'a>(&'a self, envelope: Envelope, next: Next<'a>) -> LocalBoxFuture<'a, ()> {
        async move {
            let delay = self.base + self.ctx.random_int(self.variance);
            self.ctx.after(delay).await;
            next.run(envelope).await;
        }
        .boxed_local()
    }
}
