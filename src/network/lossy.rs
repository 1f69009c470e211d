use super::proxy::{Next, Proxy};
use crate::error::ConfigError;
use crate::messages::Envelope;
use crate::sim::SimContext;
use futures::future::{FutureExt, LocalBoxFuture};
use log::trace;

/// Stage that forwards each envelope with probability `stability` and
/// silently drops it otherwise.
pub struct LossyProxy {
    ctx: SimContext,
    stability: f64,
}

impl LossyProxy {
    pub fn new(ctx: SimContext, stability: f64) -> Result<LossyProxy, ConfigError> {
        if !(0.0..=1.0).contains(&stability) {
            return Err(ConfigError::Stability(stability));
        }
        Ok(LossyProxy { ctx, stability })
    }

    pub fn stability(&self) -> f64 {
        self.stability
    }
}

impl Proxy for LossyProxy {
    fn deliver<'a>(&'a self, envelope: Envelope, next: Next<'a>) -> LocalBoxFuture<'a, ()> {
        async move {
            if self.ctx.random() < self.stability {
                next.run(envelope).await;
            } else {
                trace!("[{}] lost {}", self.ctx.now(), envelope);
            }
        }
        .boxed_local()
    }
}
