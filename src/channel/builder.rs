use std::sync::Arc;

use crate::channel::InputChannel;
use crate::hooks::{FlowControl, Scheduler, ThreadScheduler};
use crate::pool::{BlockPool, SlabPool};

/// Builds an [`InputChannel`] with its injected collaborators.
pub struct ChannelBuilder {
    pool: Option<Arc<dyn BlockPool>>,
    flow: Option<Arc<dyn FlowControl>>,
    scheduler: Option<Arc<dyn Scheduler>>,
}

impl Default for ChannelBuilder {
    fn default() -> Self {
        Self {
            pool: None,
            flow: None,
            scheduler: None,
        }
    }
}

impl ChannelBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific block pool (default: a fresh [`SlabPool`]).
    pub fn with_pool(mut self, pool: Arc<dyn BlockPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Enable backpressure accounting. Without a hook, no accounting
    /// happens at all.
    pub fn with_flow_control(mut self, flow: Arc<dyn FlowControl>) -> Self {
        self.flow = Some(flow);
        self
    }

    /// Use a specific continuation scheduler (default:
    /// [`ThreadScheduler`]).
    pub fn with_scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn build(self) -> InputChannel {
        let pool: Arc<dyn BlockPool> = match self.pool {
            Some(pool) => pool,
            None => SlabPool::new(),
        };
        let scheduler: Arc<dyn Scheduler> = match self.scheduler {
            Some(scheduler) => scheduler,
            None => ThreadScheduler::new(),
        };
        InputChannel::new(pool, self.flow, scheduler)
    }
}
