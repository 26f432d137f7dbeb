//! Decides whether a batch is due, based on the persisted last run.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, info};

use confbot_shared::Result;
use confbot_storage::{Clock, RunStateStore};

#[derive(Clone)]
pub struct Scheduler {
    state: RunStateStore,
    clock: Arc<dyn Clock>,
    interval: TimeDelta,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("state", &self.state)
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    pub fn new(state: RunStateStore, clock: Arc<dyn Clock>, interval: TimeDelta) -> Self {
        Self {
            state,
            clock,
            interval,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Last successful run, if one was ever recorded and is readable.
    pub async fn last_run(&self) -> Option<DateTime<Utc>> {
        self.state.load().await
    }

    /// True on first boot, after unreadable state, or once the interval has elapsed.
    pub async fn is_due(&self) -> bool {
        match self.last_run().await {
            None => {
                debug!("no usable run state, batch is due");
                true
            }
            Some(last) => self.clock.now() - last >= self.interval,
        }
    }

    /// When the next batch becomes due. `None` means now.
    pub async fn next_due(&self) -> Option<DateTime<Utc>> {
        self.last_run().await.map(|last| last + self.interval)
    }

    pub async fn record_run(&self, at: DateTime<Utc>) -> Result<()> {
        self.state.save(at).await?;
        info!(last_run = %at, "recorded batch run");
        Ok(())
    }
}
