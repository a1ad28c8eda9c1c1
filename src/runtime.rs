//! Shared runtime handle.
//!
//! A [`Runtime`] bundles what every stage needs besides its own state: the
//! flush scheduler, the timer queue and the stage-id counter. Clones share
//! the same instance. Separate runtimes never see each other's queues, which
//! keeps tests isolated.

use crate::config::BusConfig;
use crate::error::Result;
use crate::pipeline::id::StageId;
use crate::pipeline::stage::Stage;
use crate::scheduler::{LocalTimers, ManualTimers, Scheduler, Task, Timers};
use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

struct RuntimeInner {
    scheduler: Scheduler,
    timers: Rc<dyn Timers>,
    next_stage_id: Cell<u32>,
}

#[derive(Clone)]
pub struct Runtime {
    inner: Rc<RuntimeInner>,
}

impl Runtime {
    pub fn new(config: BusConfig, timers: Rc<dyn Timers>) -> Self {
        let scheduler = Scheduler::new(config.scheduler, Rc::clone(&timers));
        Self {
            inner: Rc::new(RuntimeInner {
                scheduler,
                timers,
                next_stage_id: Cell::new(0),
            }),
        }
    }

    /// Runtime on a virtual clock; the returned queue is driven by the caller.
    pub fn manual(config: BusConfig) -> (Self, Rc<ManualTimers>) {
        let timers = Rc::new(ManualTimers::new());
        (Self::new(config, timers.clone()), timers)
    }

    /// Runtime on tokio timers; stages must be driven inside a `LocalSet`.
    pub fn local(config: BusConfig) -> (Self, Rc<LocalTimers>) {
        let timers = Rc::new(LocalTimers::new());
        (Self::new(config, timers.clone()), timers)
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.inner.scheduler
    }

    pub fn schedule(&self, delay: Duration, task: Task) {
        self.inner.timers.schedule(delay, task);
    }

    /// Release every batched stage now.
    pub fn flush(&self) -> Result<()> {
        self.inner.scheduler.flush()
    }

    /// New pass-through stage owned by the caller.
    pub fn stage(&self) -> Rc<Stage> {
        Stage::new(self)
    }

    /// Drop pending batch work, including what queued stages have buffered.
    /// Timer tasks already handed to the timer queue still run and find
    /// nothing to release.
    pub fn shutdown(&self) {
        tracing::debug!(pending = self.inner.scheduler.pending(), "runtime shutdown");
        self.inner.scheduler.clear();
    }

    pub(crate) fn next_stage_id(&self) -> StageId {
        let id = self.inner.next_stage_id.get();
        self.inner.next_stage_id.set(id + 1);
        StageId(id)
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("scheduler", &self.inner.scheduler)
            .field("stages", &self.inner.next_stage_id.get())
            .finish()
    }
}
