//! Flush scheduler for batched stages.
//!
//! Batching stages enqueue themselves here instead of releasing inline. A
//! [`Scheduler::flush`] drains the queue generation by generation:
//!
//! ```text
//! take queue ──► release every stage in enqueue order ──► take queue again ──► ...
//!                  (releases may enqueue more stages)
//! ```
//!
//! The queue is swapped out before each drain, so stages enqueued while a
//! generation is being released land in the next generation and never touch
//! the one being iterated. A flush that still has work after
//! `max_generations` drains is treated as a feedback loop and fails with
//! [`BusError::BatchCycle`].

pub mod local;
pub mod timers;

pub use local::LocalTimers;
pub use timers::{ManualTimers, Task, Timers};

use crate::config::SchedulerSettings;
use crate::error::{BusError, Result};
use crate::pipeline::stage::Stage;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

struct SchedulerInner {
    queue: RefCell<Vec<Weak<Stage>>>,
    primed: Cell<bool>,
    settings: SchedulerSettings,
    timers: Rc<dyn Timers>,
}

/// Shared handle to one pending-stage queue.
#[derive(Clone)]
pub struct Scheduler {
    inner: Rc<SchedulerInner>,
}

impl Scheduler {
    pub fn new(settings: SchedulerSettings, timers: Rc<dyn Timers>) -> Self {
        Self {
            inner: Rc::new(SchedulerInner {
                queue: RefCell::new(Vec::new()),
                primed: Cell::new(false),
                settings,
                timers,
            }),
        }
    }

    pub fn settings(&self) -> &SchedulerSettings {
        &self.inner.settings
    }

    /// Number of stages waiting for the next flush.
    pub fn pending(&self) -> usize {
        self.inner.queue.borrow().len()
    }

    /// Whether an automatic flush is scheduled or running.
    pub fn is_primed(&self) -> bool {
        self.inner.primed.get()
    }

    /// Queue `stage` for release by the next flush.
    pub fn enqueue(&self, stage: &Rc<Stage>) {
        self.inner.queue.borrow_mut().push(Rc::downgrade(stage));
        tracing::trace!(stage = %stage.id(), pending = self.pending(), "stage queued for flush");

        self.prime();
    }

    /// Schedule one automatic flush unless one is already pending.
    fn prime(&self) {
        if !self.inner.settings.auto_flush || self.inner.primed.replace(true) {
            return;
        }
        let weak = Rc::downgrade(&self.inner);
        self.inner.timers.schedule(
            self.inner.settings.flush_delay(),
            Box::new(move || match weak.upgrade() {
                Some(inner) => Scheduler { inner }.flush(),
                None => Ok(()),
            }),
        );
    }

    /// Release every queued stage, including stages queued by those releases.
    ///
    /// A failing release aborts the flush; stages of the interrupted
    /// generation that were not reached stay queued for the next flush.
    pub fn flush(&self) -> Result<()> {
        let result = self.drain();
        self.inner.primed.set(false);
        if result.is_err() && self.pending() > 0 {
            tracing::debug!(pending = self.pending(), "stages left queued after failed drain");
            self.prime();
        }
        result
    }

    fn drain(&self) -> Result<()> {
        let limit = self.inner.settings.max_generations;
        let mut generations = 0;
        let mut batch = self.take_queue();

        while !batch.is_empty() {
            if generations >= limit {
                let pending = batch.len();
                for stage in batch.iter().filter_map(Weak::upgrade) {
                    stage.reset_pending();
                }
                tracing::error!(limit, pending, "batch cycling loop detected, flush aborted");
                return Err(BusError::BatchCycle { limit, pending });
            }
            generations += 1;
            tracing::debug!(generation = generations, stages = batch.len(), "draining batch generation");

            let mut stages = batch.into_iter();
            while let Some(weak) = stages.next() {
                let Some(stage) = weak.upgrade() else {
                    continue;
                };
                if let Err(e) = stage.fire_content() {
                    self.requeue_front(stages.collect());
                    return Err(e);
                }
            }

            batch = self.take_queue();
        }

        Ok(())
    }

    /// Drop all pending work. Queued stages lose their buffered content, so
    /// nothing accepted before the clear is released after it.
    pub fn clear(&self) {
        for stage in self.take_queue().iter().filter_map(Weak::upgrade) {
            stage.discard();
        }
        self.inner.primed.set(false);
    }

    fn take_queue(&self) -> Vec<Weak<Stage>> {
        std::mem::take(&mut *self.inner.queue.borrow_mut())
    }

    fn requeue_front(&self, mut rest: Vec<Weak<Stage>>) {
        if rest.is_empty() {
            return;
        }
        let mut queue = self.inner.queue.borrow_mut();
        rest.append(&mut queue);
        *queue = rest;
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("pending", &self.pending())
            .field("primed", &self.is_primed())
            .field("settings", &self.inner.settings)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BusConfig, SchedulerSettings};
    use crate::pipeline::operator::{HoldConfig, Operator, Release};
    use crate::pipeline::Value;
    use crate::runtime::Runtime;
    use crate::scheduler::ManualTimers;

    fn manual_runtime() -> Runtime {
        let config = BusConfig {
            scheduler: SchedulerSettings::manual(),
            ..BusConfig::default()
        };
        Runtime::manual(config).0
    }

    fn batched(rt: &Runtime) -> Rc<Stage> {
        Stage::with_operator(
            rt,
            Operator::Hold(HoldConfig {
                release: Release::Batch,
                ..HoldConfig::default()
            }),
        )
    }

    fn tagged(rt: &Runtime, log: &Rc<RefCell<Vec<String>>>, tag: &'static str) -> Rc<Stage> {
        let log = Rc::clone(log);
        Stage::with_operator(
            rt,
            Operator::run(move |v, _, _| {
                log.borrow_mut().push(format!("{tag}:{v}"));
                Ok(())
            }),
        )
    }

    #[test]
    fn test_generations_release_in_arrival_order() {
        let rt = manual_runtime();
        let log = Rc::new(RefCell::new(Vec::new()));

        let a1 = batched(&rt);
        let a2 = batched(&rt);
        let b = batched(&rt);
        let a1_out = tagged(&rt, &log, "a1");
        let a2_out = tagged(&rt, &log, "a2");
        let b_out = tagged(&rt, &log, "b");
        a1.flows_to(&a1_out);
        a1.flows_to(&b);
        a2.flows_to(&a2_out);
        b.flows_to(&b_out);

        a1.accept(Value::Int(1), None).unwrap();
        a2.accept(Value::Int(2), None).unwrap();
        assert_eq!(rt.scheduler().pending(), 2);

        rt.flush().unwrap();
        assert_eq!(*log.borrow(), vec!["a1:1", "a2:2", "b:1"]);
        assert_eq!(rt.scheduler().pending(), 0);
        assert!(!b.is_primed());
    }

    #[test]
    fn test_feedback_loop_is_detected() {
        let rt = manual_runtime();
        let looping = batched(&rt);
        looping.flows_to(&looping);

        looping.accept(Value::Int(1), None).unwrap();
        let err = rt.flush().unwrap_err();
        assert!(matches!(
            err,
            BusError::BatchCycle {
                limit: DEFAULT_LIMIT,
                pending: 1
            }
        ));
        assert!(!looping.is_primed());
        assert_eq!(rt.scheduler().pending(), 0);
    }

    const DEFAULT_LIMIT: usize = crate::config::DEFAULT_MAX_GENERATIONS;

    #[test]
    fn test_auto_flush_runs_on_timers() {
        let (rt, timers) = Runtime::manual(BusConfig::default());
        let log = Rc::new(RefCell::new(Vec::new()));
        let stage = batched(&rt);
        let out = tagged(&rt, &log, "out");
        stage.flows_to(&out);

        stage.accept(Value::Int(1), None).unwrap();
        stage.accept(Value::Int(2), None).unwrap();
        assert!(rt.scheduler().is_primed());
        assert_eq!(timers.pending(), 1);

        timers.run_until_idle().unwrap();
        assert_eq!(*log.borrow(), vec!["out:2"]);
        assert!(!rt.scheduler().is_primed());
    }

    #[test]
    fn test_auto_flush_resumes_after_clear() {
        let (rt, timers) = Runtime::manual(BusConfig::default());
        let log = Rc::new(RefCell::new(Vec::new()));
        let stage = batched(&rt);
        let out = tagged(&rt, &log, "out");
        stage.flows_to(&out);

        stage.accept(Value::Int(1), None).unwrap();
        rt.shutdown();
        assert!(!rt.scheduler().is_primed());

        // The stale flush task is still queued; a new one is primed anyway
        stage.accept(Value::Int(2), None).unwrap();
        assert!(rt.scheduler().is_primed());
        assert_eq!(timers.pending(), 2);

        timers.run_until_idle().unwrap();
        assert_eq!(*log.borrow(), vec!["out:2"]);
        assert!(!rt.scheduler().is_primed());
    }

    #[test]
    fn test_manual_settings_never_schedule() {
        let timers = Rc::new(ManualTimers::new());
        let scheduler = Scheduler::new(SchedulerSettings::manual(), timers.clone());
        let rt = manual_runtime();
        scheduler.enqueue(&batched(&rt));
        assert_eq!(scheduler.pending(), 1);
        assert_eq!(timers.pending(), 0);
        assert!(!scheduler.is_primed());
    }

    #[test]
    fn test_clear_drops_pending_work() {
        let rt = manual_runtime();
        let log = Rc::new(RefCell::new(Vec::new()));
        let stage = batched(&rt);
        let out = tagged(&rt, &log, "out");
        stage.flows_to(&out);

        stage.accept(Value::Int(1), None).unwrap();
        assert!(stage.is_primed());
        rt.scheduler().clear();
        assert!(!stage.is_primed());
        assert!(stage.buffer().is_empty());

        rt.flush().unwrap();
        assert!(log.borrow().is_empty());

        stage.accept(Value::Int(2), None).unwrap();
        rt.flush().unwrap();
        assert_eq!(*log.borrow(), vec!["out:2"]);
    }

    #[test]
    fn test_failed_release_requeues_the_rest() {
        let rt = manual_runtime();
        let log = Rc::new(RefCell::new(Vec::new()));

        let first = batched(&rt);
        let failing = Stage::with_operator(
            &rt,
            Operator::run(|_, _, _| Err(anyhow::anyhow!("sink rejected value"))),
        );
        first.flows_to(&failing);
        let second = batched(&rt);
        let second_out = tagged(&rt, &log, "second");
        second.flows_to(&second_out);

        first.accept(Value::Int(1), None).unwrap();
        second.accept(Value::Int(2), None).unwrap();

        let err = rt.flush().unwrap_err();
        assert!(matches!(err, BusError::Operator { stage, .. } if stage == failing.id()));
        assert_eq!(rt.scheduler().pending(), 1);
        assert!(log.borrow().is_empty());

        rt.flush().unwrap();
        assert_eq!(*log.borrow(), vec!["second:2"]);
    }
}
