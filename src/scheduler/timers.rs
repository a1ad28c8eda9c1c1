//! Timer capability used for delayed forwards, deferred releases and
//! automatically scheduled flushes.
//!
//! Everything runs on one thread: a task only ever runs after the call that
//! scheduled it has returned.

use crate::error::Result;
use std::cell::{Cell, RefCell};
use std::time::Duration;

/// A unit of deferred work. Errors are surfaced by whoever drives the queue.
pub type Task = Box<dyn FnOnce() -> Result<()>>;

/// Anything that can run a task after a delay on the current thread.
pub trait Timers {
    fn schedule(&self, delay: Duration, task: Task);
}

struct Entry {
    due: Duration,
    seq: u64,
    task: Task,
}

/// Virtual-time timer queue driven explicitly by the caller.
///
/// Tasks run in due-time order; tasks due at the same instant run in the
/// order they were scheduled.
#[derive(Default)]
pub struct ManualTimers {
    now: Cell<Duration>,
    seq: Cell<u64>,
    entries: RefCell<Vec<Entry>>,
}

impl ManualTimers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current virtual time.
    pub fn now(&self) -> Duration {
        self.now.get()
    }

    /// Number of tasks waiting to run.
    pub fn pending(&self) -> usize {
        self.entries.borrow().len()
    }

    /// Move the clock forward by `by`, running every task that falls due.
    /// Stops at the first failing task and returns its error.
    pub fn advance(&self, by: Duration) -> Result<()> {
        let target = self.now.get() + by;
        while let Some(entry) = self.pop_next(Some(target)) {
            self.now.set(self.now.get().max(entry.due));
            (entry.task)()?;
        }
        self.now.set(target);
        Ok(())
    }

    /// Run tasks until the queue is empty, moving the clock as needed.
    pub fn run_until_idle(&self) -> Result<()> {
        while let Some(entry) = self.pop_next(None) {
            self.now.set(self.now.get().max(entry.due));
            (entry.task)()?;
        }
        Ok(())
    }

    fn pop_next(&self, until: Option<Duration>) -> Option<Entry> {
        let mut entries = self.entries.borrow_mut();
        let index = entries
            .iter()
            .enumerate()
            .min_by_key(|(_, e)| (e.due, e.seq))
            .map(|(i, _)| i)?;
        if until.is_some_and(|limit| entries[index].due > limit) {
            return None;
        }
        Some(entries.remove(index))
    }
}

impl Timers for ManualTimers {
    fn schedule(&self, delay: Duration, task: Task) {
        let seq = self.seq.get();
        self.seq.set(seq + 1);
        self.entries.borrow_mut().push(Entry {
            due: self.now.get() + delay,
            seq,
            task,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BusError;
    use std::rc::Rc;

    fn recorder() -> (Rc<RefCell<Vec<&'static str>>>, impl Fn(&'static str) -> Task) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        let make = move |label: &'static str| -> Task {
            let sink = Rc::clone(&sink);
            Box::new(move || {
                sink.borrow_mut().push(label);
                Ok(())
            })
        };
        (log, make)
    }

    #[test]
    fn test_tasks_run_in_due_order() {
        let timers = ManualTimers::new();
        let (log, task) = recorder();

        timers.schedule(Duration::from_millis(20), task("late"));
        timers.schedule(Duration::from_millis(5), task("early"));
        timers.schedule(Duration::from_millis(5), task("early-second"));

        timers.advance(Duration::from_millis(10)).unwrap();
        assert_eq!(*log.borrow(), vec!["early", "early-second"]);
        assert_eq!(timers.now(), Duration::from_millis(10));
        assert_eq!(timers.pending(), 1);

        timers.run_until_idle().unwrap();
        assert_eq!(*log.borrow(), vec!["early", "early-second", "late"]);
        assert_eq!(timers.now(), Duration::from_millis(20));
    }

    #[test]
    fn test_task_error_stops_the_run() {
        let timers = ManualTimers::new();
        let (log, task) = recorder();

        timers.schedule(Duration::ZERO, Box::new(|| Err(BusError::Destroyed)));
        timers.schedule(Duration::ZERO, task("after"));

        assert!(timers.run_until_idle().is_err());
        assert!(log.borrow().is_empty());
        assert_eq!(timers.pending(), 1);
    }
}
