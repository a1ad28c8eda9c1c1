//! Tokio-backed timer queue for the current thread.
//!
//! Tasks are spawned with `tokio::task::spawn_local`, so scheduling must
//! happen inside a [`tokio::task::LocalSet`]. There is no caller to return a
//! task error to, so errors are logged and kept until [`LocalTimers::take_errors`].

use crate::error::BusError;
use crate::scheduler::timers::{Task, Timers};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

#[derive(Default)]
pub struct LocalTimers {
    errors: Rc<RefCell<Vec<BusError>>>,
}

impl LocalTimers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Errors raised by tasks since the last call.
    pub fn take_errors(&self) -> Vec<BusError> {
        std::mem::take(&mut *self.errors.borrow_mut())
    }
}

impl Timers for LocalTimers {
    fn schedule(&self, delay: Duration, task: Task) {
        let errors = Rc::clone(&self.errors);
        tokio::task::spawn_local(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = task() {
                tracing::error!("Timer task failed: {}", e);
                errors.borrow_mut().push(e);
            }
        });
    }
}
