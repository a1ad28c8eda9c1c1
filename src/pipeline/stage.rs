//! Stage: one pipeline node and its processing automaton.
//!
//! A stage receives messages through [`Stage::accept`], runs its
//! [`Operator`] and forwards the result to its children. Children are held
//! as `Weak` references in subscription order: a stage never owns what it
//! feeds, so wiring a loop cannot leak.
//!
//! # Forwarding
//!
//! Forwarding is synchronous and depth-first: a child and all of its own
//! descendants finish before the next sibling is visited. Only `delay`
//! (timer) and deferred releases (timer or flush scheduler) break the chain.
//!
//! # Errors
//!
//! An error from a user function is returned from `accept` immediately.
//! Children that had not been visited yet do not see the message, and no
//! rollback happens for those that had. This partial fan-out is intentional:
//! continuing past a failed user function would hide the failure.
//!
//! # Lifecycle
//!
//! [`Stage::destroy`] runs the cleanup hook once and makes every later
//! `accept` a no-op. Timer tasks and queued releases that still reference a
//! dead stage are not retracted; they find the stage dead and do nothing.

use crate::error::{BusError, Result};
use crate::pipeline::id::StageId;
use crate::pipeline::keep::Buffer;
use crate::pipeline::operator::{HoldConfig, Operator, Release};
use crate::pipeline::packet::{Envelope, Value};
use crate::runtime::Runtime;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::time::Duration;

/// Hook run once when a stage is destroyed, typically an unsubscribe.
pub type Cleanup = Box<dyn FnOnce()>;

pub struct Stage {
    id: StageId,
    me: Weak<Stage>,
    runtime: Runtime,
    /// Overrides the provenance of every outgoing message when set.
    name: RefCell<Option<String>>,
    operator: RefCell<Operator>,
    buffer: RefCell<Buffer>,
    /// Provenance of the most recently buffered message.
    held_source: RefCell<Option<String>>,
    latched: Cell<bool>,
    /// A deferred release is scheduled and has not run yet.
    primed: Cell<bool>,
    children: RefCell<Vec<Weak<Stage>>>,
    last: RefCell<Option<Envelope>>,
    cleanup: RefCell<Option<Cleanup>>,
    dead: Cell<bool>,
}

impl Stage {
    /// New pass-through stage.
    pub fn new(runtime: &Runtime) -> Rc<Self> {
        Self::with_operator(runtime, Operator::Pass)
    }

    /// New pass-through stage whose outgoing provenance is always `name`.
    pub fn named(runtime: &Runtime, name: impl Into<String>) -> Rc<Self> {
        let stage = Self::new(runtime);
        stage.set_name(Some(name.into()));
        stage
    }

    pub fn with_operator(runtime: &Runtime, operator: Operator) -> Rc<Self> {
        let id = runtime.next_stage_id();
        let buffer = empty_buffer_for(&operator);
        Rc::new_cyclic(|me| Stage {
            id,
            me: me.clone(),
            runtime: runtime.clone(),
            name: RefCell::new(None),
            operator: RefCell::new(operator),
            buffer: RefCell::new(buffer),
            held_source: RefCell::new(None),
            latched: Cell::new(false),
            primed: Cell::new(false),
            children: RefCell::new(Vec::new()),
            last: RefCell::new(None),
            cleanup: RefCell::new(None),
            dead: Cell::new(false),
        })
    }

    pub fn id(&self) -> StageId {
        self.id
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    pub fn name(&self) -> Option<String> {
        self.name.borrow().clone()
    }

    pub fn set_name(&self, name: Option<String>) {
        *self.name.borrow_mut() = name;
    }

    /// Install the hook run by [`Stage::destroy`], replacing any previous one.
    pub fn set_cleanup(&self, cleanup: impl FnOnce() + 'static) {
        *self.cleanup.borrow_mut() = Some(Box::new(cleanup));
    }

    pub fn operator_kind(&self) -> &'static str {
        self.operator.borrow().kind()
    }

    /// Adjust the hold configuration in place. Returns `false` for stages
    /// that do not buffer.
    pub fn configure_hold(&self, configure: impl FnOnce(&mut HoldConfig)) -> bool {
        match self.operator.borrow_mut().hold_config_mut() {
            Some(hold) => {
                configure(hold);
                true
            }
            None => false,
        }
    }

    /// Hold configuration, for buffering stages.
    pub fn hold_config(&self) -> Option<HoldConfig> {
        self.operator.borrow().hold_config().cloned()
    }

    /// Subscribe `child` to this stage's output.
    pub fn flows_to(&self, child: &Rc<Stage>) {
        self.children.borrow_mut().push(Rc::downgrade(child));
        tracing::trace!(from = %self.id, to = %child.id, "stage wired");
    }

    /// Remove the first subscription of `child`. Returns whether one existed.
    pub fn unlink(&self, child: &Rc<Stage>) -> bool {
        let target = Rc::downgrade(child);
        let mut children = self.children.borrow_mut();
        match children.iter().position(|c| Weak::ptr_eq(c, &target)) {
            Some(index) => {
                children.remove(index);
                true
            }
            None => false,
        }
    }

    /// Children still alive, in subscription order.
    pub fn children(&self) -> Vec<Rc<Stage>> {
        self.children
            .borrow()
            .iter()
            .filter_map(Weak::upgrade)
            .collect()
    }

    /// The envelope most recently forwarded by this stage.
    pub fn last(&self) -> Option<Envelope> {
        self.last.borrow().clone()
    }

    /// Snapshot of the buffered values.
    pub fn buffer(&self) -> Buffer {
        self.buffer.borrow().clone()
    }

    pub fn is_dead(&self) -> bool {
        self.dead.get()
    }

    pub fn is_primed(&self) -> bool {
        self.primed.get()
    }

    pub fn is_latched(&self) -> bool {
        self.latched.get()
    }

    /// Forget a scheduled release without running it.
    pub(crate) fn reset_pending(&self) {
        self.primed.set(false);
    }

    /// Drop buffered content, the latch and any scheduled release.
    pub(crate) fn discard(&self) {
        self.primed.set(false);
        self.latched.set(false);
        self.buffer.borrow_mut().reset();
        *self.held_source.borrow_mut() = None;
        tracing::trace!(stage = %self.id, "buffered content discarded");
    }

    /// Entry point for every message.
    pub fn accept(&self, value: Value, source: Option<String>) -> Result<()> {
        if self.dead.get() {
            tracing::trace!(stage = %self.id, "message dropped by dead stage");
            return Ok(());
        }

        let source = self.name.borrow().clone().or(source);
        let last = self.last.borrow().clone();
        let operator = self.operator.borrow().clone();
        tracing::trace!(stage = %self.id, op = operator.kind(), source = ?source, "accept");

        match operator {
            Operator::Pass => self.forward(value, source),
            Operator::Filter(filter) => {
                let pass = self.call(|| filter(&value, source.as_deref(), last.as_ref()))?;
                if pass {
                    self.forward(value, source)
                } else {
                    Ok(())
                }
            }
            Operator::Transform(transform) => {
                let value = self.call(|| transform(&value, source.as_deref(), last.as_ref()))?;
                self.forward(value, source)
            }
            Operator::Rename(rename) => {
                let renamed = self.call(|| rename(&value, source.as_deref(), last.as_ref()))?;
                self.forward(value, Some(renamed))
            }
            Operator::Run(run) => {
                self.call(|| run(&value, source.as_deref(), last.as_ref()))?;
                self.forward(value, source)
            }
            Operator::Keep(keep) => {
                let view = {
                    let mut buffer = self.buffer.borrow_mut();
                    buffer.merge(keep, value);
                    buffer.resolve(keep)
                };
                self.forward(view, source)
            }
            Operator::Delay(delay) => {
                self.forward_later(delay.duration(), value, source);
                Ok(())
            }
            Operator::Hold(hold) => {
                self.buffer.borrow_mut().merge(hold.keep, value);
                self.after_buffered(&hold, source, last.as_ref())
            }
            Operator::Group { key, hold } => {
                let key = match &key {
                    Some(key) => self.call(|| key(&value, source.as_deref(), last.as_ref()))?,
                    None => source.clone().unwrap_or_default(),
                };
                self.buffer.borrow_mut().merge_keyed(hold.keep, key, value);
                self.after_buffered(&hold, source, last.as_ref())
            }
        }
    }

    /// Evaluate the fire condition of a hold or group stage.
    fn after_buffered(
        &self,
        hold: &HoldConfig,
        source: Option<String>,
        last: Option<&Envelope>,
    ) -> Result<()> {
        *self.held_source.borrow_mut() = source;

        if self.primed.get() {
            return Ok(());
        }
        let ready = self.latched.get() || hold.is_ready(&self.buffer.borrow(), last);
        if !ready {
            return Ok(());
        }

        match hold.release {
            Release::Immediate => self.fire_content(),
            Release::Defer => {
                self.primed.set(true);
                let me = self.me.clone();
                self.runtime.schedule(
                    Duration::ZERO,
                    Box::new(move || match me.upgrade() {
                        Some(stage) => stage.fire_content(),
                        None => Ok(()),
                    }),
                );
                Ok(())
            }
            Release::Batch => {
                if let Some(me) = self.me.upgrade() {
                    self.primed.set(true);
                    self.runtime.scheduler().enqueue(&me);
                }
                Ok(())
            }
        }
    }

    /// Resolve the buffer, update the latch and forward the result.
    pub fn fire_content(&self) -> Result<()> {
        self.primed.set(false);
        if self.dead.get() {
            tracing::warn!(stage = %self.id, "release reached a dead stage, ignored");
            return Ok(());
        }
        let Some(hold) = self.hold_config() else {
            return Ok(());
        };

        let (value, latched) = {
            let mut buffer = self.buffer.borrow_mut();
            let value = buffer.resolve(hold.keep);
            let latched = hold.stays_latched(&buffer);
            if !latched {
                buffer.reset();
            }
            (value, latched)
        };
        self.latched.set(latched);

        let source = self.held_source.borrow().clone();
        tracing::debug!(stage = %self.id, latched, "releasing buffered content");
        self.forward(value, source)
    }

    fn forward(&self, value: Value, source: Option<String>) -> Result<()> {
        *self.last.borrow_mut() = Some(Envelope::new(value.clone(), source.clone()));

        for child in self.children() {
            child.accept(value.clone(), source.clone())?;
        }
        Ok(())
    }

    fn forward_later(&self, delay: Duration, value: Value, source: Option<String>) {
        let me = self.me.clone();
        self.runtime.schedule(
            delay,
            Box::new(move || match me.upgrade() {
                Some(stage) if !stage.is_dead() => stage.forward(value, source),
                _ => {
                    tracing::trace!("delayed forward reached a released stage, ignored");
                    Ok(())
                }
            }),
        );
    }

    fn call<T>(&self, f: impl FnOnce() -> anyhow::Result<T>) -> Result<T> {
        f().map_err(|e| BusError::operator(self.id, e))
    }

    /// Mark dead and run the cleanup hook. Idempotent.
    pub fn destroy(&self) {
        if self.dead.replace(true) {
            return;
        }
        let cleanup = self.cleanup.borrow_mut().take();
        if let Some(cleanup) = cleanup {
            cleanup();
        }
        tracing::trace!(stage = %self.id, "stage destroyed");
    }
}

fn empty_buffer_for(operator: &Operator) -> Buffer {
    match operator {
        Operator::Group { .. } => Buffer::keyed(),
        _ => Buffer::default(),
    }
}

impl fmt::Debug for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stage")
            .field("id", &self.id)
            .field("name", &self.name.borrow())
            .field("operator", &self.operator.borrow())
            .field("buffered", &self.buffer.borrow().len())
            .field("children", &self.children.borrow().len())
            .field("primed", &self.primed.get())
            .field("latched", &self.latched.get())
            .field("dead", &self.dead.get())
            .finish()
    }
}
