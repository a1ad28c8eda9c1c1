//! Bus: the fluent pipeline builder.
//!
//! A bus is an ordered list of [`Frame`]s. The last one is the *cursor*:
//! every builder call either reconfigures it in place or appends a new frame
//! wired from it, and the new frame becomes the cursor.
//!
//! ```text
//! extend   a ─► a'        merge   a ─┐         fork   a ─► a'  (new bus)
//!          b ─► b'                b ─┴► m             b ─► b'
//!
//! add      a ─► a'   (this bus)
//!          b ─► b'
//!          x ─► x'   (other bus)
//! ```
//!
//! Whether a call is legal is decided by the grammar in
//! [`grammar`](crate::pipeline::grammar); violations are reported as
//! [`BusError::Holding`] / [`BusError::NotHolding`] at configuration time and
//! leave the bus unchanged.
//!
//! # Ownership
//!
//! A bus owns the stages of its frames. Dropping it destroys them, which runs
//! their cleanup hooks (for event sources: unsubscribe). A forked bus owns its
//! own frames, so keep it alive for as long as its branch should run.

use crate::error::{BusError, Result};
use crate::pipeline::frame::Frame;
use crate::pipeline::grammar::{next_state, transition, Action, GroupState, Verb};
use crate::pipeline::keep::{Buffer, Keep};
use crate::pipeline::operator::{ClearFn, DelaySpec, HoldConfig, Operator, ReadyFn, Release};
use crate::pipeline::packet::{Envelope, Value};
use crate::pipeline::source::{event_stage, EventSource};
use crate::pipeline::stage::Stage;
use crate::runtime::Runtime;
use std::rc::Rc;
use std::time::Duration;

pub struct Bus {
    runtime: Runtime,
    /// Frames before the cursor, oldest first.
    frames: Vec<Frame>,
    cursor: Frame,
    dead: bool,
}

impl Bus {
    // ── Construction ──

    /// Bus whose first frame is the single channel `stage`.
    pub fn from_stage(stage: Rc<Stage>) -> Self {
        let runtime = stage.runtime().clone();
        Self::from_stages(&runtime, vec![stage])
    }

    /// Multi-channel bus; each stage becomes one channel of the first frame.
    pub fn from_stages(runtime: &Runtime, stages: Vec<Rc<Stage>>) -> Self {
        Self {
            runtime: runtime.clone(),
            frames: Vec::new(),
            cursor: Frame::new(0, stages),
            dead: false,
        }
    }

    /// Bus fed by `event` on `target`.
    pub fn from_event<S>(runtime: &Runtime, target: Rc<S>, event: &str, use_capture: bool) -> Self
    where
        S: EventSource + ?Sized + 'static,
    {
        let stage = event_stage(runtime, target, event, use_capture);
        Self::from_stages(runtime, vec![stage])
    }

    // ── Introspection ──

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// Whether the cursor frame is an unreleased hold or group.
    pub fn holding(&self) -> bool {
        self.cursor.is_holding()
    }

    pub fn is_dead(&self) -> bool {
        self.dead
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len() + 1
    }

    /// All frames, oldest first; the last one is the cursor.
    pub fn frames(&self) -> impl Iterator<Item = &Frame> {
        self.frames.iter().chain(std::iter::once(&self.cursor))
    }

    /// Stages of the first frame.
    pub fn sources(&self) -> &[Rc<Stage>] {
        self.frames.first().unwrap_or(&self.cursor).stages()
    }

    /// Stages of the cursor frame.
    pub fn cursor(&self) -> &[Rc<Stage>] {
        self.cursor.stages()
    }

    // ── Linear operators ──

    /// Forward only messages accepted by `predicate(value, source, last)`.
    pub fn filter<F>(&mut self, predicate: F) -> Result<&mut Self>
    where
        F: Fn(&Value, Option<&str>, Option<&Envelope>) -> bool + 'static,
    {
        self.try_filter(move |v, s, l| Ok(predicate(v, s, l)))
    }

    pub fn try_filter<F>(&mut self, predicate: F) -> Result<&mut Self>
    where
        F: Fn(&Value, Option<&str>, Option<&Envelope>) -> anyhow::Result<bool> + 'static,
    {
        self.linear(Verb::Filter, Operator::filter(predicate))
    }

    /// Replace every value with `f(value, source, last)`.
    pub fn transform<F, R>(&mut self, f: F) -> Result<&mut Self>
    where
        F: Fn(&Value, Option<&str>, Option<&Envelope>) -> R + 'static,
        R: Into<Value>,
    {
        self.try_transform(move |v, s, l| Ok(f(v, s, l)))
    }

    pub fn try_transform<F, R>(&mut self, f: F) -> Result<&mut Self>
    where
        F: Fn(&Value, Option<&str>, Option<&Envelope>) -> anyhow::Result<R> + 'static,
        R: Into<Value>,
    {
        self.linear(
            Verb::Transform,
            Operator::transform(move |v, s, l| f(v, s, l).map(Into::into)),
        )
    }

    /// Replace the provenance of every message with `f(value, source, last)`.
    pub fn name<F, R>(&mut self, f: F) -> Result<&mut Self>
    where
        F: Fn(&Value, Option<&str>, Option<&Envelope>) -> R + 'static,
        R: Into<String>,
    {
        self.try_name(move |v, s, l| Ok(f(v, s, l)))
    }

    pub fn try_name<F, R>(&mut self, f: F) -> Result<&mut Self>
    where
        F: Fn(&Value, Option<&str>, Option<&Envelope>) -> anyhow::Result<R> + 'static,
        R: Into<String>,
    {
        self.linear(
            Verb::Name,
            Operator::rename(move |v, s, l| f(v, s, l).map(Into::into)),
        )
    }

    /// Run a side effect and forward the message unchanged.
    pub fn run<F>(&mut self, f: F) -> Result<&mut Self>
    where
        F: Fn(&Value, Option<&str>, Option<&Envelope>) + 'static,
    {
        self.try_run(move |v, s, l| {
            f(v, s, l);
            Ok(())
        })
    }

    pub fn try_run<F>(&mut self, f: F) -> Result<&mut Self>
    where
        F: Fn(&Value, Option<&str>, Option<&Envelope>) -> anyhow::Result<()> + 'static,
    {
        self.linear(Verb::Run, Operator::run(f))
    }

    /// Drop values equal to the previously forwarded one.
    pub fn skip_dupes(&mut self) -> Result<&mut Self> {
        self.linear(Verb::SkipDupes, Operator::skip_dupes())
    }

    /// Forward each message after `delay` (milliseconds or a `Duration`).
    pub fn delay(&mut self, delay: impl Into<DelaySpec>) -> Result<&mut Self> {
        self.linear(Verb::Delay, Operator::Delay(delay.into()))
    }

    /// Forward each message after a delay computed per message.
    pub fn delay_with<F>(&mut self, delay: F) -> Result<&mut Self>
    where
        F: Fn() -> Duration + 'static,
    {
        self.linear(Verb::Delay, Operator::Delay(DelaySpec::Computed(Rc::new(delay))))
    }

    // ── Buffering ──

    /// Open a hold: buffer messages until the stage is ready.
    pub fn hold(&mut self) -> Result<&mut Self> {
        self.linear(Verb::Hold, Operator::Hold(HoldConfig::default()))
    }

    /// Open a group keyed by provenance.
    pub fn group(&mut self) -> Result<&mut Self> {
        self.linear(Verb::Group, Operator::group(None))
    }

    /// Open a group keyed by `key(value, source, last)`.
    pub fn group_by<F, R>(&mut self, key: F) -> Result<&mut Self>
    where
        F: Fn(&Value, Option<&str>, Option<&Envelope>) -> R + 'static,
        R: Into<String>,
    {
        self.linear(
            Verb::Group,
            Operator::group_by(move |v, s, l| Ok(key(v, s, l).into())),
        )
    }

    /// Keep the first `n` values (`0`: only the very first, as a scalar).
    pub fn first(&mut self, n: usize) -> Result<&mut Self> {
        self.keep(Verb::First, Keep::First(n))
    }

    /// Keep the newest `n` values (`0`: only the newest, as a scalar).
    pub fn last(&mut self, n: usize) -> Result<&mut Self> {
        self.keep(Verb::Last, Keep::Last(n))
    }

    pub fn all(&mut self) -> Result<&mut Self> {
        self.keep(Verb::All, Keep::All)
    }

    /// Readiness predicate of the open hold or group.
    pub fn ready<F>(&mut self, ready: F) -> Result<&mut Self>
    where
        F: Fn(&Buffer, Option<&Envelope>) -> bool + 'static,
    {
        self.check(Verb::Ready)?;
        let ready: ReadyFn = Rc::new(ready);
        self.cursor
            .configure_hold(|hold| hold.ready = Some(Rc::clone(&ready)));
        Ok(self)
    }

    /// Latch predicate of the open hold or group; returning `true` after a
    /// release keeps the stage firing on every message.
    pub fn clear<F>(&mut self, clear: F) -> Result<&mut Self>
    where
        F: Fn(&Buffer) -> bool + 'static,
    {
        self.check(Verb::Clear)?;
        let clear: ClearFn = Rc::new(clear);
        self.cursor
            .configure_hold(|hold| hold.clear = Some(Rc::clone(&clear)));
        Ok(self)
    }

    /// Release through the runtime's flush scheduler.
    ///
    /// Ends an open hold or group. Otherwise appends a hold that coalesces
    /// each burst to its newest value.
    pub fn batch(&mut self) -> Result<&mut Self> {
        self.release(
            Verb::Batch,
            Release::Batch,
            Operator::Hold(HoldConfig {
                release: Release::Batch,
                ..HoldConfig::default()
            }),
        )
    }

    /// Release from a zero-delay timer task.
    ///
    /// Ends an open hold or group. Otherwise appends a zero delay.
    pub fn defer(&mut self) -> Result<&mut Self> {
        self.release(
            Verb::Defer,
            Release::Defer,
            Operator::Delay(Duration::ZERO.into()),
        )
    }

    // ── Wiring ──

    /// Fan every channel into one stage.
    pub fn merge(&mut self) -> Result<&mut Self> {
        let action = self.check(Verb::Merge)?;
        let merged = Stage::new(&self.runtime);
        for stage in self.cursor.stages() {
            stage.flows_to(&merged);
        }
        self.push_frame(vec![merged], next_state(GroupState::Open, Verb::Merge, action));
        Ok(self)
    }

    /// Independent continuation fed by the cursor frame.
    ///
    /// The returned bus owns its stages: destroying or dropping it leaves
    /// this bus running, and destroying this bus leaves the fork intact.
    pub fn fork(&mut self) -> Result<Bus> {
        self.check(Verb::Fork)?;
        let stages = self.wired_from(self.cursor.stages(), &Operator::Pass);
        tracing::debug!(channels = stages.len(), "bus forked");
        Ok(Bus::from_stages(&self.runtime, stages))
    }

    /// Append a frame fed by this bus's cursor and, on extra channels, by
    /// `other`'s cursor.
    pub fn add(&mut self, other: &Bus) -> Result<&mut Self> {
        let action = self.check(Verb::Add)?;
        if other.dead {
            return Err(BusError::Destroyed);
        }
        let mut stages = self.wired_from(self.cursor.stages(), &Operator::Pass);
        stages.extend(self.wired_from(other.cursor(), &Operator::Pass));
        self.push_frame(stages, next_state(GroupState::Open, Verb::Add, action));
        Ok(self)
    }

    /// Append a frame fed by this bus's cursor plus one channel for `event`
    /// on `target`.
    pub fn add_event<S>(&mut self, target: Rc<S>, event: &str, use_capture: bool) -> Result<&mut Self>
    where
        S: EventSource + ?Sized + 'static,
    {
        let action = self.check(Verb::AddEvent)?;
        let mut stages = self.wired_from(self.cursor.stages(), &Operator::Pass);
        stages.push(event_stage(&self.runtime, target, event, use_capture));
        self.push_frame(stages, next_state(GroupState::Open, Verb::AddEvent, action));
        Ok(self)
    }

    // ── Teardown ──

    /// Destroy every stage of every frame. Idempotent.
    pub fn destroy(&mut self) {
        if self.dead {
            return;
        }
        self.dead = true;
        for frame in self.frames() {
            frame.destroy();
        }
        tracing::info!(frames = self.frame_count(), "bus destroyed");
    }

    // ── Internals ──

    fn check(&self, verb: Verb) -> Result<Action> {
        if self.dead {
            return Err(BusError::Destroyed);
        }
        transition(self.cursor.state(), verb)
    }

    /// Append a frame of `operator` stages, one per cursor channel.
    fn linear(&mut self, verb: Verb, operator: Operator) -> Result<&mut Self> {
        let action = self.check(verb)?;
        let stages = self.wired_from(self.cursor.stages(), &operator);
        self.push_frame(stages, next_state(GroupState::Open, verb, action));
        Ok(self)
    }

    fn keep(&mut self, verb: Verb, keep: Keep) -> Result<&mut Self> {
        match self.check(verb)? {
            Action::Modify => {
                self.cursor.configure_hold(|hold| hold.keep = keep);
                Ok(self)
            }
            _ => self.linear(verb, Operator::Keep(keep)),
        }
    }

    fn release(&mut self, verb: Verb, release: Release, otherwise: Operator) -> Result<&mut Self> {
        match self.check(verb)? {
            Action::Release => {
                self.cursor.configure_hold(|hold| hold.release = release);
                let state = next_state(self.cursor.state(), verb, Action::Release);
                self.cursor.set_state(state);
                Ok(self)
            }
            _ => self.linear(verb, otherwise),
        }
    }

    /// New `operator` stages, each fed by the matching stage of `parents`.
    fn wired_from(&self, parents: &[Rc<Stage>], operator: &Operator) -> Vec<Rc<Stage>> {
        parents
            .iter()
            .map(|parent| {
                let stage = Stage::with_operator(&self.runtime, operator.clone());
                parent.flows_to(&stage);
                stage
            })
            .collect()
    }

    fn push_frame(&mut self, stages: Vec<Rc<Stage>>, state: GroupState) {
        let mut frame = Frame::new(self.frame_count(), stages);
        frame.set_state(state);
        let previous = std::mem::replace(&mut self.cursor, frame);
        self.frames.push(previous);
        tracing::debug!(
            frame = self.cursor.index(),
            channels = self.cursor.len(),
            op = self.cursor.stages().first().map_or("none", |s| s.operator_kind()),
            "frame added"
        );
    }
}

impl Drop for Bus {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl std::fmt::Debug for Bus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bus")
            .field("frames", &self.frame_count())
            .field("channels", &self.cursor.len())
            .field("holding", &self.holding())
            .field("dead", &self.dead)
            .finish()
    }
}
