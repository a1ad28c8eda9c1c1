//! Event sources: the adapter boundary.
//!
//! Anything that can register and remove a listener for a named event can
//! feed a pipeline. [`event_stage`] wraps one such subscription in a source
//! [`Stage`]: the listener forwards each payload with the event name as its
//! provenance, and destroying the stage removes the listener again.
//!
//! [`Emitter`] is a small in-process implementation used by the demo and the
//! tests; real adapters implement [`EventSource`] over their own listener
//! registries.

use crate::error::Result;
use crate::pipeline::id::SubscriptionId;
use crate::pipeline::packet::Value;
use crate::pipeline::stage::Stage;
use crate::runtime::Runtime;
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;

/// Callback registered with an event source.
pub type Listener = Rc<dyn Fn(Value) -> Result<()>>;

/// Paired subscribe/unsubscribe capability of an event producer.
///
/// Closures cannot be compared, so the id returned by `subscribe` identifies
/// the registration when it is removed.
#[cfg_attr(test, mockall::automock)]
pub trait EventSource {
    fn subscribe(&self, event: &str, listener: Listener, use_capture: bool) -> SubscriptionId;
    fn unsubscribe(&self, event: &str, id: SubscriptionId, use_capture: bool);
}

/// Source stage fed by `event` on `target`.
///
/// The stage is named after the event. Its cleanup hook unsubscribes, so the
/// registration is removed exactly once when the stage is destroyed.
pub fn event_stage<S>(
    runtime: &Runtime,
    target: Rc<S>,
    event: &str,
    use_capture: bool,
) -> Rc<Stage>
where
    S: EventSource + ?Sized + 'static,
{
    let stage = Stage::named(runtime, event);

    let weak = Rc::downgrade(&stage);
    let name = event.to_string();
    let listener: Listener = Rc::new(move |value: Value| match weak.upgrade() {
        Some(stage) => stage.accept(value, Some(name.clone())),
        None => Ok(()),
    });
    let id = target.subscribe(event, listener, use_capture);
    tracing::debug!(event, %id, stage = %stage.id(), "event source subscribed");

    let event = event.to_string();
    stage.set_cleanup(move || {
        target.unsubscribe(&event, id, use_capture);
        tracing::debug!(event = %event, %id, "event source unsubscribed");
    });
    stage
}

// ── Emitter ──

#[derive(Default)]
struct EmitterInner {
    listeners: BTreeMap<String, Vec<(SubscriptionId, bool, Listener)>>,
}

/// In-process event emitter with `on`/`off`/`emit`.
#[derive(Default)]
pub struct Emitter {
    inner: RefCell<EmitterInner>,
    next_id: Cell<u64>,
}

impl Emitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(&self, event: &str, listener: Listener) -> SubscriptionId {
        self.on_with_capture(event, listener, false)
    }

    fn on_with_capture(&self, event: &str, listener: Listener, use_capture: bool) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.inner
            .borrow_mut()
            .listeners
            .entry(event.to_string())
            .or_default()
            .push((id, use_capture, listener));
        id
    }

    /// Remove a listener. Returns whether it was registered.
    pub fn off(&self, event: &str, id: SubscriptionId) -> bool {
        let mut inner = self.inner.borrow_mut();
        let Some(listeners) = inner.listeners.get_mut(event) else {
            return false;
        };
        let before = listeners.len();
        listeners.retain(|(lid, _, _)| *lid != id);
        let removed = listeners.len() != before;
        if listeners.is_empty() {
            inner.listeners.remove(event);
        }
        removed
    }

    /// Deliver `value` to every listener of `event` in registration order.
    ///
    /// Listeners added or removed during delivery take effect from the next
    /// `emit`. The first listener error stops delivery and is returned.
    pub fn emit(&self, event: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        let snapshot: Vec<Listener> = self
            .inner
            .borrow()
            .listeners
            .get(event)
            .map(|ls| ls.iter().map(|(_, _, l)| Rc::clone(l)).collect())
            .unwrap_or_default();

        for listener in snapshot {
            listener(value.clone())?;
        }
        Ok(())
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.inner
            .borrow()
            .listeners
            .get(event)
            .map_or(0, Vec::len)
    }
}

impl EventSource for Emitter {
    fn subscribe(&self, event: &str, listener: Listener, use_capture: bool) -> SubscriptionId {
        self.on_with_capture(event, listener, use_capture)
    }

    fn unsubscribe(&self, event: &str, id: SubscriptionId, _use_capture: bool) {
        self.off(event, id);
    }
}

impl std::fmt::Debug for Emitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.borrow();
        f.debug_map()
            .entries(inner.listeners.iter().map(|(k, v)| (k, v.len())))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BusConfig;
    use crate::error::BusError;
    use crate::pipeline::operator::Operator;

    fn recorder() -> (Listener, Rc<RefCell<Vec<Value>>>) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&seen);
        let listener: Listener = Rc::new(move |v: Value| -> Result<()> {
            log.borrow_mut().push(v);
            Ok(())
        });
        (listener, seen)
    }

    #[test]
    fn test_emitter_on_off() {
        let emitter = Emitter::new();
        let (listener, seen) = recorder();
        let id = emitter.on("tick", listener);
        assert_eq!(emitter.listener_count("tick"), 1);

        emitter.emit("tick", 1).unwrap();
        emitter.emit("tock", 2).unwrap();
        assert!(emitter.off("tick", id));
        assert!(!emitter.off("tick", id));
        emitter.emit("tick", 3).unwrap();

        assert_eq!(*seen.borrow(), vec![Value::Int(1)]);
        assert_eq!(emitter.listener_count("tick"), 0);
    }

    #[test]
    fn test_emit_returns_first_error() {
        let emitter = Emitter::new();
        let (ok, seen) = recorder();
        emitter.on("e", Rc::new(|_: Value| -> Result<()> { Err(BusError::Destroyed) }));
        emitter.on("e", ok);

        assert!(matches!(emitter.emit("e", 1), Err(BusError::Destroyed)));
        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn test_event_stage_forwards_with_event_name() {
        let (rt, _) = Runtime::manual(BusConfig::default());
        let emitter = Rc::new(Emitter::new());
        let stage = event_stage(&rt, Rc::clone(&emitter), "click", false);

        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&seen);
        let out = Stage::with_operator(
            &rt,
            Operator::run(move |v, s, _| {
                log.borrow_mut().push((v.clone(), s.map(str::to_string)));
                Ok(())
            }),
        );
        stage.flows_to(&out);

        emitter.emit("click", "x").unwrap();
        assert_eq!(*seen.borrow(), vec![(Value::from("x"), Some("click".to_string()))]);

        stage.destroy();
        assert_eq!(emitter.listener_count("click"), 0);
        emitter.emit("click", "y").unwrap();
        assert_eq!(seen.borrow().len(), 1);
    }

    #[test]
    fn test_event_stage_unsubscribes_once() {
        let (rt, _) = Runtime::manual(BusConfig::default());
        let mut source = MockEventSource::new();
        source
            .expect_subscribe()
            .withf(|event, _, use_capture| event == "resize" && *use_capture)
            .times(1)
            .returning(|_, _, _| SubscriptionId(7));
        source
            .expect_unsubscribe()
            .withf(|event, id, use_capture| event == "resize" && *id == SubscriptionId(7) && *use_capture)
            .times(1)
            .return_const(());

        let stage = event_stage(&rt, Rc::new(source), "resize", true);
        stage.destroy();
        stage.destroy();
    }
}
